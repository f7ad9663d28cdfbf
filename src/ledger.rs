//! Per-validator uptime bookkeeping across epoch boundaries.

use crate::types::{Committee, UptimeCounter};
use std::collections::HashMap;

/// Mutable per-validator counters, keyed by `sui_address` (not bitmap index,
/// since indices are epoch-local). Owned exclusively by the engine task; no
/// locking required.
#[derive(Debug, Default)]
pub struct Ledger {
    counters: HashMap<String, UptimeCounter>,
    total_attested: u64,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a zero counter for every committee member not already present.
    ///
    /// Existing counters are never overwritten; this is how uptime history
    /// survives committee churn.
    pub fn initialize(&mut self, committee: &Committee) {
        for validator in &committee.validators {
            self.counters
                .entry(validator.sui_address.clone())
                .or_default();
        }
    }

    /// Clears the signed-current flag for every member of the given
    /// committee. Run once per checkpoint, before matching.
    pub fn reset_current(&mut self, committee: &Committee) {
        for validator in &committee.validators {
            if let Some(counter) = self.counters.get_mut(&validator.sui_address) {
                counter.signed_current = false;
            }
        }
    }

    /// Marks the validator as having signed the current checkpoint.
    ///
    /// A no-op for unknown keys: a committee reload can race an in-flight
    /// checkpoint, and mis-attributing to a fresh entry would be worse than
    /// skipping.
    pub fn record_signed(&mut self, sui_address: &str) {
        if let Some(counter) = self.counters.get_mut(sui_address) {
            counter.signed_current = true;
            counter.attested += 1;
        }
    }

    /// Counts one more checkpoint that carried signature data.
    pub fn increment_total(&mut self) {
        self.total_attested += 1;
    }

    pub fn total_attested(&self) -> u64 {
        self.total_attested
    }

    pub fn get(&self, sui_address: &str) -> Option<UptimeCounter> {
        self.counters.get(sui_address).copied()
    }

    pub fn signed_current(&self, sui_address: &str) -> bool {
        self.counters
            .get(sui_address)
            .map(|c| c.signed_current)
            .unwrap_or(false)
    }

    /// Read-only copy of all counters plus the running total, for reporting.
    pub fn snapshot(&self) -> (HashMap<String, UptimeCounter>, u64) {
        (self.counters.clone(), self.total_attested)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Validator;

    fn committee(addresses: &[&str]) -> Committee {
        Committee {
            epoch: 1,
            validators: addresses
                .iter()
                .enumerate()
                .map(|(i, addr)| Validator {
                    name: format!("validator-{i}"),
                    sui_address: addr.to_string(),
                    protocol_pubkey: format!("pk-{i}"),
                    bitmap_index: i as u32,
                    voting_power: 1,
                })
                .collect(),
        }
    }

    #[test]
    fn test_initialize_bootstraps_zero_counters() {
        let mut ledger = Ledger::new();
        ledger.initialize(&committee(&["a", "b"]));
        assert_eq!(ledger.get("a"), Some(UptimeCounter::default()));
        assert_eq!(ledger.get("b"), Some(UptimeCounter::default()));
        assert_eq!(ledger.get("c"), None);
    }

    #[test]
    fn test_initialize_preserves_existing_counters() {
        let mut ledger = Ledger::new();
        ledger.initialize(&committee(&["a", "b"]));
        ledger.record_signed("a");
        ledger.record_signed("a");

        // Reload with an overlapping committee: "a" keeps its count, "c"
        // starts at zero.
        ledger.initialize(&committee(&["a", "c"]));
        assert_eq!(ledger.get("a").unwrap().attested, 2);
        assert_eq!(ledger.get("c").unwrap().attested, 0);
    }

    #[test]
    fn test_record_signed_increments_and_marks() {
        let mut ledger = Ledger::new();
        ledger.initialize(&committee(&["a"]));
        ledger.record_signed("a");
        let counter = ledger.get("a").unwrap();
        assert_eq!(counter.attested, 1);
        assert!(counter.signed_current);
    }

    #[test]
    fn test_record_signed_unknown_is_noop() {
        let mut ledger = Ledger::new();
        ledger.initialize(&committee(&["a"]));
        ledger.record_signed("ghost");
        assert_eq!(ledger.get("ghost"), None);
        assert_eq!(ledger.get("a").unwrap().attested, 0);
    }

    #[test]
    fn test_reset_current_is_idempotent() {
        let mut ledger = Ledger::new();
        let c = committee(&["a", "b"]);
        ledger.initialize(&c);
        ledger.record_signed("a");

        ledger.reset_current(&c);
        let once = ledger.snapshot();
        ledger.reset_current(&c);
        let twice = ledger.snapshot();
        assert_eq!(once, twice);
        assert!(!ledger.signed_current("a"));
        assert_eq!(ledger.get("a").unwrap().attested, 1);
    }

    #[test]
    fn test_attested_count_monotone_across_reloads() {
        let mut ledger = Ledger::new();
        let first = committee(&["a", "b"]);
        ledger.initialize(&first);
        for _ in 0..5 {
            ledger.increment_total();
            ledger.reset_current(&first);
            ledger.record_signed("a");
        }
        assert_eq!(ledger.get("a").unwrap().attested, 5);

        let second = committee(&["a", "c"]);
        ledger.initialize(&second);
        ledger.increment_total();
        ledger.reset_current(&second);
        ledger.record_signed("a");
        ledger.record_signed("c");
        assert_eq!(ledger.get("a").unwrap().attested, 6);
        assert_eq!(ledger.get("c").unwrap().attested, 1);
        assert_eq!(ledger.total_attested(), 6);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut ledger = Ledger::new();
        ledger.initialize(&committee(&["a"]));
        let (counters, total) = ledger.snapshot();
        ledger.record_signed("a");
        ledger.increment_total();
        assert_eq!(counters.get("a").unwrap().attested, 0);
        assert_eq!(total, 0);
    }
}
