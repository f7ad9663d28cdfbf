//! Shared data types for committee, checkpoint, and snapshot state.

use std::{collections::HashMap, sync::Arc};

/// A committee-defining period. Committee membership and bitmap indices are
/// only valid within one epoch.
pub type Epoch = u64;

/// The sequence number of a checkpoint.
pub type SequenceNumber = u64;

/// One committee member for a given epoch.
///
/// Constructed fresh on every committee (re)load and never mutated; the whole
/// committee is replaced wholesale when the epoch changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validator {
    /// Display name from validator metadata.
    pub name: String,
    /// Stable identity that persists across epochs; the ledger key.
    pub sui_address: String,
    /// Per-epoch protocol (BLS) public key, used to join committee order
    /// against validator metadata.
    pub protocol_pubkey: String,
    /// Position in the epoch's canonical committee ordering. Only valid
    /// within the epoch that produced it.
    pub bitmap_index: u32,
    /// Non-negative weight used for power-weighted participation.
    pub voting_power: u64,
}

/// Ordered committee for one epoch. `bitmap_index` values are exactly
/// `0..N-1` with no duplicates, in canonical (upstream) order.
#[derive(Debug, Clone)]
pub struct Committee {
    pub epoch: Epoch,
    pub validators: Vec<Validator>,
}

impl Committee {
    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Sum of voting power over all members.
    pub fn total_power(&self) -> u64 {
        self.validators.iter().map(|v| v.voting_power).sum()
    }
}

/// One inbound unit of work: the aggregated signature data of a checkpoint.
///
/// `signers` is `None` when the checkpoint carried no signature data; such
/// checkpoints are skipped and do not count toward the uptime denominator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointSignatures {
    pub sequence: SequenceNumber,
    pub epoch: Epoch,
    /// Indices into the epoch's committee ordering of the validators that
    /// co-signed the checkpoint.
    pub signers: Option<Vec<u32>>,
}

/// Per-validator uptime counters, keyed by `sui_address` in the ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UptimeCounter {
    /// Number of signed checkpoints attested. Non-decreasing for the
    /// lifetime of the entry, including across committee reloads.
    pub attested: u64,
    /// Whether the validator signed the most recently processed checkpoint.
    pub signed_current: bool,
}

/// A point-in-time copy of engine state, emitted once per processed
/// checkpoint-with-signature. Self-contained so sinks never observe the live
/// mutable structures.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub epoch: Epoch,
    pub sequence: SequenceNumber,
    /// Total checkpoints observed that carried signature data.
    pub total_attested: u64,
    /// Voting power of the validators that signed this checkpoint.
    pub signed_power: u64,
    /// Voting power of the full committee.
    pub total_power: u64,
    pub committee: Arc<Committee>,
    pub counters: HashMap<String, UptimeCounter>,
    /// Raw signer indices of this checkpoint.
    pub signers: Vec<u32>,
}
