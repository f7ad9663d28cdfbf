//! Reconciliation of the committee-of-epoch ordering against validator
//! metadata.
//!
//! Two upstream inputs are joined by protocol public key: the canonical
//! committee ordering for an epoch (the source of truth for bitmap index
//! assignment) and the latest validator metadata (display name and stable
//! identity). The ordering is authoritative; metadata is a best-effort
//! overlay.

use crate::types::{Committee, Epoch, Validator};
use std::{collections::HashMap, future::Future};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that can occur while loading a committee. All are fatal to the
/// reload attempt but not to the process; the caller decides whether to keep
/// operating on a stale committee.
#[derive(Error, Debug)]
pub enum CommitteeError {
    #[error("source: {0}")]
    Source(String),
    #[error("epoch could not be determined")]
    EpochUnresolved,
    #[error("committee for epoch {0} is empty")]
    Empty(Epoch),
    #[error("malformed committee entry at index {index} for epoch {epoch}: missing public key")]
    MalformedEntry { epoch: Epoch, index: usize },
}

/// Metadata for one active validator, independent of epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorMetadata {
    pub name: String,
    pub sui_address: String,
    pub protocol_pubkey: String,
}

/// The latest system state: the current epoch plus active validator
/// metadata.
#[derive(Debug, Clone)]
pub struct SystemState {
    pub epoch: Epoch,
    pub validators: Vec<ValidatorMetadata>,
}

/// One entry of the canonical committee ordering.
#[derive(Debug, Clone)]
pub struct CommitteeMember {
    pub protocol_pubkey: String,
    pub voting_power: u64,
}

/// The canonical committee ordering for an epoch. Bitmap index equals
/// position in `members`.
#[derive(Debug, Clone)]
pub struct CommitteeInfo {
    pub epoch: Epoch,
    pub members: Vec<CommitteeMember>,
}

/// Upstream source of committee orderings and validator metadata.
pub trait CommitteeSource: Send + Sync {
    /// Fetches the latest system state (always "latest"; not epoch-scoped).
    fn latest_system_state(
        &self,
    ) -> impl Future<Output = Result<SystemState, CommitteeError>> + Send;

    /// Fetches the canonical committee ordering for the given epoch.
    fn committee_info(
        &self,
        epoch: Epoch,
    ) -> impl Future<Output = Result<CommitteeInfo, CommitteeError>> + Send;
}

/// Joins the committee ordering for an epoch with validator metadata into an
/// ordered list of [Validator] records.
pub struct Loader<C: CommitteeSource> {
    source: C,
}

impl<C: CommitteeSource> Loader<C> {
    pub fn new(source: C) -> Self {
        Self { source }
    }

    /// Loads the committee for `target`, or for the latest epoch when
    /// `target` is `None`.
    ///
    /// Returns the committee and the resolved epoch, which is authoritative
    /// even if it differs from the requested one. Every position in the
    /// upstream ordering yields a record: a member missing from metadata gets
    /// a placeholder identity derived from its public key, never a dropped
    /// index.
    pub async fn load(&self, target: Option<Epoch>) -> Result<(Committee, Epoch), CommitteeError> {
        let epoch = match target {
            Some(epoch) => epoch,
            None => {
                debug!("target epoch not specified, resolving latest from system state");
                self.source.latest_system_state().await?.epoch
            }
        };

        let info = self.source.committee_info(epoch).await?;
        let resolved = info.epoch;
        if resolved != epoch {
            warn!(
                requested = epoch,
                resolved, "committee info resolved to a different epoch"
            );
        }
        if info.members.is_empty() {
            return Err(CommitteeError::Empty(resolved));
        }
        for (index, member) in info.members.iter().enumerate() {
            if member.protocol_pubkey.is_empty() {
                return Err(CommitteeError::MalformedEntry {
                    epoch: resolved,
                    index,
                });
            }
        }

        let metadata = self.source.latest_system_state().await?;
        if metadata.epoch != resolved {
            // Metadata is cosmetic; the committee ordering stays
            // authoritative.
            warn!(
                committee_epoch = resolved,
                metadata_epoch = metadata.epoch,
                "validator metadata is from a different epoch, proceeding"
            );
        }
        let mut by_pubkey = HashMap::new();
        for meta in &metadata.validators {
            if meta.protocol_pubkey.is_empty() {
                warn!(
                    name = %meta.name,
                    address = %meta.sui_address,
                    "active validator is missing a protocol public key, skipping for join"
                );
                continue;
            }
            by_pubkey.insert(meta.protocol_pubkey.as_str(), meta);
        }

        let validators = info
            .members
            .iter()
            .enumerate()
            .map(|(index, member)| {
                let bitmap_index = index as u32;
                match by_pubkey.get(member.protocol_pubkey.as_str()) {
                    Some(meta) => Validator {
                        name: meta.name.trim().to_string(),
                        sui_address: meta.sui_address.clone(),
                        protocol_pubkey: member.protocol_pubkey.clone(),
                        bitmap_index,
                        voting_power: member.voting_power,
                    },
                    None => {
                        warn!(
                            pubkey = short_pubkey(&member.protocol_pubkey),
                            bitmap_index, "committee member missing from metadata, using placeholder"
                        );
                        placeholder(&member.protocol_pubkey, bitmap_index, member.voting_power)
                    }
                }
            })
            .collect();

        info!(
            epoch = resolved,
            validators = info.members.len(),
            "loaded committee"
        );
        Ok((
            Committee {
                epoch: resolved,
                validators,
            },
            resolved,
        ))
    }
}

/// Synthesizes a record for a committee member absent from metadata so its
/// bitmap index still has an owner.
fn placeholder(pubkey: &str, bitmap_index: u32, voting_power: u64) -> Validator {
    let short = short_pubkey(pubkey);
    Validator {
        name: format!("unknown ({short}...)"),
        sui_address: format!("unknown-{short}"),
        protocol_pubkey: pubkey.to_string(),
        bitmap_index,
        voting_power,
    }
}

/// Truncates a public key for logging and placeholder identities.
pub fn short_pubkey(pubkey: &str) -> &str {
    pubkey.get(..10).unwrap_or(pubkey)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::StaticCommittees;

    fn metadata(name: &str, address: &str, pubkey: &str) -> ValidatorMetadata {
        ValidatorMetadata {
            name: name.to_string(),
            sui_address: address.to_string(),
            protocol_pubkey: pubkey.to_string(),
        }
    }

    fn member(pubkey: &str, power: u64) -> CommitteeMember {
        CommitteeMember {
            protocol_pubkey: pubkey.to_string(),
            voting_power: power,
        }
    }

    #[tokio::test]
    async fn test_load_joins_order_with_metadata() {
        let mut source = StaticCommittees::new(7);
        source.metadata = vec![
            metadata("alice", "0xa", "pk-a"),
            metadata("bob", "0xb", "pk-b"),
        ];
        // Committee order deliberately differs from metadata order.
        source.insert_committee(7, vec![member("pk-b", 100), member("pk-a", 200)]);

        let (committee, resolved) = Loader::new(source).load(Some(7)).await.unwrap();
        assert_eq!(resolved, 7);
        assert_eq!(committee.epoch, 7);
        assert_eq!(committee.len(), 2);
        assert_eq!(committee.validators[0].sui_address, "0xb");
        assert_eq!(committee.validators[0].bitmap_index, 0);
        assert_eq!(committee.validators[0].voting_power, 100);
        assert_eq!(committee.validators[1].sui_address, "0xa");
        assert_eq!(committee.validators[1].bitmap_index, 1);
        assert_eq!(committee.total_power(), 300);
    }

    #[tokio::test]
    async fn test_load_resolves_latest_epoch() {
        let mut source = StaticCommittees::new(9);
        source.metadata = vec![metadata("alice", "0xa", "pk-a")];
        source.insert_committee(9, vec![member("pk-a", 1)]);

        let (committee, resolved) = Loader::new(source).load(None).await.unwrap();
        assert_eq!(resolved, 9);
        assert_eq!(committee.epoch, 9);
    }

    #[tokio::test]
    async fn test_join_miss_synthesizes_placeholder() {
        let mut source = StaticCommittees::new(3);
        source.metadata = vec![metadata("alice", "0xa", "pk-a")];
        source.insert_committee(3, vec![member("pk-a", 10), member("pk-mystery", 20)]);

        let (committee, _) = Loader::new(source).load(Some(3)).await.unwrap();
        assert_eq!(committee.len(), 2);
        let ghost = &committee.validators[1];
        assert_eq!(ghost.bitmap_index, 1);
        assert_eq!(ghost.sui_address, "unknown-pk-mystery");
        assert_eq!(ghost.voting_power, 20);
    }

    #[tokio::test]
    async fn test_metadata_epoch_mismatch_is_nonfatal() {
        let mut source = StaticCommittees::new(5);
        source.metadata_epoch = Some(6);
        source.metadata = vec![metadata("alice", "0xa", "pk-a")];
        source.insert_committee(5, vec![member("pk-a", 1)]);

        let (committee, resolved) = Loader::new(source).load(Some(5)).await.unwrap();
        assert_eq!(resolved, 5);
        assert_eq!(committee.validators[0].name, "alice");
    }

    #[tokio::test]
    async fn test_empty_committee_is_an_error() {
        let mut source = StaticCommittees::new(4);
        source.insert_committee(4, Vec::new());
        let err = Loader::new(source).load(Some(4)).await.unwrap_err();
        assert!(matches!(err, CommitteeError::Empty(4)));
    }

    #[tokio::test]
    async fn test_malformed_entry_is_an_error() {
        let mut source = StaticCommittees::new(4);
        source.insert_committee(4, vec![member("pk-a", 1), member("", 2)]);
        let err = Loader::new(source).load(Some(4)).await.unwrap_err();
        assert!(matches!(
            err,
            CommitteeError::MalformedEntry { epoch: 4, index: 1 }
        ));
    }

    #[tokio::test]
    async fn test_unknown_epoch_surfaces_source_error() {
        let source = StaticCommittees::new(2);
        let err = Loader::new(source).load(Some(2)).await.unwrap_err();
        assert!(matches!(err, CommitteeError::Source(_)));
    }

    #[test]
    fn test_short_pubkey() {
        assert_eq!(short_pubkey("0123456789abcdef"), "0123456789");
        assert_eq!(short_pubkey("abc"), "abc");
    }
}
