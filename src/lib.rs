//! Checkpoint-signature accounting for Sui validator committees.
//!
//! Consumes the live stream of checkpoint aggregated signatures from a
//! fullnode, reconciles each epoch's committee ordering with validator
//! metadata, and maintains a per-validator uptime ledger: how many signed
//! checkpoints each validator attested to, and whether it signed the most
//! recent one. Snapshots of the ledger feed pluggable sinks (terminal
//! dashboard, plain-text reports, per-epoch dataset export).
//!
//! The pipeline is three stages connected by channels:
//! [subscriber::Subscriber] keeps exactly one subscription to the event
//! stream open and reopens it after disconnects; [engine::Engine] applies
//! each event to the ledger, reloading the committee when the epoch
//! advances; sinks consume detached [types::Snapshot]s and can never fail
//! the pipeline.

pub mod bitmap;
pub mod committee;
pub mod engine;
pub mod ledger;
pub mod metrics;
pub mod mocks;
pub mod rpc;
pub mod sinks;
pub mod subscriber;
pub mod types;
