//! Mock implementations of the upstream collaborators, for tests and
//! simulation.

use crate::{
    committee::{CommitteeError, CommitteeInfo, CommitteeMember, CommitteeSource, SystemState},
    sinks::Sink,
    subscriber::{EventSource, StreamError},
    types::{CheckpointSignatures, Epoch, Snapshot},
};
use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
};

/// A [CommitteeSource] backed by in-memory data.
///
/// Clones share the committee map, so a clone kept by a test can add epochs
/// after the source has been moved into a loader.
#[derive(Clone, Default)]
pub struct StaticCommittees {
    /// Epoch reported by the latest system state.
    pub latest_epoch: Epoch,
    /// Reported epoch of the metadata, when it should differ from
    /// `latest_epoch`.
    pub metadata_epoch: Option<Epoch>,
    /// Active validator metadata returned with the system state.
    pub metadata: Vec<crate::committee::ValidatorMetadata>,
    committees: Arc<Mutex<HashMap<Epoch, Vec<CommitteeMember>>>>,
}

impl StaticCommittees {
    pub fn new(latest_epoch: Epoch) -> Self {
        Self {
            latest_epoch,
            ..Default::default()
        }
    }

    /// Registers the committee ordering for an epoch. Unregistered epochs
    /// yield a source error.
    pub fn insert_committee(&self, epoch: Epoch, members: Vec<CommitteeMember>) {
        self.committees.lock().unwrap().insert(epoch, members);
    }
}

impl CommitteeSource for StaticCommittees {
    async fn latest_system_state(&self) -> Result<SystemState, CommitteeError> {
        Ok(SystemState {
            epoch: self.metadata_epoch.unwrap_or(self.latest_epoch),
            validators: self.metadata.clone(),
        })
    }

    async fn committee_info(&self, epoch: Epoch) -> Result<CommitteeInfo, CommitteeError> {
        let members = self
            .committees
            .lock()
            .unwrap()
            .get(&epoch)
            .cloned()
            .ok_or_else(|| CommitteeError::Source(format!("no committee for epoch {epoch}")))?;
        Ok(CommitteeInfo { epoch, members })
    }
}

/// An [EventSource] that replays scripted streams.
///
/// Each call to `subscribe` pops the next script; a `None` item ends the
/// stream (clean EOF). Once all scripts are exhausted, subscribing fails
/// with [StreamError::Cancelled] so resilience-loop tests terminate.
pub struct ScriptedEvents {
    scripts: VecDeque<Vec<Result<CheckpointSignatures, StreamError>>>,
    subscriptions: Arc<Mutex<usize>>,
}

impl ScriptedEvents {
    pub fn new(scripts: Vec<Vec<Result<CheckpointSignatures, StreamError>>>) -> Self {
        Self {
            scripts: scripts.into(),
            subscriptions: Arc::new(Mutex::new(0)),
        }
    }

    /// Shared count of `subscribe` calls, observable after the source is
    /// moved into the loop.
    pub fn subscriptions(&self) -> Arc<Mutex<usize>> {
        self.subscriptions.clone()
    }
}

impl EventSource for ScriptedEvents {
    type Stream = futures::stream::Iter<std::vec::IntoIter<Result<CheckpointSignatures, StreamError>>>;

    async fn subscribe(&mut self) -> Result<Self::Stream, StreamError> {
        *self.subscriptions.lock().unwrap() += 1;
        match self.scripts.pop_front() {
            Some(script) => Ok(futures::stream::iter(script)),
            None => Err(StreamError::Cancelled),
        }
    }
}

/// A [Sink] that collects published snapshots for inspection.
#[derive(Clone, Default)]
pub struct CollectSink {
    published: Arc<Mutex<Vec<Snapshot>>>,
    closed: Arc<Mutex<bool>>,
}

impl CollectSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Arc<Mutex<Vec<Snapshot>>> {
        self.published.clone()
    }

    pub fn closed(&self) -> bool {
        *self.closed.lock().unwrap()
    }
}

impl Sink for CollectSink {
    fn publish(&mut self, snapshot: &Snapshot) {
        self.published.lock().unwrap().push(snapshot.clone());
    }

    fn close(&mut self) {
        *self.closed.lock().unwrap() = true;
    }
}

/// Builds a signed-checkpoint event.
pub fn signed_checkpoint(sequence: u64, epoch: Epoch, signers: &[u32]) -> CheckpointSignatures {
    CheckpointSignatures {
        sequence,
        epoch,
        signers: Some(signers.to_vec()),
    }
}

/// Builds a checkpoint event that carries no signature data.
pub fn unsigned_checkpoint(sequence: u64, epoch: Epoch) -> CheckpointSignatures {
    CheckpointSignatures {
        sequence,
        epoch,
        signers: None,
    }
}
