//! The checkpoint processor: orchestrates committee reloads, signer
//! matching, ledger mutation, and snapshot emission.

use crate::{
    bitmap,
    committee::{CommitteeSource, Loader},
    ledger::Ledger,
    metrics::Metrics,
    sinks::Sink,
    types::{CheckpointSignatures, Committee, Epoch, SequenceNumber, Snapshot},
};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// The one condition that aborts the process: once a signer index falls
/// outside the committee, the bitmap-to-validator mapping can no longer be
/// trusted and continuing would silently mis-attribute signatures.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum FatalError {
    #[error(
        "signer index {index} out of bounds for committee of {committee_size} \
         (epoch {epoch}, checkpoint {sequence})"
    )]
    SignerIndexOutOfRange {
        index: u32,
        committee_size: usize,
        epoch: Epoch,
        sequence: SequenceNumber,
    },
}

/// Drives checkpoint-signature accounting for one process lifetime.
///
/// Owns the current epoch, committee, and ledger exclusively; sinks only
/// ever receive a detached [Snapshot].
pub struct Engine<C: CommitteeSource> {
    loader: Loader<C>,
    ledger: Ledger,
    committee: Arc<Committee>,
    epoch: Epoch,
    sinks: Vec<Box<dyn Sink>>,
    metrics: Metrics,
}

impl<C: CommitteeSource> Engine<C> {
    /// Creates an engine from an initial committee load.
    pub fn new(
        loader: Loader<C>,
        initial: Committee,
        sinks: Vec<Box<dyn Sink>>,
        metrics: Metrics,
    ) -> Self {
        let mut ledger = Ledger::new();
        ledger.initialize(&initial);
        metrics.committee_size.set(initial.len() as i64);
        Self {
            loader,
            ledger,
            epoch: initial.epoch,
            committee: Arc::new(initial),
            sinks,
            metrics,
        }
    }

    /// Processes events until the channel closes or shutdown fires, then
    /// closes the sinks (flushing any pending export state).
    ///
    /// Returns an error only on a fatal invariant violation.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<CheckpointSignatures>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), FatalError> {
        let result = loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => {
                        if let Err(fatal) = self.process(event).await {
                            error!(%fatal, "invariant violation, aborting");
                            break Err(fatal);
                        }
                    }
                    None => {
                        info!("event channel closed, stopping");
                        break Ok(());
                    }
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("shutdown signal received, stopping");
                        break Ok(());
                    }
                }
            }
        };
        for sink in &mut self.sinks {
            sink.close();
        }
        result
    }

    /// Applies one checkpoint-signature event.
    async fn process(&mut self, event: CheckpointSignatures) -> Result<(), FatalError> {
        // Checkpoints without signature data do not count toward the
        // denominator.
        let Some(signers) = event.signers else {
            debug!(sequence = event.sequence, "checkpoint without signature data, skipping");
            return Ok(());
        };

        self.ledger.increment_total();
        self.metrics.checkpoints.inc();

        if event.epoch > self.epoch {
            info!(from = self.epoch, to = event.epoch, "epoch changed, reloading committee");
            self.reload(event.epoch).await;
        }

        self.ledger.reset_current(&self.committee);

        let committee_size = self.committee.len();
        for &index in &signers {
            if index as usize >= committee_size {
                return Err(FatalError::SignerIndexOutOfRange {
                    index,
                    committee_size,
                    epoch: self.epoch,
                    sequence: event.sequence,
                });
            }
        }

        for validator in &self.committee.validators {
            if bitmap::is_signer(&signers, validator.bitmap_index) {
                self.ledger.record_signed(&validator.sui_address);
            }
        }

        let snapshot = self.snapshot(event.sequence, signers);
        self.metrics.signed_power.set(snapshot.signed_power as i64);
        self.metrics.total_power.set(snapshot.total_power as i64);
        for sink in &mut self.sinks {
            sink.publish(&snapshot);
        }
        Ok(())
    }

    /// Attempts a committee reload for `epoch`. On failure the engine keeps
    /// the stale committee and epoch, so the next epoch-incrementing event
    /// retries.
    async fn reload(&mut self, epoch: Epoch) {
        match self.loader.load(Some(epoch)).await {
            Ok((committee, resolved)) => {
                self.ledger.initialize(&committee);
                self.epoch = resolved;
                self.metrics.committee_size.set(committee.len() as i64);
                info!(
                    epoch = resolved,
                    validators = committee.len(),
                    "reloaded committee"
                );
                self.committee = Arc::new(committee);
            }
            Err(err) => {
                self.metrics.reload_failures.inc();
                warn!(
                    %err,
                    epoch,
                    "failed to reload committee, continuing with stale committee"
                );
            }
        }
    }

    fn snapshot(&self, sequence: SequenceNumber, signers: Vec<u32>) -> Snapshot {
        let (counters, total_attested) = self.ledger.snapshot();
        let mut signed_power = 0;
        for validator in &self.committee.validators {
            if self.ledger.signed_current(&validator.sui_address) {
                signed_power += validator.voting_power;
            }
        }
        Snapshot {
            epoch: self.epoch,
            sequence,
            total_attested,
            signed_power,
            total_power: self.committee.total_power(),
            committee: self.committee.clone(),
            counters,
            signers,
        }
    }
}
