//! Resilient consumption of the live checkpoint-signature stream.
//!
//! The loop keeps exactly one subscription open at a time. A stream that
//! ends or fails with anything other than caller cancellation is reopened
//! after a fixed delay; events already delivered are never re-requested or
//! dropped. Cancellation (of the caller or via the shutdown signal) closes
//! the output channel and terminates the loop.

use crate::{metrics::Metrics, types::CheckpointSignatures};
use futures::{Stream, StreamExt};
use std::{future::Future, time::Duration};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Errors surfaced by an [EventSource] or its stream.
#[derive(Error, Debug)]
pub enum StreamError {
    /// The caller tore the subscription down. Terminal; never retried.
    #[error("cancelled")]
    Cancelled,
    /// Transport-level failure (dial failure, reset, transient server
    /// condition). Retried after the configured delay.
    #[error("transport: {0}")]
    Transport(String),
    /// Anything unrecognized. Treated as transient and retried; the liberal
    /// policy trades possible infinite retries for availability.
    #[error("stream: {0}")]
    Other(String),
}

impl StreamError {
    /// Whether the error terminates the loop instead of scheduling a
    /// resubscription.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamError::Cancelled)
    }
}

/// A resubscribable server-stream of checkpoint signature events.
pub trait EventSource: Send {
    type Stream: Stream<Item = Result<CheckpointSignatures, StreamError>> + Send + Unpin;

    /// Opens a new stream. Invoked once per (re)subscription attempt.
    fn subscribe(&mut self) -> impl Future<Output = Result<Self::Stream, StreamError>> + Send;
}

#[derive(Clone, Debug)]
pub struct Config {
    /// Fixed delay between a disconnect and the next subscription attempt.
    pub retry_delay: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// Drives an [EventSource], forwarding decoded events to a channel.
pub struct Subscriber<S: EventSource> {
    source: S,
    cfg: Config,
    metrics: Metrics,
}

impl<S: EventSource> Subscriber<S> {
    pub fn new(source: S, cfg: Config, metrics: Metrics) -> Self {
        Self {
            source,
            cfg,
            metrics,
        }
    }

    /// Runs until cancelled or the consumer goes away. Dropping the sender
    /// on return closes the channel, which the consumer observes as
    /// end-of-input.
    pub async fn run(
        mut self,
        events: mpsc::Sender<CheckpointSignatures>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            if *shutdown.borrow() {
                break;
            }

            debug!("subscribing to checkpoint stream");
            let stream = tokio::select! {
                result = self.source.subscribe() => match result {
                    Ok(stream) => stream,
                    Err(err) if err.is_terminal() => {
                        info!("subscription cancelled");
                        break;
                    }
                    Err(err) => {
                        warn!(%err, "failed to subscribe");
                        if !self.backoff(&mut shutdown).await {
                            break;
                        }
                        continue;
                    }
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            };
            info!("subscribed, waiting for checkpoints");

            if !self.stream(stream, &events, &mut shutdown).await {
                break;
            }
            self.metrics.resubscribes.inc();
            if !self.backoff(&mut shutdown).await {
                break;
            }
        }
        info!("subscriber terminated");
    }

    /// Consumes one open stream. Returns whether the loop should
    /// resubscribe.
    async fn stream(
        &mut self,
        mut stream: S::Stream,
        events: &mpsc::Sender<CheckpointSignatures>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> bool {
        loop {
            tokio::select! {
                item = stream.next() => match item {
                    Some(Ok(event)) => {
                        // Blocking handoff: wait for channel capacity rather
                        // than drop a decoded event. If the consumer is gone,
                        // terminate.
                        if events.send(event).await.is_err() {
                            debug!("event channel closed, terminating");
                            return false;
                        }
                    }
                    Some(Err(err)) if err.is_terminal() => {
                        info!("stream cancelled, terminating");
                        return false;
                    }
                    Some(Err(err)) => {
                        warn!(%err, "stream failed, resubscribing");
                        return true;
                    }
                    None => {
                        info!("stream ended, resubscribing");
                        return true;
                    }
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return false;
                    }
                }
            }
        }
    }

    /// Waits out the retry delay. Returns false if shutdown fired first.
    async fn backoff(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        debug!(delay = ?self.cfg.retry_delay, "waiting before resubscribing");
        tokio::select! {
            _ = tokio::time::sleep(self.cfg.retry_delay) => true,
            changed = shutdown.changed() => !(changed.is_err() || *shutdown.borrow()),
        }
    }
}
