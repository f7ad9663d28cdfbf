//! Snapshot consumers: report printing, dataset export, and the live
//! dashboard.
//!
//! Sinks are deliberately dumb. They receive a detached [Snapshot] after
//! every processed checkpoint and may not fail the pipeline; a sink that
//! cannot keep up or cannot write degrades on its own (dropped frame, logged
//! warning) without affecting accounting.

mod dashboard;
mod dataset;
mod report;

pub use dashboard::{Dashboard, DashboardSink};
pub use dataset::DatasetSink;
pub use report::ReportSink;

use crate::types::Snapshot;

/// A consumer of engine snapshots.
pub trait Sink: Send {
    /// Delivers one snapshot. Must not block the engine for long.
    fn publish(&mut self, snapshot: &Snapshot);

    /// Flushes any pending state. Called exactly once, when the engine
    /// stops (including on the fatal path).
    fn close(&mut self) {}
}
