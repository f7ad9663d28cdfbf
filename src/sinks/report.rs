//! Plain-text per-checkpoint reports.

use crate::{sinks::Sink, types::Snapshot};
use std::io::{self, Write};
use tracing::warn;

/// Prints a two-column participation report after every checkpoint.
///
/// Used in place of the dashboard when the process is not attached to an
/// interactive terminal.
pub struct ReportSink<W: Write + Send> {
    out: W,
}

impl ReportSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> ReportSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    fn write_report(&mut self, snapshot: &Snapshot) -> io::Result<()> {
        writeln!(self.out)?;
        writeln!(
            self.out,
            "--- Checkpoint #{} (Epoch: {}, Total w/Sig: {}) ---",
            snapshot.sequence, snapshot.epoch, snapshot.total_attested
        )?;
        if snapshot.total_power > 0 {
            let pct = snapshot.signed_power as f64 / snapshot.total_power as f64 * 100.0;
            writeln!(
                self.out,
                "Voting power signed: {pct:.2}% ({}/{})",
                snapshot.signed_power, snapshot.total_power
            )?;
        }

        let mut validators: Vec<_> = snapshot.committee.validators.iter().collect();
        validators.sort_by(|a, b| a.name.cmp(&b.name));

        let mut lines = Vec::with_capacity(validators.len());
        for validator in validators {
            let Some(counter) = snapshot.counters.get(&validator.sui_address) else {
                warn!(
                    name = %validator.name,
                    address = %validator.sui_address,
                    "committee member missing from counters, omitting from report"
                );
                continue;
            };
            let status = if counter.signed_current { "✅" } else { "❌" };
            let uptime = if snapshot.total_attested > 0 {
                counter.attested as f64 / snapshot.total_attested as f64 * 100.0
            } else {
                0.0
            };
            lines.push(format!(
                "{status} {:<40} - Attested: {uptime:6.2}% ({:4}/{:4})",
                validator.name, counter.attested, snapshot.total_attested
            ));
        }

        for pair in lines.chunks(2) {
            match pair {
                [left, right] => writeln!(self.out, "{left}   |   {right}")?,
                [left] => writeln!(self.out, "{left}")?,
                _ => unreachable!(),
            }
        }
        self.out.flush()
    }
}

impl<W: Write + Send> Sink for ReportSink<W> {
    fn publish(&mut self, snapshot: &Snapshot) {
        if let Err(err) = self.write_report(snapshot) {
            warn!(%err, "failed to write report");
        }
    }
}
