//! Live terminal dashboard.
//!
//! Rendering runs on its own task behind a bounded frame queue so a slow or
//! wedged terminal can never stall checkpoint accounting. The engine-facing
//! half is [DashboardSink]; [Dashboard] owns the terminal.

use crate::{sinks::Sink, types::Snapshot};
use crossterm::{
    event::{Event, EventStream, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures::StreamExt;
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Gauge, Paragraph, Row, Table},
    Frame, Terminal,
};
use std::io::{self, Stdout};
use tokio::sync::{mpsc, watch};
use tracing::debug;

/// Frames queued between the engine and the renderer. Overflow drops the
/// oldest pending frame's slot (the renderer only ever shows the latest
/// state anyway).
const FRAME_BUFFER: usize = 32;

const UPTIME_BAR_WIDTH: usize = 10;

/// Engine-facing half: forwards snapshots to the render task without
/// blocking.
pub struct DashboardSink {
    frames: mpsc::Sender<Snapshot>,
}

impl Sink for DashboardSink {
    fn publish(&mut self, snapshot: &Snapshot) {
        if self.frames.try_send(snapshot.clone()).is_err() {
            debug!("dashboard behind, dropping frame");
        }
    }
}

/// Render half: owns the terminal for the process lifetime.
pub struct Dashboard {
    frames: mpsc::Receiver<Snapshot>,
    latest: Option<Snapshot>,
}

impl Dashboard {
    pub fn new() -> (DashboardSink, Self) {
        let (tx, rx) = mpsc::channel(FRAME_BUFFER);
        (
            DashboardSink { frames: tx },
            Self {
                frames: rx,
                latest: None,
            },
        )
    }

    /// Runs until shutdown fires or a quit key (`q`, `Esc`, ctrl-c) is
    /// pressed; a quit key signals shutdown for the whole process.
    pub async fn run(mut self, shutdown: watch::Sender<bool>) -> io::Result<()> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;

        let result = self.render_loop(&mut terminal, &shutdown).await;

        // Restore the terminal even if the loop failed.
        let _ = disable_raw_mode();
        let _ = execute!(terminal.backend_mut(), LeaveAlternateScreen);
        let _ = terminal.show_cursor();
        result
    }

    async fn render_loop(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<Stdout>>,
        shutdown: &watch::Sender<bool>,
    ) -> io::Result<()> {
        let mut shutdown_rx = shutdown.subscribe();
        let mut input = EventStream::new();
        loop {
            terminal.draw(|frame| draw(frame, self.latest.as_ref()))?;
            tokio::select! {
                frame = self.frames.recv() => match frame {
                    Some(snapshot) => self.latest = Some(snapshot),
                    None => break,
                },
                event = input.next() => match event {
                    Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                        let quit = matches!(key.code, KeyCode::Char('q') | KeyCode::Esc)
                            || (key.code == KeyCode::Char('c')
                                && key.modifiers.contains(KeyModifiers::CONTROL));
                        if quit {
                            debug!("quit key pressed, signalling shutdown");
                            let _ = shutdown.send(true);
                            break;
                        }
                    }
                    // Resizes and other events just trigger a redraw.
                    Some(Ok(_)) => {}
                    Some(Err(err)) => return Err(err),
                    None => break,
                },
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
        Ok(())
    }
}

fn draw(frame: &mut Frame, latest: Option<&Snapshot>) {
    let Some(snapshot) = latest else {
        frame.render_widget(
            Paragraph::new("Waiting for checkpoints...")
                .block(Block::default().borders(Borders::ALL).title("suiwatch")),
            frame.size(),
        );
        return;
    };

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(7), Constraint::Min(0)])
        .split(frame.size());
    let header = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(rows[0]);

    draw_info(frame, header[0], snapshot);
    draw_power(frame, header[1], snapshot);
    draw_validators(frame, rows[1], snapshot);
}

fn draw_info(frame: &mut Frame, area: Rect, snapshot: &Snapshot) {
    let text = format!(
        "Epoch: {}\nCheckpoint: {}\nCheckpoint samples: {}\nCommittee size: {} validators\nQuit: q / Esc",
        snapshot.epoch,
        snapshot.sequence,
        snapshot.total_attested,
        snapshot.committee.len(),
    );
    frame.render_widget(
        Paragraph::new(text).block(Block::default().borders(Borders::ALL).title("suiwatch")),
        area,
    );
}

fn draw_power(frame: &mut Frame, area: Rect, snapshot: &Snapshot) {
    let ratio = if snapshot.total_power > 0 {
        (snapshot.signed_power as f64 / snapshot.total_power as f64).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let gauge = Gauge::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Voting power signed"),
        )
        .gauge_style(Style::default().fg(Color::Green))
        .label(format!(
            "{:.2}% ({}/{})",
            ratio * 100.0,
            snapshot.signed_power,
            snapshot.total_power
        ))
        .ratio(ratio);
    frame.render_widget(gauge, area);
}

fn draw_validators(frame: &mut Frame, area: Rect, snapshot: &Snapshot) {
    let mut validators: Vec<_> = snapshot.committee.validators.iter().collect();
    validators.sort_by(|a, b| a.name.cmp(&b.name));

    let rows: Vec<Row> = validators
        .into_iter()
        .map(|validator| {
            let (status, uptime) = match snapshot.counters.get(&validator.sui_address) {
                Some(counter) => {
                    let status = if counter.signed_current { "✅" } else { "❌" };
                    let ratio = if snapshot.total_attested > 0 {
                        counter.attested as f64 / snapshot.total_attested as f64
                    } else {
                        0.0
                    };
                    (status, format!("{} {:.2}%", uptime_bar(ratio), ratio * 100.0))
                }
                None => ("❓", "N/A".to_string()),
            };
            Row::new(vec![status.to_string(), validator.name.clone(), uptime])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(6),
            Constraint::Min(24),
            Constraint::Length(20),
        ],
    )
    .header(
        Row::new(vec!["Status", "Validator", "Signed %"])
            .style(Style::default().add_modifier(Modifier::BOLD)),
    )
    .block(Block::default().borders(Borders::ALL).title("Validators"));
    frame.render_widget(table, area);
}

fn uptime_bar(ratio: f64) -> String {
    let filled = ((ratio * UPTIME_BAR_WIDTH as f64) as usize).min(UPTIME_BAR_WIDTH);
    let mut bar = String::with_capacity(UPTIME_BAR_WIDTH + 2);
    bar.push('[');
    for i in 0..UPTIME_BAR_WIDTH {
        bar.push(if i < filled { '▓' } else { ' ' });
    }
    bar.push(']');
    bar
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Committee, UptimeCounter};
    use std::{collections::HashMap, sync::Arc};

    #[test]
    fn test_uptime_bar_fill() {
        assert_eq!(uptime_bar(0.0), "[          ]");
        assert_eq!(uptime_bar(0.5), "[▓▓▓▓▓     ]");
        assert_eq!(uptime_bar(1.0), "[▓▓▓▓▓▓▓▓▓▓]");
        // Overshoot is capped.
        assert_eq!(uptime_bar(1.7), "[▓▓▓▓▓▓▓▓▓▓]");
    }

    #[tokio::test]
    async fn test_sink_drops_frames_under_backpressure() {
        let (mut sink, _dashboard) = Dashboard::new();
        let snapshot = Snapshot {
            epoch: 1,
            sequence: 1,
            total_attested: 1,
            signed_power: 0,
            total_power: 0,
            committee: Arc::new(Committee {
                epoch: 1,
                validators: Vec::new(),
            }),
            counters: HashMap::<String, UptimeCounter>::new(),
            signers: Vec::new(),
        };
        // Nothing drains the queue; publishing past capacity must not block
        // or panic.
        for _ in 0..(FRAME_BUFFER + 8) {
            sink.publish(&snapshot);
        }
    }
}
