//! Console output for render sessions.
//!
//! Raw log lines go to stdout unchanged. The progress status line lives on
//! stderr and is redrawn in place with `\r`, so piping stdout to a file keeps
//! a clean copy of the render log.

use std::io::{self, Write};

use anyhow::{Context, Result};

use crate::render::{ProgressSnapshot, SessionEvent, SessionOutcome, SessionState};

/// Width of the blank run used to clear the status line
const CLEAR_WIDTH: usize = 96;

/// Writes session events to the terminal, either human-readable or as JSON lines.
pub struct ConsolePresenter {
    json: bool,
    /// A status line is currently drawn on stderr
    status_shown: bool,
}

impl ConsolePresenter {
    /// Human-readable output: log on stdout, status line on stderr.
    pub fn new() -> Self {
        Self {
            json: false,
            status_shown: false,
        }
    }

    /// One JSON object per event on stdout.
    pub fn json() -> Self {
        Self {
            json: true,
            status_shown: false,
        }
    }

    /// Print the command about to run.
    pub fn announce(&mut self, command_line: &str) {
        if !self.json {
            eprintln!("Starting render: {}", command_line);
        }
    }

    /// Present one event.
    pub fn handle(&mut self, event: &SessionEvent) -> Result<()> {
        if self.json {
            let line = serde_json::to_string(event).context("Failed to serialize event")?;
            let mut out = io::stdout().lock();
            writeln!(out, "{}", line)?;
            return Ok(());
        }

        match event {
            SessionEvent::Line { text } => {
                self.clear_status();
                println!("{}", text);
            }
            SessionEvent::BatchStarted {
                label,
                total_frames,
                batch,
            } => {
                self.clear_status();
                let name = label.as_deref().unwrap_or("render");
                eprintln!(
                    "Batch {}: {} ({} frame{})",
                    batch,
                    name,
                    total_frames,
                    if *total_frames == 1 { "" } else { "s" }
                );
            }
            SessionEvent::Progress(snapshot) => {
                eprint!("\r{:<width$}", format_status(snapshot), width = CLEAR_WIDTH);
                let _ = io::stderr().flush();
                self.status_shown = true;
            }
            SessionEvent::ImageReady { path, .. } => {
                self.clear_status();
                eprintln!("Image ready: {}", path.display());
            }
            SessionEvent::Note { text } => {
                self.clear_status();
                eprintln!("{}", text);
            }
            SessionEvent::Finished(outcome) => {
                self.clear_status();
                eprintln!("{}", format_outcome(outcome));
            }
            SessionEvent::FrameStarted { .. } => {}
        }
        Ok(())
    }

    /// Tell the user a cancel is underway.
    pub fn cancelling(&mut self, state: SessionState) {
        if self.json {
            return;
        }
        self.clear_status();
        match state {
            SessionState::Cancelling => {
                eprintln!("Cancelling render... (press Ctrl+C again to kill)")
            }
            SessionState::Killed => eprintln!("Killing render..."),
            _ => {}
        }
    }

    fn clear_status(&mut self) {
        if self.status_shown {
            eprint!("\r{}\r", " ".repeat(CLEAR_WIDTH));
            let _ = io::stderr().flush();
            self.status_shown = false;
        }
    }
}

impl Default for ConsolePresenter {
    fn default() -> Self {
        Self::new()
    }
}

/// One-line progress summary, also used for notifications.
///
/// Unknown figures are left out rather than shown as zero.
pub fn format_status(snapshot: &ProgressSnapshot) -> String {
    let mut parts = Vec::with_capacity(4);

    if snapshot.total > 0 {
        parts.push(format!("{}/{} frames", snapshot.completed, snapshot.total));
    } else {
        parts.push(format!(
            "{} frame{}",
            snapshot.completed,
            if snapshot.completed == 1 { "" } else { "s" }
        ));
    }
    if let Some(avg) = snapshot.average {
        parts.push(format!("avg {:.1}s", avg));
    }
    if let Some(remaining) = snapshot.remaining {
        parts.push(format!("remaining {}", format_duration(remaining)));
    }
    if let Some(eta) = snapshot.eta {
        parts.push(format!("ETA {}", eta.format("%H:%M:%S")));
    }

    parts.join(" | ")
}

/// Final summary line for a finished session.
pub fn format_outcome(outcome: &SessionOutcome) -> String {
    let frames = match &outcome.last_snapshot {
        Some(s) if s.total > 0 => format!(
            " ({}/{} frames in {})",
            s.completed,
            s.total,
            format_duration(s.elapsed)
        ),
        Some(s) => format!(" ({} frames in {})", s.completed, format_duration(s.elapsed)),
        None => String::new(),
    };

    match outcome.state {
        SessionState::Completed => format!("Render completed{}", frames),
        SessionState::Killed => format!("Render cancelled{}", frames),
        SessionState::Failed if outcome.monitoring_lost => {
            format!("Lost the render log; render state unknown{}", frames)
        }
        SessionState::Failed => match outcome.exit_code {
            Some(code) => format!("Render failed with exit code {}{}", code, frames),
            None => format!("Render failed{}", frames),
        },
        other => format!("Render {}{}", other, frames),
    }
}

/// Format a duration in seconds as human-readable string.
///
/// Examples:
/// - 65.5 -> "1m 6s"
/// - 3661.0 -> "1h 1m 1s"
/// - 30.0 -> "30s"
pub fn format_duration(seconds: f64) -> String {
    let total_secs = if seconds.is_finite() && seconds > 0.0 {
        seconds.round() as u64
    } else {
        0
    };
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}
