//! Frame-time history and the progress figures derived from it.

use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use serde::Serialize;

/// Derived progress figures for one batch.
///
/// Time values are seconds. Figures that cannot be computed yet (no frame
/// timings, unknown frame count) are `None` rather than zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub completed: u64,
    /// 0 while the frame count is unknown
    pub total: u64,
    /// Frames counted through the skip path (no timing sample)
    pub skipped: u64,
    pub average: Option<f64>,
    pub recent_average: Option<f64>,
    pub elapsed: f64,
    pub estimated_total: Option<f64>,
    pub remaining: Option<f64>,
    pub eta: Option<DateTime<Local>>,
}

impl ProgressSnapshot {
    /// Whether every known frame has been accounted for.
    pub fn is_done(&self) -> bool {
        self.total > 0 && self.completed >= self.total
    }

    /// Completion in percent, if the frame count is known.
    pub fn percent(&self) -> Option<f64> {
        if self.total == 0 {
            return None;
        }
        Some(self.completed.min(self.total) as f64 / self.total as f64 * 100.0)
    }
}

/// Rolling history of per-frame render times.
#[derive(Debug, Clone)]
pub struct ProgressEstimator {
    durations: Vec<f64>,
    skipped: u64,
    started: Instant,
}

impl Default for ProgressEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressEstimator {
    pub fn new() -> Self {
        Self {
            durations: Vec::new(),
            skipped: 0,
            started: Instant::now(),
        }
    }

    /// Forget all samples and restart the wall clock for a new batch.
    pub fn reset(&mut self) {
        self.durations.clear();
        self.skipped = 0;
        self.started = Instant::now();
    }

    /// Record a finished frame's render time.
    ///
    /// Negative or non-finite values are rejected and `false` is returned.
    pub fn record_duration(&mut self, seconds: f64) -> bool {
        if !seconds.is_finite() || seconds < 0.0 {
            tracing::debug!(seconds, "rejected frame duration");
            return false;
        }
        self.durations.push(seconds);
        true
    }

    /// Record a frame that completed without a timing sample.
    pub fn record_skip(&mut self) {
        self.skipped += 1;
    }

    pub fn durations(&self) -> &[f64] {
        &self.durations
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Arithmetic mean of the recorded durations.
    pub fn average(&self) -> Option<f64> {
        if self.durations.is_empty() {
            return None;
        }
        Some(self.durations.iter().sum::<f64>() / self.durations.len() as f64)
    }

    /// Two-point linear extrapolation `2 * last - second_to_last`.
    ///
    /// Falls back to [`average`](Self::average) with fewer than two samples.
    /// Clamped at zero: a sharp speed-up would otherwise extrapolate to a
    /// negative frame time.
    pub fn recent_average(&self) -> Option<f64> {
        match self.durations.as_slice() {
            [.., prev, last] => Some((2.0 * last - prev).max(0.0)),
            _ => self.average(),
        }
    }

    /// Snapshot using the current local time.
    pub fn snapshot(&self, total: u64, completed: u64) -> ProgressSnapshot {
        self.snapshot_at(total, completed, Local::now(), self.started.elapsed())
    }

    /// Snapshot at an explicit point in time.
    ///
    /// `wall_elapsed` is used as the elapsed time when no durations have been
    /// recorded yet. Does not touch the history.
    pub fn snapshot_at(
        &self,
        total: u64,
        completed: u64,
        now: DateTime<Local>,
        wall_elapsed: Duration,
    ) -> ProgressSnapshot {
        let average = self.average();
        let recent_average = self.recent_average();
        let elapsed = if self.durations.is_empty() {
            wall_elapsed.as_secs_f64()
        } else {
            self.durations.iter().sum()
        };

        let estimated_total = match (total, average) {
            (0, _) | (_, None) => None,
            (_, Some(avg)) => Some(total as f64 * avg),
        };

        let (estimated_total, remaining, eta) = if total > 0 && completed >= total {
            (estimated_total.or(Some(elapsed)), Some(0.0), Some(now))
        } else {
            let remaining = estimated_total.map(|est| (est - elapsed).max(0.0));
            let eta = remaining.map(|secs| now + chrono_seconds(secs));
            (estimated_total, remaining, eta)
        };

        ProgressSnapshot {
            completed,
            total,
            skipped: self.skipped,
            average,
            recent_average,
            elapsed,
            estimated_total,
            remaining,
            eta,
        }
    }
}

fn chrono_seconds(secs: f64) -> chrono::Duration {
    chrono::Duration::milliseconds((secs * 1000.0).round() as i64)
}
