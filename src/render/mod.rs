//! Render monitoring engine.
//!
//! Data flows one way:
//!
//! ```text
//! render process -> LineStream -> LogClassifier -> ProgressEstimator -> SessionEvent
//! ```
//!
//! - [`line_stream`] merges stdout/stderr into decoded lines with a poll timeout
//! - [`classifier`] maps each line to a [`LogEvent`]
//! - [`estimator`] keeps frame timings and derives [`ProgressSnapshot`]s
//! - [`job`] builds the render command line and holds per-run counters
//! - [`session`] owns the process, the worker thread and cancellation

pub mod classifier;
pub mod error;
pub mod estimator;
pub mod job;
pub mod line_stream;
pub mod session;

pub use classifier::{LogClassifier, LogEvent, ParseAnomaly};
pub use error::{SessionError, SessionResult};
pub use estimator::{ProgressEstimator, ProgressSnapshot};
pub use job::{RenderCommand, RenderJob, RenderRequest};
pub use line_stream::{LinePoll, LineStream};
pub use session::{RenderSession, SessionEvent, SessionOptions, SessionOutcome, SessionState};
