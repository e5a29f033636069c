//! ropwatch library
//!
//! Launches Houdini batch renders, follows their log output and turns it into
//! structured progress events.

pub mod cli;
pub mod config;
pub mod presenter;
pub mod render;
pub mod utils;

pub use config::Config;
pub use presenter::ConsolePresenter;
pub use render::{
    LogClassifier, LogEvent, ProgressEstimator, ProgressSnapshot, RenderCommand, RenderJob,
    RenderRequest, RenderSession, SessionEvent, SessionOptions, SessionOutcome, SessionState,
};
