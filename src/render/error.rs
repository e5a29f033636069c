//! Errors surfaced by a render session.

use std::io;

use thiserror::Error;

use super::session::SessionState;

/// Result alias for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Structural failures of a render session.
///
/// Log-line parse misses are not errors at this level; see
/// [`ParseAnomaly`](super::classifier::ParseAnomaly).
#[derive(Debug, Error)]
pub enum SessionError {
    /// The render process could not be started.
    #[error("Failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// `start` was called while a render is still in flight.
    #[error("A render is already in progress (state: {0})")]
    AlreadyRunning(SessionState),

    /// Reading the process output failed; monitoring stopped.
    #[error("Lost the render log stream: {0}")]
    Stream(#[source] io::Error),

    /// Signalling the process group failed.
    #[error("Failed to signal process group {pgid}: {source}")]
    Signal {
        pgid: i32,
        #[source]
        source: io::Error,
    },
}

impl SessionError {
    /// Whether a signal failure means the target is already gone.
    #[cfg(unix)]
    pub fn is_process_gone(&self) -> bool {
        match self {
            SessionError::Signal { source, .. } => source.raw_os_error() == Some(libc::ESRCH),
            _ => false,
        }
    }

    #[cfg(not(unix))]
    pub fn is_process_gone(&self) -> bool {
        false
    }
}
