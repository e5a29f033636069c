//! Signalling a whole process group.
//!
//! Render processes are spawned as the leader of a fresh process group so that
//! the renderer and everything it forks can be stopped together.

use std::io;

use crate::render::error::{SessionError, SessionResult};

/// Signals sent to a render's process group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// SIGTERM: ask the renderer to stop at its next checkpoint.
    Terminate,
    /// SIGKILL: stop immediately.
    Kill,
}

impl Signal {
    #[cfg(unix)]
    fn raw(self) -> libc::c_int {
        match self {
            Signal::Terminate => libc::SIGTERM,
            Signal::Kill => libc::SIGKILL,
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Signal::Terminate => write!(f, "SIGTERM"),
            Signal::Kill => write!(f, "SIGKILL"),
        }
    }
}

/// Handle to the process group led by a spawned child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessGroup {
    pgid: i32,
}

impl ProcessGroup {
    /// Group of a child spawned with `process_group(0)`: its pgid is its pid.
    pub fn led_by(pid: u32) -> Self {
        Self { pgid: pid as i32 }
    }

    pub fn id(&self) -> i32 {
        self.pgid
    }

    /// Send `signal` to every process in the group.
    #[cfg(unix)]
    pub fn signal(&self, signal: Signal) -> SessionResult<()> {
        // A pgid <= 1 would address our own group or every process.
        if self.pgid <= 1 {
            return Err(SessionError::Signal {
                pgid: self.pgid,
                source: io::Error::from(io::ErrorKind::InvalidInput),
            });
        }

        tracing::debug!(pgid = self.pgid, %signal, "signalling process group");
        let rc = unsafe { libc::killpg(self.pgid, signal.raw()) };
        if rc == -1 {
            return Err(SessionError::Signal {
                pgid: self.pgid,
                source: io::Error::last_os_error(),
            });
        }
        Ok(())
    }

    #[cfg(not(unix))]
    pub fn signal(&self, _signal: Signal) -> SessionResult<()> {
        Err(SessionError::Signal {
            pgid: self.pgid,
            source: io::Error::from(io::ErrorKind::Unsupported),
        })
    }
}
