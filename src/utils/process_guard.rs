//! Turns terminal signals into cancel requests for a running render.
//!
//! Detects:
//! - SIGINT (Ctrl+C) via ctrlc handler, counted per press
//! - SIGHUP (terminal hangup) via signal_hook
//! - Parent process death (terminal force-closed, reparented to init/subreaper)
//!
//! The first Ctrl+C asks for a graceful stop, the second forces it. A hangup
//! or a dead parent forces immediately since nobody is left to watch.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// How hard the user has asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CancelLevel {
    None,
    Graceful,
    Forced,
}

impl CancelLevel {
    /// Number of `request_cancel` calls this level corresponds to.
    pub fn requests(self) -> usize {
        match self {
            CancelLevel::None => 0,
            CancelLevel::Graceful => 1,
            CancelLevel::Forced => 2,
        }
    }
}

/// Watches for interrupts while a render runs in the foreground.
pub struct InterruptGuard {
    presses: Arc<AtomicUsize>,
    hangup: Arc<AtomicBool>,
    #[cfg(unix)]
    initial_ppid: u32,
}

impl Default for InterruptGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl InterruptGuard {
    /// Snapshot the current parent PID for later orphan detection.
    pub fn new() -> Self {
        Self {
            presses: Arc::new(AtomicUsize::new(0)),
            hangup: Arc::new(AtomicBool::new(false)),
            #[cfg(unix)]
            initial_ppid: unsafe { libc::getppid() as u32 },
        }
    }

    /// Register SIGINT (Ctrl+C) and SIGHUP (terminal hangup) handlers.
    ///
    /// Safe to call more than once; duplicate registrations are ignored.
    pub fn register_signal_handlers(&self) {
        let presses = self.presses.clone();
        ctrlc::set_handler(move || {
            presses.fetch_add(1, Ordering::SeqCst);
        })
        .ok(); // Ignore if handler already set

        #[cfg(unix)]
        {
            use signal_hook::flag::register;
            let _ = register(libc::SIGHUP, self.hangup.clone());
        }
    }

    /// Record an interrupt as if Ctrl+C had been pressed.
    pub fn press(&self) {
        self.presses.fetch_add(1, Ordering::SeqCst);
    }

    /// Current cancel level from presses, hangup and orphan state.
    pub fn level(&self) -> CancelLevel {
        if self.hangup.load(Ordering::SeqCst) || self.is_orphaned() {
            return CancelLevel::Forced;
        }
        match self.presses.load(Ordering::SeqCst) {
            0 => CancelLevel::None,
            1 => CancelLevel::Graceful,
            _ => CancelLevel::Forced,
        }
    }

    /// Detect parent death by comparing current ppid against the initial snapshot.
    ///
    /// Works on both macOS (reparented to launchd/PID 1) and Linux (reparented to
    /// a systemd subreaper or PID 1). Any ppid change means the parent died.
    #[cfg(unix)]
    fn is_orphaned(&self) -> bool {
        let current_ppid = unsafe { libc::getppid() as u32 };
        current_ppid != self.initial_ppid
    }

    #[cfg(not(unix))]
    fn is_orphaned(&self) -> bool {
        false
    }
}
