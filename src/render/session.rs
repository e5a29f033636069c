//! Render process lifecycle: spawn, monitor, cancel.
//!
//! A [`RenderSession`] launches the render command in its own process group
//! and hands the process to a dedicated worker thread. The worker is the only
//! writer of the [`RenderJob`] counters: it reads the merged log, classifies
//! each line, updates the [`ProgressEstimator`] and pushes [`SessionEvent`]s
//! into a bounded channel that the caller drains on its own schedule.
//!
//! # States
//!
//! ```text
//! Idle -> Running -> Completed | Failed
//!           |
//!           +-> Cancelling -> Killed
//! ```
//!
//! The first [`request_cancel`](RenderSession::request_cancel) sends SIGTERM
//! to the group. If the process is still alive after the grace period the
//! worker escalates to SIGKILL; a second request escalates immediately.
//!
//! # Event delivery
//!
//! The worker never blocks on a slow consumer while the render runs. When the
//! channel is full, `Line` events are dropped and queued `Progress` events
//! collapse into the newest one; everything else waits in a backlog. Only the
//! final flush after the process has exited blocks, so `Finished` is always
//! delivered unless the receiver was dropped.

use std::collections::VecDeque;
use std::io::Read;
use std::process::{Child, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use super::classifier::{LogClassifier, LogEvent};
use super::error::{SessionError, SessionResult};
use super::estimator::{ProgressEstimator, ProgressSnapshot};
use super::job::RenderJob;
use super::line_stream::{LinePoll, LineStream};
use crate::config::{Config, LogConfig};
use crate::utils::process_group::{ProcessGroup, Signal};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Running,
    Cancelling,
    Killed,
    Completed,
    Failed,
}

impl SessionState {
    /// `Completed`, `Failed` and `Killed` are final.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Failed | SessionState::Killed
        )
    }

    /// Whether a render process is (still) attached.
    pub fn is_active(self) -> bool {
        matches!(self, SessionState::Running | SessionState::Cancelling)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Running => "running",
            SessionState::Cancelling => "cancelling",
            SessionState::Killed => "killed",
            SessionState::Completed => "completed",
            SessionState::Failed => "failed",
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            SessionState::Idle => 0,
            SessionState::Running => 1,
            SessionState::Cancelling => 2,
            SessionState::Killed => 3,
            SessionState::Completed => 4,
            SessionState::Failed => 5,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => SessionState::Running,
            2 => SessionState::Cancelling,
            3 => SessionState::Killed,
            4 => SessionState::Completed,
            5 => SessionState::Failed,
            _ => SessionState::Idle,
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the render ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionOutcome {
    pub state: SessionState,
    /// `None` when killed by a signal or when monitoring was lost
    pub exit_code: Option<i32>,
    /// The log stream failed; the process may still be running
    pub monitoring_lost: bool,
    pub last_snapshot: Option<ProgressSnapshot>,
    pub last_output: Option<std::path::PathBuf>,
}

/// Everything the worker reports, in log order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Every log line, verbatim, classified or not.
    Line { text: String },
    BatchStarted {
        label: Option<String>,
        total_frames: u64,
        batch: usize,
    },
    FrameStarted { frame: i64 },
    Progress(ProgressSnapshot),
    ImageReady {
        path: std::path::PathBuf,
        frame: Option<i64>,
    },
    Note { text: String },
    Finished(SessionOutcome),
}

/// Tunables for a session, usually taken from [`Config`].
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Upper bound on how long the worker blocks waiting for a line
    pub poll_interval: Duration,
    /// Time between SIGTERM and SIGKILL
    pub grace_period: Duration,
    /// Capacity of the event channel
    pub event_buffer: usize,
    pub log: LogConfig,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl SessionOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.monitor.poll_interval_ms),
            grace_period: Duration::from_secs(config.monitor.grace_period_secs),
            event_buffer: config.monitor.event_buffer,
            log: config.log.clone(),
        }
    }
}

/// How long lines are still collected after the render process exits while a
/// descendant keeps its output pipes open
const EXIT_DRAIN: Duration = Duration::from_millis(300);

const CANCEL_NONE: u8 = 0;
const CANCEL_GRACEFUL: u8 = 1;
const CANCEL_FORCED: u8 = 2;

/// State shared between the session handle and its worker.
#[derive(Debug)]
struct Shared {
    state: AtomicU8,
    cancel: AtomicU8,
    signal_delivered: AtomicBool,
}

impl Shared {
    fn new(state: SessionState) -> Self {
        Self {
            state: AtomicU8::new(state.to_u8()),
            cancel: AtomicU8::new(CANCEL_NONE),
            signal_delivered: AtomicBool::new(false),
        }
    }

    fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: SessionState) {
        self.state.store(state.to_u8(), Ordering::SeqCst);
    }

    /// Move `from -> to` unless someone else moved first.
    fn transition(&self, from: SessionState, to: SessionState) -> bool {
        self.state
            .compare_exchange(from.to_u8(), to.to_u8(), Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn cancel(&self) -> u8 {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Deliver `signal` to `group`, recording whether it reached anything.
    fn send(&self, group: ProcessGroup, signal: Signal) -> bool {
        match group.signal(signal) {
            Ok(()) => {
                self.signal_delivered.store(true, Ordering::SeqCst);
                true
            }
            Err(e) if e.is_process_gone() => {
                debug!(pgid = group.id(), %signal, "process group already gone");
                false
            }
            Err(e) => {
                warn!("{}", e);
                false
            }
        }
    }

    /// SIGKILL the group and move `Cancelling -> Killed`.
    ///
    /// The state only changes when the signal reached the group; if it was
    /// already gone the exit status decides the final state.
    fn force(&self, group: ProcessGroup) -> bool {
        self.cancel.store(CANCEL_FORCED, Ordering::SeqCst);
        self.send(group, Signal::Kill)
            && self.transition(SessionState::Cancelling, SessionState::Killed)
    }
}

/// Owner of one render process at a time.
pub struct RenderSession {
    options: SessionOptions,
    shared: Arc<Shared>,
    group: Option<ProcessGroup>,
    worker: Option<JoinHandle<SessionOutcome>>,
}

impl Default for RenderSession {
    fn default() -> Self {
        Self::new(SessionOptions::default())
    }
}

impl RenderSession {
    pub fn new(options: SessionOptions) -> Self {
        Self {
            options,
            shared: Arc::new(Shared::new(SessionState::Idle)),
            group: None,
            worker: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Process group id of the current render, if one was started.
    pub fn process_group(&self) -> Option<i32> {
        self.group.map(|g| g.id())
    }

    /// Spawn `job.command` and start monitoring it.
    ///
    /// Valid from `Idle` or a terminal state. On spawn failure the session is
    /// left `Idle` and the error is returned; no events are produced.
    pub fn start(&mut self, job: RenderJob) -> SessionResult<Receiver<SessionEvent>> {
        let current = self.state();
        if current.is_active() {
            return Err(SessionError::AlreadyRunning(current));
        }
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }

        let mut cmd = job.command.to_command();
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        debug!(command = %job.command.display(), "spawning render");
        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(source) => {
                self.shared = Arc::new(Shared::new(SessionState::Idle));
                self.group = None;
                return Err(SessionError::Spawn {
                    program: job.command.program_name(),
                    source,
                });
            }
        };

        info!(pid = child.id(), "render started");
        Ok(self.monitor(child, job))
    }

    /// Attach a worker to an already spawned render.
    fn monitor(&mut self, mut child: Child, job: RenderJob) -> Receiver<SessionEvent> {
        let mut sources: Vec<Box<dyn Read + Send>> = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            sources.push(Box::new(stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            sources.push(Box::new(stderr));
        }
        let stream = LineStream::spawn(sources);
        self.monitor_stream(child, stream, job)
    }

    /// Attach a worker that reads `stream` instead of the child's own pipes.
    pub(crate) fn monitor_stream(
        &mut self,
        child: Child,
        stream: LineStream,
        job: RenderJob,
    ) -> Receiver<SessionEvent> {
        let group = ProcessGroup::led_by(child.id());
        let (tx, rx) = mpsc::sync_channel(self.options.event_buffer.max(1));
        let shared = Arc::new(Shared::new(SessionState::Running));

        let worker = Worker {
            classifier: LogClassifier::new(&self.options.log),
            estimator: ProgressEstimator::new(),
            options: self.options.clone(),
            shared: Arc::clone(&shared),
            frame_started_at: None,
            cancel_seen_at: None,
            forced: false,
            last_snapshot: None,
            child,
            stream,
            group,
            job,
            outbox: Outbox::new(tx),
        };

        self.shared = shared;
        self.group = Some(group);
        self.worker = Some(thread::spawn(move || worker.run()));

        rx
    }

    /// Ask the render to stop. Never blocks.
    ///
    /// From `Running`: SIGTERM to the group, state becomes `Cancelling`.
    /// From `Cancelling`: SIGKILL to the group, state becomes `Killed` once the
    /// signal was delivered. Otherwise nothing happens. Returns the state
    /// after the request.
    pub fn request_cancel(&self) -> SessionState {
        let Some(group) = self.group else {
            return self.state();
        };

        match self.state() {
            SessionState::Running => {
                if self
                    .shared
                    .transition(SessionState::Running, SessionState::Cancelling)
                {
                    info!(pgid = group.id(), "cancel requested");
                    self.shared.cancel.store(CANCEL_GRACEFUL, Ordering::SeqCst);
                    self.shared.send(group, Signal::Terminate);
                }
            }
            SessionState::Cancelling => {
                info!(pgid = group.id(), "second cancel request, killing");
                self.shared.force(group);
            }
            _ => {}
        }

        self.state()
    }

    /// Block until the worker has finished and return its outcome.
    ///
    /// `None` if nothing was started or the worker panicked.
    pub fn wait(&mut self) -> Option<SessionOutcome> {
        let handle = self.worker.take()?;
        handle.join().ok()
    }
}

impl Drop for RenderSession {
    fn drop(&mut self) {
        // A render must not outlive the session that monitors it.
        if self.state().is_active() {
            if let Some(group) = self.group {
                self.shared.cancel.store(CANCEL_FORCED, Ordering::SeqCst);
                self.shared.send(group, Signal::Kill);
            }
        }
    }
}

/// Per-render state living on the worker thread.
struct Worker {
    child: Child,
    stream: LineStream,
    classifier: LogClassifier,
    estimator: ProgressEstimator,
    job: RenderJob,
    group: ProcessGroup,
    options: SessionOptions,
    shared: Arc<Shared>,
    outbox: Outbox,
    frame_started_at: Option<Instant>,
    cancel_seen_at: Option<Instant>,
    forced: bool,
    last_snapshot: Option<ProgressSnapshot>,
}

impl Worker {
    fn run(mut self) -> SessionOutcome {
        if self.job.total_frames > 0 {
            debug!(total = self.job.total_frames, "frame count seeded from request");
            self.emit_progress();
        }

        let mut exited: Option<ExitStatus> = None;
        let mut drain_until: Option<Instant> = None;

        loop {
            self.enforce_cancel();
            self.outbox.flush();
            match self.stream.poll(self.options.poll_interval) {
                LinePoll::Line(line) => self.handle_line(line),
                LinePoll::Pending => {}
                LinePoll::Ended => break,
                LinePoll::Failed(e) => {
                    warn!("{}", SessionError::Stream(e));
                    return self.finish(SessionState::Failed, None, true);
                }
            }

            // A descendant may hold the pipes open after the render itself is gone.
            if exited.is_none() {
                if let Ok(Some(status)) = self.child.try_wait() {
                    exited = Some(status);
                    drain_until = Some(Instant::now() + EXIT_DRAIN);
                }
            }
            if drain_until.is_some_and(|deadline| Instant::now() >= deadline) {
                debug!("render exited while its output pipes are still open");
                break;
            }
        }

        let status = match exited {
            Some(status) => Some(status),
            None => self.wait_for_exit(),
        };
        let cancelled = self.shared.cancel() != CANCEL_NONE
            && self.shared.signal_delivered.load(Ordering::SeqCst);

        let state = match status {
            _ if cancelled => SessionState::Killed,
            Some(status) if status.success() => SessionState::Completed,
            _ => SessionState::Failed,
        };
        let exit_code = status.and_then(|s| s.code());
        self.finish(state, exit_code, false)
    }

    fn finish(
        mut self,
        state: SessionState,
        exit_code: Option<i32>,
        monitoring_lost: bool,
    ) -> SessionOutcome {
        if self.last_snapshot.is_none() {
            self.last_snapshot = Some(self.snapshot());
        }
        self.shared.set_state(state);
        info!(%state, ?exit_code, monitoring_lost, "render finished");

        let outcome = SessionOutcome {
            state,
            exit_code,
            monitoring_lost,
            last_snapshot: self.last_snapshot.take(),
            last_output: self.job.last_output.take(),
        };
        self.emit(SessionEvent::Finished(outcome.clone()));
        self.outbox.close();
        outcome
    }

    /// Poll the child until it exits, keeping the grace timer running.
    fn wait_for_exit(&mut self) -> Option<ExitStatus> {
        loop {
            self.enforce_cancel();
            self.outbox.flush();
            match self.child.try_wait() {
                Ok(Some(status)) => return Some(status),
                Ok(None) => thread::sleep(self.options.poll_interval),
                Err(e) => {
                    warn!("failed to wait for render process: {}", e);
                    return None;
                }
            }
        }
    }

    /// Escalate to SIGKILL when the grace period runs out or a forced
    /// cancel was requested.
    fn enforce_cancel(&mut self) {
        match self.shared.cancel() {
            CANCEL_GRACEFUL => {
                let seen = *self.cancel_seen_at.get_or_insert_with(Instant::now);
                if seen.elapsed() >= self.options.grace_period {
                    info!(
                        grace_secs = self.options.grace_period.as_secs_f64(),
                        "grace period elapsed, killing process group"
                    );
                    self.shared.cancel.store(CANCEL_FORCED, Ordering::SeqCst);
                    self.escalate();
                }
            }
            CANCEL_FORCED if !self.forced => self.escalate(),
            _ => {}
        }
    }

    /// SIGKILL, and `Killed` only if it reached the render.
    fn escalate(&mut self) {
        self.forced = true;
        let delivered = self.shared.send(self.group, Signal::Kill) || self.kill_child();
        if delivered {
            self.shared
                .transition(SessionState::Cancelling, SessionState::Killed);
        }
    }

    #[cfg(unix)]
    fn kill_child(&mut self) -> bool {
        false
    }

    // Covers platforms without process groups.
    #[cfg(not(unix))]
    fn kill_child(&mut self) -> bool {
        let killed = self.child.kill().is_ok();
        if killed {
            self.shared.signal_delivered.store(true, Ordering::SeqCst);
        }
        killed
    }

    fn handle_line(&mut self, line: String) {
        let classified = self.classifier.classify(&line);
        if let Err(anomaly) = &classified {
            debug!(%anomaly, line = %line, "unparsed render log line");
        }

        // Raw line first, then whatever it means.
        self.emit(SessionEvent::Line { text: line });
        if let Ok(event) = classified {
            self.apply(event);
        }
    }

    fn apply(&mut self, event: LogEvent) {
        match event {
            LogEvent::BatchStarted {
                label,
                total_frames,
            } => {
                self.job.start_batch(label.clone(), total_frames);
                self.estimator.reset();
                self.frame_started_at = None;
                info!(batch = self.job.batch, total_frames, label = ?label, "batch started");
                self.emit(SessionEvent::BatchStarted {
                    label,
                    total_frames,
                    batch: self.job.batch,
                });
                self.emit_progress();
            }
            LogEvent::FrameStarted { frame } => {
                self.job.frame_open = true;
                self.job.saw_frame_start = true;
                self.frame_started_at = Some(Instant::now());
                self.emit(SessionEvent::FrameStarted { frame });
            }
            LogEvent::FrameSkipped { file } => {
                debug!(file = ?file, "frame skipped");
                self.job.frame_open = false;
                self.frame_started_at = None;
                self.estimator.record_skip();
                self.job.complete_frame();
                self.emit_progress();
            }
            LogEvent::FrameFinished { seconds } => {
                // Extraction and render-time lines of one frame count once.
                if self.job.saw_frame_start && !self.job.frame_open {
                    debug!("extra finish line for an already finished frame");
                    return;
                }
                self.job.frame_open = false;
                let measured = self
                    .frame_started_at
                    .take()
                    .map(|t| t.elapsed().as_secs_f64());
                if let Some(secs) = seconds.or(measured) {
                    self.estimator.record_duration(secs);
                }
                self.job.complete_frame();
                self.emit_progress();
            }
            LogEvent::OutputReady { path, frame } => {
                self.job.last_output = Some(path.clone());
                self.emit(SessionEvent::ImageReady { path, frame });

                let reconciled = frame.and_then(|f| self.job.completed_for_frame(f));
                if let Some(count) = reconciled {
                    let before = self.job.frames_completed;
                    self.job.advance_to(count);
                    if self.job.frames_completed != before {
                        self.emit_progress();
                    }
                }
            }
            LogEvent::Note(text) => self.emit(SessionEvent::Note { text }),
            LogEvent::Unclassified => {}
        }
    }

    fn snapshot(&self) -> ProgressSnapshot {
        self.estimator
            .snapshot(self.job.total_frames, self.job.frames_completed)
    }

    fn emit_progress(&mut self) {
        let snapshot = self.snapshot();
        self.last_snapshot = Some(snapshot.clone());
        self.emit(SessionEvent::Progress(snapshot));
    }

    fn emit(&mut self, event: SessionEvent) {
        self.outbox.push(event);
    }
}

/// Non-blocking front of the event channel.
struct Outbox {
    tx: SyncSender<SessionEvent>,
    backlog: VecDeque<SessionEvent>,
    dropped_lines: u64,
    /// The receiver is gone
    closed: bool,
}

impl Outbox {
    fn new(tx: SyncSender<SessionEvent>) -> Self {
        Self {
            tx,
            backlog: VecDeque::new(),
            dropped_lines: 0,
            closed: false,
        }
    }

    fn push(&mut self, event: SessionEvent) {
        if self.closed {
            return;
        }
        self.flush();
        match event {
            SessionEvent::Line { .. } if !self.backlog.is_empty() => {
                self.dropped_lines += 1;
                return;
            }
            SessionEvent::Progress(_)
                if matches!(self.backlog.back(), Some(SessionEvent::Progress(_))) =>
            {
                self.backlog.pop_back();
            }
            _ => {}
        }
        self.backlog.push_back(event);
        self.flush();
    }

    /// Hand over as much of the backlog as the channel takes without blocking.
    fn flush(&mut self) {
        while let Some(event) = self.backlog.pop_front() {
            match self.tx.try_send(event) {
                Ok(()) => {}
                Err(TrySendError::Full(event)) => {
                    self.backlog.push_front(event);
                    return;
                }
                Err(TrySendError::Disconnected(_)) => {
                    self.closed = true;
                    self.backlog.clear();
                    return;
                }
            }
        }
        if self.dropped_lines > 0 {
            debug!(dropped = self.dropped_lines, "event consumer fell behind, log lines dropped");
            self.dropped_lines = 0;
        }
    }

    /// Deliver the rest of the backlog, waiting for the consumer.
    fn close(&mut self) {
        for event in self.backlog.drain(..) {
            if self.tx.send(event).is_err() {
                break;
            }
        }
        self.closed = true;
    }
}
