//! Test helper utilities

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use std::time::{Duration, Instant};

use ropwatch::render::{RenderCommand, RenderJob, SessionEvent, SessionOptions, SessionOutcome};
use ropwatch::config::LogConfig;

/// Upper bound for any single test render
pub const TEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Session options with a short poll interval and the given grace period
pub fn options(grace: Duration) -> SessionOptions {
    SessionOptions {
        poll_interval: Duration::from_millis(20),
        grace_period: grace,
        event_buffer: 256,
        log: LogConfig::default(),
    }
}

/// Job that runs `script` through `sh -c`
pub fn sh_job(script: &str) -> RenderJob {
    RenderJob::new(RenderCommand::new("sh", ["-c", script]))
}

/// Drain events until `Finished` arrives
pub fn collect_events(rx: &Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let deadline = Instant::now() + TEST_TIMEOUT;
    let mut events = Vec::new();
    while Instant::now() < deadline {
        match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(event) => {
                let done = matches!(event, SessionEvent::Finished(_));
                events.push(event);
                if done {
                    return events;
                }
            }
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => continue,
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
    panic!("render did not finish in time; events so far: {:?}", events);
}

/// Wait for a raw log line equal to `text`, returning everything seen
pub fn wait_for_line(rx: &Receiver<SessionEvent>, text: &str) -> Vec<SessionEvent> {
    let deadline = Instant::now() + TEST_TIMEOUT;
    let mut events = Vec::new();
    while Instant::now() < deadline {
        if let Ok(event) = rx.recv_timeout(Duration::from_millis(100)) {
            let hit = matches!(&event, SessionEvent::Line { text: t } if t == text);
            events.push(event);
            if hit {
                return events;
            }
        }
    }
    panic!("line {:?} never arrived; events so far: {:?}", text, events);
}

pub fn outcome(events: &[SessionEvent]) -> &SessionOutcome {
    match events.last() {
        Some(SessionEvent::Finished(outcome)) => outcome,
        other => panic!("last event is not Finished: {:?}", other),
    }
}

pub fn completed_counts(events: &[SessionEvent]) -> Vec<u64> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::Progress(s) => Some(s.completed),
            _ => None,
        })
        .collect()
}

pub fn lines(events: &[SessionEvent]) -> Vec<&str> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::Line { text } => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

/// Write an executable-free driver script and a config pointing `sh` at it.
///
/// Returns the fake home directory to use as `$HOME`.
pub fn setup_fake_render(home: &Path, script_body: &str) -> PathBuf {
    let config_dir = home.join(".config").join("ropwatch");
    fs::create_dir_all(&config_dir).expect("Failed to create config dir");

    let script = config_dir.join("render_driver.sh");
    fs::write(&script, script_body).expect("Failed to write driver script");

    let config = format!(
        "[render]\nexecutable = \"sh\"\ndriver_script = \"{}\"\n\n[monitor]\npoll_interval_ms = 20\ngrace_period_secs = 1\n",
        script.display()
    );
    fs::write(config_dir.join("config.toml"), config).expect("Failed to write config");
    script
}
