//! Integration tests for RenderSession against real child processes

#![cfg(unix)]

use std::path::PathBuf;
use std::time::{Duration, Instant};

use ropwatch::render::{
    RenderCommand, RenderJob, RenderRequest, RenderSession, SessionError, SessionEvent,
    SessionState,
};

use crate::helpers::{
    collect_events, completed_counts, lines, options, outcome, sh_job, wait_for_line,
};

#[test]
fn frames_progress_monotonically_to_completion() {
    let mut session = RenderSession::new(options(Duration::from_secs(3)));
    let rx = session
        .start(sh_job(
            "echo \"ROP '/out/ROP1' render started for 3 frames\"
             for f in 1 2 3; do echo \"Rendering frame $f\"; echo \"Rendering time: 1.${f}s\"; done",
        ))
        .unwrap();

    let events = collect_events(&rx);
    let counts = completed_counts(&events);
    assert_eq!(counts.first(), Some(&0));
    assert_eq!(counts.last(), Some(&3));
    assert!(counts.windows(2).all(|w| w[0] <= w[1]), "{:?}", counts);

    assert!(events.iter().any(|e| matches!(
        e,
        SessionEvent::BatchStarted { total_frames: 3, batch: 1, label: Some(l) } if l == "/out/ROP1"
    )));

    let outcome = outcome(&events);
    assert_eq!(outcome.state, SessionState::Completed);
    assert_eq!(outcome.exit_code, Some(0));
    let last = outcome.last_snapshot.as_ref().unwrap();
    assert_eq!(last.completed, 3);
    assert_eq!(last.remaining, Some(0.0));

    assert_eq!(session.state(), SessionState::Completed);
    assert_eq!(session.wait().map(|o| o.state), Some(SessionState::Completed));
}

#[test]
fn raw_line_precedes_its_structured_event() {
    let mut session = RenderSession::new(options(Duration::from_secs(3)));
    let rx = session
        .start(sh_job("echo 'Rendering frame 7'"))
        .unwrap();
    let events = collect_events(&rx);

    let line_at = events
        .iter()
        .position(|e| matches!(e, SessionEvent::Line { text } if text == "Rendering frame 7"))
        .unwrap();
    let frame_at = events
        .iter()
        .position(|e| matches!(e, SessionEvent::FrameStarted { frame: 7 }))
        .unwrap();
    assert!(line_at < frame_at);
}

#[test]
fn unclassified_lines_are_relayed_verbatim() {
    let mut session = RenderSession::new(options(Duration::from_secs(3)));
    let rx = session
        .start(sh_job("echo 'Loading scene...'; printf 'no newline at end'"))
        .unwrap();
    let events = collect_events(&rx);
    assert_eq!(lines(&events), vec!["Loading scene...", "no newline at end"]);
}

#[test]
fn stderr_lines_are_merged() {
    let mut session = RenderSession::new(options(Duration::from_secs(3)));
    let rx = session
        .start(sh_job(
            "{ echo \"ROP '/out/a' render started for 1 frames\"; echo 'Rendering time: 2s'; } >&2",
        ))
        .unwrap();
    let events = collect_events(&rx);
    let last = outcome(&events).last_snapshot.clone().unwrap();
    assert_eq!(last.completed, 1);
    assert_eq!(last.average, Some(2.0));
}

#[test]
fn skipped_frames_count_without_timing() {
    let mut session = RenderSession::new(options(Duration::from_secs(3)));
    let rx = session
        .start(sh_job(
            "echo \"ROP '/out/a' render started for 2 frames\"
             echo 'Rendering frame 1 skipped. File already rendered: a.1.exr'
             echo 'Rendering frame 2'
             echo 'Rendering time: 2s'",
        ))
        .unwrap();
    let events = collect_events(&rx);
    let last = outcome(&events).last_snapshot.clone().unwrap();
    assert_eq!(last.completed, 2);
    assert_eq!(last.skipped, 1);
    assert_eq!(last.average, Some(2.0));
}

#[test]
fn extraction_and_render_time_of_one_frame_count_once() {
    let mut session = RenderSession::new(options(Duration::from_secs(3)));
    let rx = session
        .start(sh_job(
            "echo \"ROP '/out/a' render started for 4 frames\"
             echo 'Rendering frame 1'
             echo 'Scene extraction time: 0.5s'
             echo 'Rendering time: 3s'",
        ))
        .unwrap();
    let events = collect_events(&rx);
    let last = outcome(&events).last_snapshot.clone().unwrap();
    assert_eq!(last.completed, 1);
}

#[test]
fn merge_batches_reset_progress() {
    let mut session = RenderSession::new(options(Duration::from_secs(3)));
    let rx = session
        .start(sh_job(
            "echo \"ROP '/out/a' render started for 1 frames\"
             echo 'Rendering time: 1s'
             echo \"ROP '/out/b' render started for 2 frames\"
             echo 'Rendering time: 5s'",
        ))
        .unwrap();
    let events = collect_events(&rx);

    let batches: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::BatchStarted { batch, .. } => Some(*batch),
            _ => None,
        })
        .collect();
    assert_eq!(batches, vec![1, 2]);
    assert_eq!(completed_counts(&events), vec![0, 1, 0, 1]);

    let last = outcome(&events).last_snapshot.clone().unwrap();
    assert_eq!(last.total, 2);
    assert_eq!(last.average, Some(5.0));
}

#[test]
fn output_marker_reports_image_and_reconciles_count() {
    let request = RenderRequest {
        hip_file: PathBuf::from("/jobs/a.hip"),
        out_node: "/out/a".to_string(),
        start_frame: 10,
        end_frame: 13,
        use_range: true,
        merge: false,
        skip_rendered: false,
    };
    let job = RenderJob::new(RenderCommand::new(
        "sh",
        ["-c", "echo 'ROPWATCH_OUTPUT: /renders/a.0011.exr'"],
    ))
    .with_request(&request);

    let mut session = RenderSession::new(options(Duration::from_secs(3)));
    let rx = session.start(job).unwrap();
    let events = collect_events(&rx);

    assert!(events.iter().any(|e| matches!(
        e,
        SessionEvent::ImageReady { path, frame: Some(11) } if path == &PathBuf::from("/renders/a.0011.exr")
    )));
    assert_eq!(completed_counts(&events), vec![0, 2]);
    assert_eq!(
        outcome(&events).last_output,
        Some(PathBuf::from("/renders/a.0011.exr"))
    );
}

#[test]
fn non_zero_exit_is_failed() {
    let mut session = RenderSession::new(options(Duration::from_secs(3)));
    let rx = session.start(sh_job("echo oops; exit 3")).unwrap();
    let events = collect_events(&rx);
    let outcome = outcome(&events);
    assert_eq!(outcome.state, SessionState::Failed);
    assert_eq!(outcome.exit_code, Some(3));
    assert!(!outcome.monitoring_lost);
}

#[test]
fn spawn_failure_leaves_session_idle() {
    let mut session = RenderSession::new(options(Duration::from_secs(3)));
    let job = RenderJob::new(RenderCommand::new(
        "/nonexistent/ropwatch-test-binary",
        Vec::<String>::new(),
    ));
    let err = session.start(job).unwrap_err();
    assert!(matches!(err, SessionError::Spawn { .. }));
    assert!(err.to_string().contains("ropwatch-test-binary"));
    assert_eq!(session.state(), SessionState::Idle);
    assert!(session.wait().is_none());
}

#[test]
fn second_start_while_running_is_rejected() {
    let mut session = RenderSession::new(options(Duration::from_secs(3)));
    let rx = session.start(sh_job("echo up; sleep 30")).unwrap();
    wait_for_line(&rx, "up");

    let err = session.start(sh_job("true")).unwrap_err();
    assert!(matches!(err, SessionError::AlreadyRunning(SessionState::Running)));

    session.request_cancel();
    collect_events(&rx);
}

#[test]
fn session_can_be_reused_after_finishing() {
    let mut session = RenderSession::new(options(Duration::from_secs(3)));
    let rx = session.start(sh_job("exit 1")).unwrap();
    assert_eq!(outcome(&collect_events(&rx)).state, SessionState::Failed);

    let rx = session.start(sh_job("true")).unwrap();
    assert_eq!(outcome(&collect_events(&rx)).state, SessionState::Completed);
}

#[test]
fn cancel_terminates_cooperative_render() {
    let mut session = RenderSession::new(options(Duration::from_secs(10)));
    let rx = session.start(sh_job("echo ready; sleep 30")).unwrap();
    wait_for_line(&rx, "ready");

    assert_eq!(session.request_cancel(), SessionState::Cancelling);
    let started = Instant::now();
    let events = collect_events(&rx);

    assert_eq!(outcome(&events).state, SessionState::Killed);
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(session.state(), SessionState::Killed);
}

#[test]
fn grace_period_escalates_to_kill() {
    let mut session = RenderSession::new(options(Duration::from_millis(500)));
    let rx = session
        .start(sh_job("trap '' TERM; echo ready; sleep 30"))
        .unwrap();
    wait_for_line(&rx, "ready");

    let started = Instant::now();
    session.request_cancel();
    let events = collect_events(&rx);

    assert_eq!(outcome(&events).state, SessionState::Killed);
    let took = started.elapsed();
    assert!(took >= Duration::from_millis(500), "{:?}", took);
    assert!(took < Duration::from_secs(10), "{:?}", took);
}

#[test]
fn second_cancel_kills_without_waiting_for_grace() {
    let mut session = RenderSession::new(options(Duration::from_secs(30)));
    let rx = session
        .start(sh_job("trap '' TERM; echo ready; sleep 30"))
        .unwrap();
    wait_for_line(&rx, "ready");

    let started = Instant::now();
    assert_eq!(session.request_cancel(), SessionState::Cancelling);
    assert_eq!(session.request_cancel(), SessionState::Killed);
    let events = collect_events(&rx);

    assert_eq!(outcome(&events).state, SessionState::Killed);
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[test]
fn cancel_after_finish_is_a_no_op() {
    let mut session = RenderSession::new(options(Duration::from_secs(3)));
    let rx = session.start(sh_job("true")).unwrap();
    collect_events(&rx);
    session.wait();

    assert_eq!(session.request_cancel(), SessionState::Completed);
}

#[test]
fn finishes_when_render_exits_while_descendant_holds_pipes() {
    let mut session = RenderSession::new(options(Duration::from_secs(3)));
    let started = Instant::now();
    let rx = session.start(sh_job("sleep 30 & echo done")).unwrap();
    let events = collect_events(&rx);

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(lines(&events), vec!["done"]);
    assert_eq!(outcome(&events).state, SessionState::Completed);
}

#[test]
fn grace_period_escalates_while_consumer_is_not_reading() {
    let mut opts = options(Duration::from_millis(500));
    opts.event_buffer = 4;
    let mut session = RenderSession::new(opts);
    let rx = session
        .start(sh_job("trap '' TERM; while :; do echo spam; done"))
        .unwrap();
    rx.recv_timeout(Duration::from_secs(5)).unwrap();

    assert_eq!(session.request_cancel(), SessionState::Cancelling);
    let deadline = Instant::now() + Duration::from_secs(10);
    while session.state() != SessionState::Killed && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(50));
    }
    assert_eq!(session.state(), SessionState::Killed);

    let events = collect_events(&rx);
    assert_eq!(outcome(&events).state, SessionState::Killed);
}
