//! Render command handler

use std::sync::mpsc::RecvTimeoutError;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use ropwatch::cli::RenderArgs;
use ropwatch::config::FormDefaults;
use ropwatch::render::{
    RenderCommand, RenderJob, RenderRequest, RenderSession, SessionEvent, SessionOptions,
    SessionState,
};
use ropwatch::utils::process_guard::InterruptGuard;
use ropwatch::{Config, ConsolePresenter};

/// How often the foreground loop checks for Ctrl+C while no events arrive
const INTERRUPT_POLL: Duration = Duration::from_millis(100);

/// Start a render and follow it to the end. Returns the process exit code.
#[cfg(not(tarpaulin_include))]
pub fn handle(args: &RenderArgs) -> Result<i32> {
    let mut config = Config::load()?;
    let request = build_request(args, &config.defaults)?;

    if args.remember {
        config.remember(&request);
        config.save().context("Failed to remember render settings")?;
    }

    let command = RenderCommand::for_request(&request, &config.render);
    let job = RenderJob::new(command).with_request(&request);
    let presenter = if args.json {
        ConsolePresenter::json()
    } else {
        ConsolePresenter::new()
    };

    run_job(job, SessionOptions::from_config(&config), presenter)
}

/// Drive one session in the foreground, relaying interrupts as cancel requests.
#[cfg(not(tarpaulin_include))]
fn run_job(job: RenderJob, options: SessionOptions, mut presenter: ConsolePresenter) -> Result<i32> {
    let guard = InterruptGuard::new();
    guard.register_signal_handlers();

    presenter.announce(&job.command.display());

    let mut session = RenderSession::new(options);
    let events = session.start(job)?;
    let mut cancels_sent = 0;

    loop {
        let wanted = guard.level().requests();
        while cancels_sent < wanted {
            let state = session.request_cancel();
            presenter.cancelling(state);
            cancels_sent += 1;
        }

        match events.recv_timeout(INTERRUPT_POLL) {
            Ok(event) => {
                let finished = matches!(event, SessionEvent::Finished(_));
                presenter.handle(&event)?;
                if finished {
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    let outcome = session
        .wait()
        .context("Render monitor stopped without a result")?;
    Ok(exit_code(outcome.state))
}

/// Merge command-line flags over the remembered form values.
///
/// Giving `--start` or `--end` turns the explicit range on unless `--range`
/// says otherwise.
pub fn build_request(args: &RenderArgs, defaults: &FormDefaults) -> Result<RenderRequest> {
    let hip_file = match (&args.hip, &defaults.hip_file) {
        (Some(hip), _) => hip.clone(),
        (None, Some(hip)) => hip.into(),
        (None, None) => bail!("No scene file given. Pass --hip FILE or remember one with --remember"),
    };

    let explicit_bounds = args.start.is_some() || args.end.is_some();
    let request = RenderRequest {
        hip_file,
        out_node: args.out.clone().unwrap_or_else(|| defaults.out_node.clone()),
        start_frame: args.start.unwrap_or(defaults.start_frame),
        end_frame: args.end.unwrap_or(defaults.end_frame),
        use_range: args
            .range
            .unwrap_or(explicit_bounds || defaults.use_range),
        merge: args.merge.unwrap_or(defaults.merge),
        skip_rendered: args.skip_rendered.unwrap_or(defaults.skip_rendered),
    };

    if request.out_node.trim().is_empty() {
        bail!("Output node must not be empty");
    }
    if request.use_range && request.end_frame < request.start_frame {
        bail!(
            "End frame {} is before start frame {}",
            request.end_frame,
            request.start_frame
        );
    }

    Ok(request)
}

/// Process exit code for a finished session.
pub fn exit_code(state: SessionState) -> i32 {
    match state {
        SessionState::Completed => 0,
        SessionState::Killed => 130,
        _ => 1,
    }
}
