//! Render requests, the command line they turn into, and per-run job state.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Command;

use serde::{Deserialize, Serialize};

use crate::config::RenderConfig;

/// What the user asked to render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderRequest {
    /// Scene file (`.hip`)
    pub hip_file: PathBuf,
    /// ROP or merge node path, e.g. `/out/Redshift_ROP1`
    pub out_node: String,
    pub start_frame: i64,
    pub end_frame: i64,
    /// Render `start_frame..=end_frame` instead of the node's own range
    pub use_range: bool,
    /// `out_node` is a merge node feeding several ROPs
    pub merge: bool,
    /// Ask the renderer to skip frames whose output already exists
    pub skip_rendered: bool,
}

impl RenderRequest {
    /// Whether the explicit frame range is actually passed to the renderer.
    ///
    /// A merge node renders each input ROP with its own range.
    pub fn effective_use_range(&self) -> bool {
        self.use_range && !self.merge
    }

    /// Frame count implied by the explicit range, if one is in effect.
    ///
    /// `None` for an inverted range or one too wide to count.
    pub fn range_frames(&self) -> Option<u64> {
        if !self.effective_use_range() {
            return None;
        }
        inclusive_count(self.start_frame, self.end_frame)
    }
}

/// An opaque program + argument vector ready to spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub working_dir: Option<PathBuf>,
}

impl RenderCommand {
    /// Wrap an arbitrary command line.
    pub fn new<I, S>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            working_dir: None,
        }
    }

    /// Build the render-driver invocation for `request`.
    ///
    /// `<executable> <driver> -i <hip> -o <node> -s <start> -e <end> -u <bool> -m <bool> [-k True]`
    pub fn for_request(request: &RenderRequest, config: &RenderConfig) -> Self {
        let mut args: Vec<OsString> = vec![
            config.driver_script_path().into_os_string(),
            "-i".into(),
            request.hip_file.clone().into_os_string(),
            "-o".into(),
            request.out_node.clone().into(),
            "-s".into(),
            request.start_frame.to_string().into(),
            "-e".into(),
            request.end_frame.to_string().into(),
            "-u".into(),
            script_bool(request.effective_use_range()).into(),
            "-m".into(),
            script_bool(request.merge).into(),
        ];
        if request.skip_rendered {
            args.push("-k".into());
            args.push(script_bool(true).into());
        }

        Self {
            program: config.executable_path(),
            args,
            working_dir: config.working_directory_path(),
        }
    }

    /// Run the command from `dir`.
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn program_name(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }

    /// A `std::process::Command` with program, args and working directory set.
    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }

    /// Shell-like one-liner for display. Not meant to be re-parsed.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_os_str())
            .chain(self.args.iter().map(|a| a.as_os_str()))
            .map(|part| quote_for_display(&part.to_string_lossy()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Python-style boolean spelling expected by the driver script.
fn script_bool(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

fn quote_for_display(part: &str) -> String {
    if !part.is_empty()
        && part
            .chars()
            .all(|c| c.is_alphanumeric() || "-_./:=+@%".contains(c))
    {
        part.to_string()
    } else {
        format!("'{}'", part.replace('\'', "'\\''"))
    }
}

/// Mutable state of one running render, owned by the session worker.
#[derive(Debug, Clone)]
pub struct RenderJob {
    pub command: RenderCommand,
    /// 0 while unknown
    pub total_frames: u64,
    pub frames_completed: u64,
    /// Number of "render started" announcements seen so far
    pub batch: usize,
    pub label: Option<String>,
    /// First frame of the explicit range, for output-file reconciliation
    pub range_start: Option<i64>,
    pub last_output: Option<PathBuf>,
    /// A frame has started and not yet produced its finish line
    pub(crate) frame_open: bool,
    /// The current batch announces frame starts at all
    pub(crate) saw_frame_start: bool,
}

impl RenderJob {
    pub fn new(command: RenderCommand) -> Self {
        Self {
            command,
            total_frames: 0,
            frames_completed: 0,
            batch: 0,
            label: None,
            range_start: None,
            last_output: None,
            frame_open: false,
            saw_frame_start: false,
        }
    }

    /// Seed the frame count and range start from a request.
    pub fn with_request(mut self, request: &RenderRequest) -> Self {
        if let Some(frames) = request.range_frames() {
            self.total_frames = frames;
            self.range_start = Some(request.start_frame);
        }
        self
    }

    /// Begin a new batch announced by the log.
    pub fn start_batch(&mut self, label: Option<String>, total_frames: u64) {
        self.batch += 1;
        self.label = label;
        self.total_frames = total_frames;
        self.frames_completed = 0;
        self.frame_open = false;
        self.saw_frame_start = false;
        // Merge-node batches use each ROP's own range.
        if self.batch > 1 {
            self.range_start = None;
        }
    }

    /// Count one more finished frame, never past a known total.
    pub fn complete_frame(&mut self) {
        self.advance_to(self.frames_completed + 1);
    }

    /// Raise the completed count to `count` (clamped); never lowers it.
    pub fn advance_to(&mut self, count: u64) {
        let count = if self.total_frames > 0 {
            count.min(self.total_frames)
        } else {
            count
        };
        self.frames_completed = self.frames_completed.max(count);
    }

    /// Completed count implied by an output file for `frame`.
    pub fn completed_for_frame(&self, frame: i64) -> Option<u64> {
        inclusive_count(self.range_start?, frame)
    }
}

/// Number of frames in `start..=end`, without overflowing.
fn inclusive_count(start: i64, end: i64) -> Option<u64> {
    if end < start {
        return None;
    }
    let span = end.checked_sub(start)?;
    u64::try_from(span).ok()?.checked_add(1)
}
