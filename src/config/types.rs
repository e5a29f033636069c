//! Configuration type definitions and defaults

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub defaults: FormDefaults,
}

/// How the render process is launched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Houdini batch interpreter
    #[serde(default = "default_executable")]
    pub executable: String,
    /// Script run by the interpreter; receives the frame-range flags
    #[serde(default = "default_driver_script")]
    pub driver_script: String,
    /// Directory the render runs in (defaults to the current one)
    #[serde(default)]
    pub working_directory: Option<String>,
}

pub fn default_executable() -> String {
    "hython".to_string()
}

pub fn default_driver_script() -> String {
    "~/.config/ropwatch/render_driver.py".to_string()
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            executable: default_executable(),
            driver_script: default_driver_script(),
            working_directory: None,
        }
    }
}

/// Session monitoring and cancellation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Longest the monitor waits for a log line before checking for cancels
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Seconds between SIGTERM and SIGKILL on cancel
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: u64,
    /// Events buffered between the monitor and the display
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

pub fn default_poll_interval_ms() -> u64 {
    100
}

pub fn default_grace_period_secs() -> u64 {
    3
}

pub fn default_event_buffer() -> usize {
    1024
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            grace_period_secs: default_grace_period_secs(),
            event_buffer: default_event_buffer(),
        }
    }
}

/// Render log format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Tags stripped from the start of each line before matching
    #[serde(default = "default_vendor_prefixes")]
    pub vendor_prefixes: Vec<String>,
    /// Marker printed by the render callback before each written image path
    #[serde(default = "default_output_marker")]
    pub output_marker: String,
    /// Marker for informational messages from the driver script
    #[serde(default = "default_note_marker")]
    pub note_marker: String,
}

pub fn default_vendor_prefixes() -> Vec<String> {
    vec!["[Redshift]".to_string()]
}

pub fn default_output_marker() -> String {
    "ROPWATCH_OUTPUT:".to_string()
}

pub fn default_note_marker() -> String {
    "ROPWATCH_NOTE:".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            vendor_prefixes: default_vendor_prefixes(),
            output_marker: default_output_marker(),
            note_marker: default_note_marker(),
        }
    }
}

/// Last-used render form values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormDefaults {
    #[serde(default)]
    pub hip_file: Option<String>,
    #[serde(default = "default_out_node")]
    pub out_node: String,
    #[serde(default)]
    pub start_frame: i64,
    #[serde(default = "default_end_frame")]
    pub end_frame: i64,
    #[serde(default)]
    pub use_range: bool,
    #[serde(default)]
    pub merge: bool,
    #[serde(default)]
    pub skip_rendered: bool,
    /// Previously remembered scene files, oldest first, no duplicates
    #[serde(default)]
    pub hip_history: Vec<String>,
    /// Previously remembered output nodes, oldest first, no duplicates
    #[serde(default)]
    pub out_history: Vec<String>,
}

pub fn default_out_node() -> String {
    "/out/Redshift_ROP1".to_string()
}

pub fn default_end_frame() -> i64 {
    100
}

impl Default for FormDefaults {
    fn default() -> Self {
        Self {
            hip_file: None,
            out_node: default_out_node(),
            start_frame: 0,
            end_frame: default_end_frame(),
            use_range: false,
            merge: false,
            skip_rendered: false,
            hip_history: Vec::new(),
            out_history: Vec::new(),
        }
    }
}
