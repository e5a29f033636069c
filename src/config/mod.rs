//! Configuration management for ropwatch

mod io;
mod types;

pub use types::*;

use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::render::RenderRequest;

/// Accepted range for `[monitor].grace_period_secs`
pub const GRACE_PERIOD_RANGE: std::ops::RangeInclusive<u64> = 1..=60;

impl Config {
    /// Get the config file path (~/.config/ropwatch/config.toml)
    pub fn config_path() -> Result<PathBuf> {
        io::config_path()
    }

    /// Get the config directory path (~/.config/ropwatch)
    pub fn config_dir() -> Result<PathBuf> {
        io::config_dir()
    }

    /// Load configuration from file, or return defaults if not found
    pub fn load() -> Result<Self> {
        io::load()
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        io::load_from(path)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        io::save(self)
    }

    /// Save configuration to a specific file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        io::save_to(self, path)
    }

    /// Validate configuration values.
    ///
    /// Returns `Ok(())` if all values are within acceptable bounds,
    /// or an error describing the first invalid value found.
    pub fn validate(&self) -> Result<(), String> {
        if self.render.executable.trim().is_empty() {
            return Err("render.executable must not be empty".to_string());
        }
        if self.monitor.poll_interval_ms == 0 {
            return Err("monitor.poll_interval_ms must be > 0".to_string());
        }
        if !GRACE_PERIOD_RANGE.contains(&self.monitor.grace_period_secs) {
            return Err(format!(
                "monitor.grace_period_secs must be between {} and {}",
                GRACE_PERIOD_RANGE.start(),
                GRACE_PERIOD_RANGE.end()
            ));
        }
        if self.monitor.event_buffer == 0 {
            return Err("monitor.event_buffer must be > 0".to_string());
        }
        if self.log.output_marker.is_empty() || self.log.note_marker.is_empty() {
            return Err("log.output_marker and log.note_marker must not be empty".to_string());
        }
        if self.log.output_marker == self.log.note_marker {
            return Err("log.output_marker and log.note_marker must differ".to_string());
        }
        if self.defaults.end_frame < self.defaults.start_frame {
            return Err("defaults.end_frame must be >= defaults.start_frame".to_string());
        }
        Ok(())
    }

    /// Remember the values of a render request as the new form defaults
    /// and add its scene file and output node to the form history.
    pub fn remember(&mut self, request: &RenderRequest) {
        let hip = request.hip_file.to_string_lossy().into_owned();
        let defaults = &mut self.defaults;

        push_unique(&mut defaults.hip_history, &hip);
        push_unique(&mut defaults.out_history, &request.out_node);
        defaults.hip_file = Some(hip);
        defaults.out_node = request.out_node.clone();
        defaults.start_frame = request.start_frame;
        defaults.end_frame = request.end_frame;
        defaults.use_range = request.use_range;
        defaults.merge = request.merge;
        defaults.skip_rendered = request.skip_rendered;
    }

    /// Restore the form defaults and clear the form history.
    ///
    /// `[render]`, `[monitor]` and `[log]` are left untouched.
    pub fn reset_form(&mut self) {
        self.defaults = FormDefaults::default();
    }
}

impl RenderConfig {
    /// Executable path with `~` expanded
    pub fn executable_path(&self) -> PathBuf {
        expand_home(&self.executable)
    }

    /// Driver script path with `~` expanded
    pub fn driver_script_path(&self) -> PathBuf {
        expand_home(&self.driver_script)
    }

    /// Working directory with `~` expanded, if configured
    pub fn working_directory_path(&self) -> Option<PathBuf> {
        self.working_directory.as_deref().map(expand_home)
    }
}

fn push_unique(history: &mut Vec<String>, value: &str) {
    if !history.iter().any(|entry| entry == value) {
        history.push(value.to_string());
    }
}

/// Expand a leading `~/` to the home directory
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}
