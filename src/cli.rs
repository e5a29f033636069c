//! CLI definitions for ropwatch
//!
//! This module contains the clap CLI structure definitions, separated from main.rs
//! so they can be reused by the completions command and by tests.

use std::path::PathBuf;

use clap::builder::styling::{AnsiColor, Effects, Styles};
use clap::{Args, Parser, Subcommand};
use clap_complete::Shell as CompletionShell;

/// Build clap styles.
///
/// - Green: headers, usage, command names
/// - White: descriptions, placeholders (renders as light gray on dark terminals)
pub fn build_cli_styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Green.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::White.on_default())
        .valid(AnsiColor::White.on_default())
        .invalid(AnsiColor::Red.on_default())
        .error(AnsiColor::Red.on_default() | Effects::BOLD)
}

#[derive(Parser)]
#[command(name = "ropwatch")]
#[command(about = "Run Houdini batch renders and follow their progress")]
#[command(
    long_about = "ropwatch - Run Houdini batch renders and follow their progress.

Launches the configured render driver through hython, reads the render log as
it streams, and reports frames done, average frame time, remaining time and ETA.

QUICK START:
    ropwatch render --hip shot.hip --out /out/Redshift_ROP1
    ropwatch render --hip shot.hip --start 1001 --end 1024
    ropwatch config show

Press Ctrl+C once to stop the render gracefully, twice to kill it."
)]
#[command(version, styles = build_cli_styles())]
pub struct Cli {
    /// Log debug details to stderr
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start a render and monitor it
    #[command(long_about = "Start a batch render and monitor it until it finishes.

Values not given on the command line come from the [defaults] section of the
config file. The render log is printed to stdout, the progress line to stderr.

EXIT CODES:
    0    render completed
    1    render failed or could not be started
    130  render cancelled

EXAMPLES:
    ropwatch render --hip shot.hip
    ropwatch render --hip shot.hip --out /out/merge1 --merge
    ropwatch render --hip shot.hip --start 1 --end 48 --skip-rendered --remember
    ropwatch render --json | jq 'select(.event == \"progress\")'")]
    Render(RenderArgs),

    /// Configuration management
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Generate shell completions
    #[command(long_about = "Print a shell completion script to stdout.

EXAMPLES:
    ropwatch completions bash > ~/.local/share/bash-completion/completions/ropwatch
    ropwatch completions zsh > ~/.zfunc/_ropwatch")]
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
    },
}

/// Flags for `ropwatch render`.
///
/// Boolean flags accept an optional value (`--merge false`) so that a
/// remembered default can be switched off for one run.
#[derive(Args, Debug, Clone, Default)]
pub struct RenderArgs {
    /// Scene file to render
    #[arg(long, value_name = "FILE")]
    pub hip: Option<PathBuf>,

    /// ROP or merge node to render
    #[arg(long, value_name = "NODE")]
    pub out: Option<String>,

    /// First frame of the explicit range (implies --range)
    #[arg(long, value_name = "N", allow_hyphen_values = true)]
    pub start: Option<i64>,

    /// Last frame of the explicit range (implies --range)
    #[arg(long, value_name = "N", allow_hyphen_values = true)]
    pub end: Option<i64>,

    /// Render the explicit frame range instead of the node's own
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_name = "BOOL")]
    pub range: Option<bool>,

    /// The output node is a merge node feeding several ROPs
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_name = "BOOL")]
    pub merge: Option<bool>,

    /// Skip frames whose images already exist
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_name = "BOOL")]
    pub skip_rendered: Option<bool>,

    /// Store these values as the new defaults
    #[arg(long)]
    pub remember: bool,

    /// Print one JSON object per event instead of the log
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current configuration as TOML
    #[command(long_about = "Display the effective configuration in TOML format.

EXAMPLE:
    ropwatch config show")]
    Show,
    /// Print the configuration file path
    Path,
    /// Restore the default configuration
    #[command(long_about = "Overwrite the configuration file with default values.

This also clears the remembered render form values and history.
Use 'ropwatch config reset-form' to keep the other settings.

EXAMPLE:
    ropwatch config reset")]
    Reset,
    /// Reset the render form to defaults and clear its history
    #[command(
        name = "reset-form",
        long_about = "Restore the [defaults] section and clear the remembered scene
files and output nodes. Render, monitor and log settings are kept.

EXAMPLE:
    ropwatch config reset-form"
    )]
    ResetForm,
    /// Open configuration file in your default editor
    #[command(long_about = "Open the configuration file in your default editor.

Uses the $EDITOR environment variable (defaults to 'vi').
Config file location: ~/.config/ropwatch/config.toml

EXAMPLE:
    ropwatch config edit
    EDITOR=nano ropwatch config edit")]
    Edit,
}
