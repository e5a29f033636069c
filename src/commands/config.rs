//! Config subcommands handler

use anyhow::{Context, Result};

use ropwatch::Config;

/// Show current configuration as TOML.
#[cfg(not(tarpaulin_include))]
pub fn handle_show() -> Result<()> {
    let config = Config::load()?;
    let toml_str = toml::to_string_pretty(&config).context("Failed to serialize config")?;
    print!("{}", toml_str);
    Ok(())
}

/// Print the configuration file path.
#[cfg(not(tarpaulin_include))]
pub fn handle_path() -> Result<()> {
    println!("{}", Config::config_path()?.display());
    Ok(())
}

/// Overwrite the configuration file with defaults.
#[cfg(not(tarpaulin_include))]
pub fn handle_reset() -> Result<()> {
    let config_path = Config::config_path()?;
    Config::default().save()?;
    println!("Restored default configuration at {}", config_path.display());
    Ok(())
}

/// Reset the render form values and history, keeping everything else.
#[cfg(not(tarpaulin_include))]
pub fn handle_reset_form() -> Result<()> {
    let mut config = Config::load()?;
    config.reset_form();
    config.save()?;
    println!("Reset render form to defaults and cleared history");
    Ok(())
}

/// Open configuration file in the default editor.
///
/// Uses $EDITOR environment variable (defaults to 'vi').
#[cfg(not(tarpaulin_include))]
pub fn handle_edit() -> Result<()> {
    let config_path = Config::config_path()?;

    // Ensure config exists
    if !config_path.exists() {
        Config::default().save()?;
    }

    let editor = std::env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());
    println!("Opening {} with {}", config_path.display(), editor);

    std::process::Command::new(&editor)
        .arg(&config_path)
        .status()
        .map_err(|e| anyhow::anyhow!("Failed to open editor: {}", e))?;

    // Catch mistakes right away instead of on the next render.
    Config::load().context("Edited config does not load")?;

    Ok(())
}
