//! Config command handlers

use std::path::PathBuf;

use anyhow::{Context, Result};

use worklog_core::Config;

use crate::output::{Output, OutputFormat};

fn or_unset(value: Option<&str>) -> &str {
    value.unwrap_or("(not set)")
}

/// Show current configuration
pub fn show(config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    match output.format {
        OutputFormat::Json => {
            // The token itself is never printed
            println!(
                "{}",
                serde_json::json!({
                    "data_dir": config.data_dir,
                    "bind_addr": config.bind_addr,
                    "server_url": config.server_url,
                    "admin_token_set": config.admin_token.is_some(),
                    "private_marker": config.private_marker,
                    "issue_base_url": config.issue_base_url,
                    "persist_timeout_ms": config.persist_timeout_ms,
                    "log_file": config.log_file
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", config.data_dir.display());
        }
        OutputFormat::Human => {
            let effective_path = config_path
                .cloned()
                .unwrap_or_else(Config::config_file_path);
            let log_file = config.log_file.as_ref().map(|p| p.display().to_string());
            println!("Configuration:");
            println!("  data_dir:           {}", config.data_dir.display());
            println!("  bind_addr:          {}", config.bind_addr);
            println!("  server_url:         {}", or_unset(config.server_url.as_deref()));
            println!(
                "  admin_token:        {}",
                if config.admin_token.is_some() {
                    "(set)"
                } else {
                    "(not set)"
                }
            );
            println!("  private_marker:     {}", config.private_marker);
            println!("  issue_base_url:     {}", config.issue_base_url);
            println!("  persist_timeout_ms: {}", config.persist_timeout_ms);
            println!("  log_file:           {}", or_unset(log_file.as_deref()));
            println!();
            println!("Config file: {}", effective_path.display());
        }
    }

    Ok(())
}

/// Set a configuration value
pub fn set(
    key: String,
    value: String,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    let mut config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    config.set_value(&key, &value)?;

    // Save to the CLI-specified path or default
    let save_path = config_path
        .cloned()
        .unwrap_or_else(Config::config_file_path);
    config
        .save_to_path(&save_path)
        .context("Failed to save configuration")?;

    let shown = if key == "admin_token" { "****" } else { value.as_str() };
    output.success(&format!("Set {} = {}", key, shown));

    Ok(())
}
