//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/worklog/config.toml)
//! 3. Environment variables (WORKLOG_* prefix)
//!
//! Environment variables take precedence over config file values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variable prefix
const ENV_PREFIX: &str = "WORKLOG";

/// Keys accepted by [`Config::set_value`]
pub const CONFIG_KEYS: &[&str] = &[
    "data_dir",
    "bind_addr",
    "server_url",
    "admin_token",
    "private_marker",
    "issue_base_url",
    "persist_timeout_ms",
    "log_file",
];

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Directory for data storage (SQLite db)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Address `worklog serve` listens on
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Remote worklog server; when set the board talks HTTP instead of
    /// opening the local database
    #[serde(default)]
    pub server_url: Option<String>,

    /// Token that makes a request privileged (may mutate, sees private items)
    #[serde(default)]
    pub admin_token: Option<String>,

    /// Repository-name suffix that marks an item private
    #[serde(default = "default_private_marker")]
    pub private_marker: String,

    /// Base URL issue keys are resolved against
    #[serde(default = "default_issue_base_url")]
    pub issue_base_url: String,

    /// Upper bound on a single persist before the board rolls back
    #[serde(default = "default_persist_timeout_ms")]
    pub persist_timeout_ms: u64,

    /// Log file for the terminal board (logging is off when unset)
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            bind_addr: default_bind_addr(),
            server_url: None,
            admin_token: None,
            private_marker: default_private_marker(),
            issue_base_url: default_issue_base_url(),
            persist_timeout_ms: default_persist_timeout_ms(),
            log_file: None,
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (WORKLOG_DATA_DIR, WORKLOG_SERVER_URL, ...)
    /// 2. Config file (~/.config/worklog/config.toml or WORKLOG_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration, preferring a path given on the command line
    pub fn load_with_cli_override(path: Option<&PathBuf>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.ensure_data_dir()?;
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = env_var("DATA_DIR") {
            self.data_dir = PathBuf::from(val);
        }

        if let Ok(val) = env_var("BIND_ADDR") {
            if !val.is_empty() {
                self.bind_addr = val;
            }
        }

        // Empty string clears the optional values
        if let Ok(val) = env_var("SERVER_URL") {
            self.server_url = non_empty(val);
        }
        if let Ok(val) = env_var("ADMIN_TOKEN") {
            self.admin_token = non_empty(val);
        }

        if let Ok(val) = env_var("PRIVATE_MARKER") {
            self.private_marker = val;
        }

        if let Ok(val) = env_var("ISSUE_BASE_URL") {
            if !val.is_empty() {
                self.issue_base_url = val;
            }
        }

        if let Ok(val) = env_var("PERSIST_TIMEOUT_MS") {
            match val.parse() {
                Ok(ms) => self.persist_timeout_ms = ms,
                Err(_) => tracing::warn!(value = %val, "ignoring invalid WORKLOG_PERSIST_TIMEOUT_MS"),
            }
        }

        if let Ok(val) = env_var("LOG_FILE") {
            self.log_file = non_empty(val).map(PathBuf::from);
        }
    }

    /// Ensure data directory exists
    fn ensure_data_dir(&self) -> Result<()> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)
                .with_context(|| format!("Failed to create data directory: {:?}", self.data_dir))?;
        }
        Ok(())
    }

    /// Set a single key from its string form, validating the value
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        let cleared = value.is_empty() || value == "none";
        match key {
            "data_dir" => {
                if cleared {
                    bail!("data_dir cannot be empty");
                }
                self.data_dir = PathBuf::from(value);
            }
            "bind_addr" => {
                value
                    .parse::<std::net::SocketAddr>()
                    .with_context(|| format!("Invalid bind_addr '{}'. Use HOST:PORT.", value))?;
                self.bind_addr = value.to_string();
            }
            "server_url" => {
                if cleared {
                    self.server_url = None;
                } else if value.starts_with("http://") || value.starts_with("https://") {
                    self.server_url = Some(value.trim_end_matches('/').to_string());
                } else {
                    bail!("Invalid server_url '{}'. It must start with http:// or https://", value);
                }
            }
            "admin_token" => {
                self.admin_token = if cleared { None } else { Some(value.to_string()) };
            }
            "private_marker" => {
                self.private_marker = if value == "none" { String::new() } else { value.to_string() };
            }
            "issue_base_url" => {
                if cleared {
                    bail!("issue_base_url cannot be empty");
                }
                self.issue_base_url = value.trim_end_matches('/').to_string();
            }
            "persist_timeout_ms" => {
                let ms: u64 = value
                    .parse()
                    .context("Invalid value for persist_timeout_ms. Use a number of milliseconds.")?;
                if ms == 0 {
                    bail!("persist_timeout_ms must be greater than zero");
                }
                self.persist_timeout_ms = ms;
            }
            "log_file" => {
                self.log_file = if cleared { None } else { Some(PathBuf::from(value)) };
            }
            _ => {
                bail!(
                    "Unknown configuration key: '{}'\nValid keys: {}",
                    key,
                    CONFIG_KEYS.join(", ")
                );
            }
        }
        Ok(())
    }

    /// Save configuration to the default file
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_file_path())
    }

    /// Save configuration to a specific file
    pub fn save_to_path(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with WORKLOG_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = env_var("CONFIG") {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("worklog")
            .join("config.toml")
    }

    /// Get the path to the SQLite database
    pub fn sqlite_path(&self) -> PathBuf {
        self.data_dir.join("worklog.db")
    }

    pub fn persist_timeout(&self) -> Duration {
        Duration::from_millis(self.persist_timeout_ms)
    }
}

fn env_var(name: &str) -> Result<String, std::env::VarError> {
    std::env::var(format!("{}_{}", ENV_PREFIX, name))
}

fn non_empty(val: String) -> Option<String> {
    if val.is_empty() {
        None
    } else {
        Some(val)
    }
}

/// Get the default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("worklog")
}

fn default_bind_addr() -> String {
    "127.0.0.1:8787".to_string()
}

fn default_private_marker() -> String {
    "-private".to_string()
}

fn default_issue_base_url() -> String {
    "https://github.com".to_string()
}

fn default_persist_timeout_ms() -> u64 {
    10_000
}
