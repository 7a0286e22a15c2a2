//! toolexec configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::tools::builtin::ShellMode;

/// Main toolexec configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level when `--log-level` is not given (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Where the edit history is persisted
    #[serde(rename = "history-file")]
    pub history_file: PathBuf,

    /// Text editor settings
    pub editor: EditorConfig,

    /// Shell settings
    pub shell: ShellConfig,
}

fn default_history_file() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("toolexec")
        .join("file_history.json")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: None,
            history_file: default_history_file(),
            editor: EditorConfig::default(),
            shell: ShellConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, it must load
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .toolexec.yml
        let local_config = PathBuf::from(".toolexec.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/toolexec/toolexec.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("toolexec").join("toolexec.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let mut config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        config.history_file = expand_home(&config.history_file);

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Expand a leading `~` to the home directory
fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

/// Text editor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Lines of context shown around an edit
    #[serde(rename = "snippet-lines")]
    pub snippet_lines: usize,

    /// Responses are clipped to this many characters
    #[serde(rename = "max-response-len")]
    pub max_response_len: usize,

    /// Snapshots kept per file; unbounded when unset
    #[serde(rename = "max-history-depth")]
    pub max_history_depth: Option<usize>,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            snippet_lines: 4,
            max_response_len: 16_000,
            max_history_depth: None,
        }
    }
}

/// Shell configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// Interpreter to run
    pub program: String,

    /// Default execution mode
    pub mode: ShellMode,

    /// Seconds to wait for a command before killing it
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,

    /// Output is clipped to this many characters
    #[serde(rename = "max-response-len")]
    pub max_response_len: usize,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            program: "/bin/bash".to_string(),
            mode: ShellMode::Session,
            timeout_secs: 120,
            max_response_len: 16_000,
        }
    }
}
