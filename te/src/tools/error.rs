//! Tool error types

use std::path::PathBuf;
use thiserror::Error;

use super::history::HistoryError;

/// Errors that abort a tool invocation
///
/// Everything here is either a contract violation (the call itself was
/// malformed) or a persistence failure. Expected, agent-recoverable failures
/// such as "string not found" are reported through `ToolResult::error`.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },

    #[error("Unrecognized command {command}. The allowed commands for the {tool} tool are: {allowed}")]
    UnknownCommand {
        tool: &'static str,
        command: String,
        allowed: String,
    },

    #[error("No command provided for the {tool} tool")]
    MissingCommand { tool: &'static str },

    #[error("Parameter `{name}` is required for command: {command}")]
    MissingArgument { name: &'static str, command: &'static str },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("The path {path} is a directory and only the `view` command can be used on directories")]
    NotAFile { path: PathBuf },

    #[error("no command provided.")]
    EmptyCommand,

    #[error("Failed to load edit history from {path}")]
    HistoryLoad {
        path: PathBuf,
        #[source]
        source: HistoryError,
    },

    #[error("Failed to persist edit history to {path}")]
    HistorySave {
        path: PathBuf,
        #[source]
        source: HistoryError,
    },
}

impl ToolError {
    /// Whether this error means tool state may have been lost
    ///
    /// Fatal errors are reported distinctly from contract violations: the
    /// agent cannot fix them by adjusting its arguments.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::HistoryLoad { .. } | Self::HistorySave { .. })
    }
}
