//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// toolexec - agent tool execution: a text editor with undo and a shell
#[derive(Parser)]
#[command(
    name = "te",
    about = "Run agent tool calls: a file editor with persistent undo and a shell session",
    version = env!("CARGO_PKG_VERSION"),
    after_help = "Logs are written to: ~/.local/share/toolexec/logs/toolexec.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(short, long, global = true, help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)")]
    pub log_level: Option<String>,

    /// Override the edit history file
    #[arg(long, global = true, help = "Edit history file (overrides config)")]
    pub history_file: Option<PathBuf>,

    /// Working directory relative paths and commands resolve against
    #[arg(long, global = true, help = "Working directory (default: current directory)")]
    pub cwd: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Run a single tool call
    Call {
        /// Tool name (str_replace_editor, bash, or the aliases edit, shell)
        tool: String,

        /// Tool arguments as `--name value` pairs
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "ARGS")]
        args: Vec<String>,
    },

    /// Serve JSON-lines tool calls on stdin, one response line per request
    Serve,

    /// Inspect or clear the edit history
    History {
        #[command(subcommand)]
        command: HistoryCommand,
    },

    /// Print tool definitions as JSON
    Schema,
}

/// History subcommands
#[derive(Subcommand)]
pub enum HistoryCommand {
    /// List tracked files with snapshot depth
    List,

    /// Drop the history of one file, or of every file
    Clear {
        /// File whose history to drop (default: all files)
        #[arg(short, long)]
        path: Option<PathBuf>,
    },
}
