//! toolexec - agent-facing tool execution core
//!
//! An autonomous agent drives a handful of side-effecting tools turn by
//! turn. This crate provides two of them behind one dispatcher:
//!
//! - **str_replace_editor**: `view`, `create`, `str_replace`, `insert` and
//!   `undo_edit`, with per-file snapshot stacks persisted to disk so undo
//!   survives process restarts
//! - **bash**: commands run one-shot or inside a long-lived interpreter
//!   session, framed by sentinel lines and bounded by a timeout that kills
//!   the whole process group
//!
//! # Modules
//!
//! - [`tools`] - Tool trait, dispatcher, edit history and the built-in tools
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod tools;

pub use config::{Config, EditorConfig, ShellConfig};
pub use tools::{ArgBag, Dispatcher, Outcome, ToolError, ToolResult};
