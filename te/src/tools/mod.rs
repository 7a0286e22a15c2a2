//! Tool system for agents
//!
//! Two tools are exposed: a text editor whose edits can be undone across
//! process restarts, and a shell that runs commands one-shot or inside a
//! persistent interpreter session. Callers go through the `Dispatcher`,
//! which coerces loosely-typed arguments into typed commands and brackets
//! every mutating edit with a load and save of the edit history.

mod context;
mod dispatcher;
mod error;
mod traits;

pub mod args;
pub mod builtin;
pub mod history;

pub use args::{ArgBag, EditCommand, ShellCommand, ToolCall, ViewRange};
pub use context::ToolContext;
pub use dispatcher::Dispatcher;
pub use error::ToolError;
pub use history::{EditHistory, FileState, HistoryError, Snapshot};
pub use traits::{Outcome, Tool, ToolDefinition, ToolResult};
