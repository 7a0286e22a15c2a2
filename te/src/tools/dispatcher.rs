//! Dispatcher - routes tool calls and brackets edits with history persistence

use std::path::PathBuf;
use tracing::{debug, error};

use crate::config::Config;

use super::args::{ArgBag, EditCommand, ToolCall};
use super::builtin::{ShellTool, TextEditorTool};
use super::history::EditHistory;
use super::{Outcome, Tool, ToolContext, ToolDefinition, ToolError};

/// Owns the execution context and both tools
///
/// One dispatcher serves a whole conversation: the shell session lives as
/// long as it does. Mutating editor commands load the persisted history
/// first and save it afterwards, once, whether or not the command succeeded.
/// Concurrent processes sharing a history file are last-writer-wins.
pub struct Dispatcher {
    ctx: ToolContext,
    history_file: Option<PathBuf>,
    max_history_depth: Option<usize>,
    editor: TextEditorTool,
    shell: ShellTool,
}

impl Dispatcher {
    /// Create a dispatcher persisting history to the configured file
    pub fn new(config: &Config, cwd: PathBuf) -> Self {
        debug!(?cwd, history_file = ?config.history_file, "Dispatcher::new: called");
        let max_history_depth = config.editor.max_history_depth;
        Self {
            ctx: ToolContext::new(cwd).with_history(EditHistory::new().with_max_depth(max_history_depth)),
            history_file: Some(config.history_file.clone()),
            max_history_depth,
            editor: TextEditorTool::new(&config.editor),
            shell: ShellTool::new(&config.shell),
        }
    }

    /// Create a dispatcher with default settings whose history only lives in memory
    pub fn in_memory(cwd: PathBuf) -> Self {
        debug!(?cwd, "Dispatcher::in_memory: called");
        Self {
            ctx: ToolContext::new(cwd),
            history_file: None,
            max_history_depth: None,
            editor: TextEditorTool::default(),
            shell: ShellTool::default(),
        }
    }

    /// Builder method to change where history is persisted; `None` keeps it in memory
    pub fn with_history_file(mut self, history_file: Option<PathBuf>) -> Self {
        self.history_file = history_file;
        self
    }

    pub fn context(&self) -> &ToolContext {
        &self.ctx
    }

    /// Definitions for both tools, editor first
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        debug!("Dispatcher::definitions: called");
        vec![self.editor.definition(), self.shell.definition()]
    }

    /// Execute one tool call
    pub async fn dispatch(&mut self, tool: &str, args: &ArgBag) -> Outcome {
        debug!(%tool, ?args, "Dispatcher::dispatch: called");
        let call = match ToolCall::parse(tool, args, &self.ctx) {
            Ok(call) => call,
            Err(e) => {
                debug!(%e, "Dispatcher::dispatch: rejected while parsing");
                return Outcome::from(Err(e));
            }
        };

        let outcome = match call {
            ToolCall::Edit(command) if command.is_mutating() => self.dispatch_mutating(command).await,
            ToolCall::Edit(command) => self.editor.execute(command, &mut self.ctx).await.into(),
            ToolCall::Shell(command) => self.shell.execute(command, &mut self.ctx).await.into(),
        };
        debug!(kind = outcome.kind(), "Dispatcher::dispatch: done");
        outcome
    }

    async fn dispatch_mutating(&mut self, command: EditCommand) -> Outcome {
        debug!(command = command.name(), "Dispatcher::dispatch_mutating: called");
        let Some(file) = self.history_file.clone() else {
            return self.editor.execute(command, &mut self.ctx).await.into();
        };

        match EditHistory::load(&file).await {
            Ok(history) => self.ctx.history = history.with_max_depth(self.max_history_depth),
            Err(source) => {
                error!(?file, %source, "Failed to load edit history");
                return Outcome::Fatal(ToolError::HistoryLoad { path: file, source });
            }
        }

        let result = self.editor.execute(command, &mut self.ctx).await;

        if let Err(source) = self.ctx.history.save(&file).await {
            error!(?file, %source, "Failed to save edit history");
            return Outcome::Fatal(ToolError::HistorySave { path: file, source });
        }
        result.into()
    }

    /// Terminate the shell session
    pub async fn shutdown(&mut self) {
        debug!("Dispatcher::shutdown: called");
        self.shell.shutdown().await;
    }
}
