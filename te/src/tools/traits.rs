//! Tool trait definition and the result contract

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::context::ToolContext;
use super::error::ToolError;

/// A tool that can be called by an agent
///
/// Each tool accepts its own typed command; the dispatcher is the only place
/// that deals with loosely-typed arguments.
#[async_trait]
pub trait Tool: Send {
    /// Typed command accepted by this tool
    type Command: Send + 'static;

    /// Tool name (matches the agent-facing tool name)
    fn name(&self) -> &'static str;

    /// Human-readable description
    fn description(&self) -> &'static str;

    /// JSON Schema for input parameters
    fn input_schema(&self) -> Value;

    /// Execute one command
    async fn execute(&mut self, command: Self::Command, ctx: &mut ToolContext) -> Result<ToolResult, ToolError>;

    /// Definition handed to an agent
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}

/// Name, description and schema of a tool
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Result of a tool execution
///
/// A result is successful iff `error` is `None`. `output` may be set alongside
/// `error` (partial output before a failure).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolResult {
    pub output: Option<String>,
    pub error: Option<String>,
    /// Side channel for notices such as truncation
    pub system: Option<String>,
}

impl ToolResult {
    /// Create a successful result
    pub fn success(output: impl Into<String>) -> Self {
        debug!("ToolResult::success: called");
        Self {
            output: Some(output.into()),
            ..Default::default()
        }
    }

    /// Create an error result
    pub fn error(error: impl Into<String>) -> Self {
        debug!("ToolResult::error: called");
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// Create a failed result that still carries output
    pub fn partial(output: impl Into<String>, error: impl Into<String>) -> Self {
        debug!("ToolResult::partial: called");
        Self {
            output: Some(output.into()),
            error: Some(error.into()),
            system: None,
        }
    }

    /// Attach a side-channel notice
    pub fn with_system(mut self, system: Option<String>) -> Self {
        self.system = system;
        self
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Output and error joined with a newline, then any system notice
    pub fn render(&self) -> String {
        let mut text = String::new();
        if let Some(output) = &self.output {
            text.push_str(output);
        }
        if let Some(error) = &self.error {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(error);
        }
        if let Some(system) = &self.system {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(system);
        }
        text
    }
}

/// What a dispatched call amounted to
#[derive(Debug)]
pub enum Outcome {
    /// The operation did what was asked
    Success(ToolResult),
    /// Expected, agent-recoverable failure
    Failed(ToolResult),
    /// Malformed call, rejected before any mutation
    Rejected(ToolError),
    /// Tool state could not be persisted or restored
    Fatal(ToolError),
}

impl Outcome {
    /// Status code reported to callers: 0 success, 1 failed, -1 rejected, -2 fatal
    pub fn status_code(&self) -> i32 {
        match self {
            Self::Success(_) => 0,
            Self::Failed(_) => 1,
            Self::Rejected(_) => -1,
            Self::Fatal(_) => -2,
        }
    }

    /// Process exit code for the CLI
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Success(_) => 0,
            Self::Failed(_) => 1,
            Self::Rejected(_) => 2,
            Self::Fatal(_) => 3,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::Failed(_) => "failed",
            Self::Rejected(_) => "rejected",
            Self::Fatal(_) => "fatal",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Combined text for the caller
    pub fn render(&self) -> String {
        match self {
            Self::Success(result) | Self::Failed(result) => result.render(),
            Self::Rejected(err) => err.to_string(),
            Self::Fatal(err) => {
                // Include the source chain; persistence failures need the io cause
                let mut text = err.to_string();
                let mut source = std::error::Error::source(err);
                while let Some(cause) = source {
                    text.push_str(&format!(": {}", cause));
                    source = cause.source();
                }
                text
            }
        }
    }
}

impl From<Result<ToolResult, ToolError>> for Outcome {
    fn from(result: Result<ToolResult, ToolError>) -> Self {
        match result {
            Ok(result) if result.is_success() => Self::Success(result),
            Ok(result) => Self::Failed(result),
            Err(err) if err.is_fatal() => Self::Fatal(err),
            Err(err) => Self::Rejected(err),
        }
    }
}
