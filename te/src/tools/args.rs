//! Argument bag and the typed commands it is coerced into
//!
//! Callers hand the dispatcher a flat map of text arguments. `ToolCall::parse`
//! turns that map into one of a closed set of typed commands, once, at the
//! boundary. Coercion is lenient where agents are known to format things
//! loosely (`view_range`, `insert_line`, `timeout`, `mode`): malformed values
//! are treated as absent instead of failing the call.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

use super::builtin::ShellMode;
use super::context::ToolContext;
use super::error::ToolError;

/// Agent-facing name of the text editor tool
pub const EDITOR_TOOL: &str = "str_replace_editor";

/// Agent-facing name of the shell tool
pub const SHELL_TOOL: &str = "bash";

/// Sub-commands of the text editor tool
pub const EDITOR_COMMANDS: [&str; 5] = ["view", "create", "str_replace", "insert", "undo_edit"];

/// Flat map of named arguments; a key may be present without a value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgBag(BTreeMap<String, Option<String>>);

impl ArgBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to add one argument
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), Some(value.into()));
        self
    }

    /// Add a key with an optional value
    pub fn insert(&mut self, key: impl Into<String>, value: Option<String>) {
        self.0.insert(key.into(), value);
    }

    /// Value for `key`, if the key is present and carries a value
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.as_deref())
    }

    /// Whether `key` was given at all
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Parse `--key value` pairs from command-line tokens
    ///
    /// The token after a key is always its value, even when it starts with
    /// `--`, so agent text such as `--verbose` survives as a value. A key at the
    /// very end has no value. Stray tokens that are not keys are rejected.
    pub fn from_cli_args(tokens: &[String]) -> Result<Self, ToolError> {
        debug!(count = tokens.len(), "ArgBag::from_cli_args: called");
        let mut bag = Self::new();
        let mut iter = tokens.iter();
        while let Some(token) = iter.next() {
            let Some(key) = token.strip_prefix("--") else {
                return Err(ToolError::InvalidArgument(format!(
                    "expected `--name value` pairs, found stray value `{}`",
                    token
                )));
            };
            bag.insert(key, iter.next().cloned());
        }
        Ok(bag)
    }

    /// Convert a JSON object into a bag; non-string values become their JSON text
    pub fn from_json(map: &Map<String, Value>) -> Self {
        debug!(count = map.len(), "ArgBag::from_json: called");
        let mut bag = Self::new();
        for (key, value) in map {
            let text = match value {
                Value::Null => None,
                Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            };
            bag.insert(key.clone(), text);
        }
        bag
    }
}

/// Inclusive, 1-indexed line range; `end == -1` means end of file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewRange {
    pub start: i64,
    pub end: i64,
}

impl std::fmt::Display for ViewRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// Typed text editor commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditCommand {
    View {
        path: PathBuf,
        view_range: Option<ViewRange>,
    },
    Create {
        path: PathBuf,
        file_text: String,
    },
    StrReplace {
        path: PathBuf,
        old_str: String,
        new_str: String,
    },
    Insert {
        path: PathBuf,
        insert_line: i64,
        new_str: String,
    },
    UndoEdit {
        path: PathBuf,
    },
}

impl EditCommand {
    pub fn path(&self) -> &PathBuf {
        match self {
            Self::View { path, .. }
            | Self::Create { path, .. }
            | Self::StrReplace { path, .. }
            | Self::Insert { path, .. }
            | Self::UndoEdit { path } => path,
        }
    }

    /// Whether this command can change the file or its history
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Self::View { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::View { .. } => "view",
            Self::Create { .. } => "create",
            Self::StrReplace { .. } => "str_replace",
            Self::Insert { .. } => "insert",
            Self::UndoEdit { .. } => "undo_edit",
        }
    }
}

/// Typed shell commands
#[derive(Debug, Clone, PartialEq)]
pub enum ShellCommand {
    Run {
        command: String,
        timeout: Option<Duration>,
        mode: Option<ShellMode>,
    },
    Restart,
}

/// A fully typed tool call
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    Edit(EditCommand),
    Shell(ShellCommand),
}

impl ToolCall {
    /// Coerce a tool name and argument bag into a typed call
    pub fn parse(tool: &str, args: &ArgBag, ctx: &ToolContext) -> Result<Self, ToolError> {
        debug!(%tool, "ToolCall::parse: called");
        match tool {
            EDITOR_TOOL | "edit" => parse_edit(args, ctx).map(Self::Edit),
            SHELL_TOOL | "shell" => parse_shell(args).map(Self::Shell),
            other => Err(ToolError::UnknownTool { name: other.to_string() }),
        }
    }
}

fn parse_edit(args: &ArgBag, ctx: &ToolContext) -> Result<EditCommand, ToolError> {
    let command = args
        .get("command")
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or(ToolError::MissingCommand { tool: EDITOR_TOOL })?;

    let command: &'static str = EDITOR_COMMANDS
        .iter()
        .copied()
        .find(|known| *known == command)
        .ok_or_else(|| ToolError::UnknownCommand {
            tool: EDITOR_TOOL,
            command: command.to_string(),
            allowed: EDITOR_COMMANDS.join(", "),
        })?;

    let raw_path = args
        .get("path")
        .filter(|p| !p.trim().is_empty())
        .ok_or(ToolError::MissingArgument { name: "path", command })?;
    let path = ctx.normalize_path(std::path::Path::new(raw_path));
    debug!(?path, %command, "parse_edit: normalized path");

    let required = |name: &'static str| -> Result<String, ToolError> {
        args.get(name)
            .map(str::to_string)
            .or_else(|| args.contains(name).then(String::new))
            .ok_or(ToolError::MissingArgument { name, command })
    };

    let parsed = match command {
        "view" => EditCommand::View {
            path,
            view_range: args.get("view_range").and_then(parse_view_range),
        },
        "create" => EditCommand::Create {
            path,
            file_text: required("file_text")?,
        },
        "str_replace" => {
            let old_str = required("old_str")?;
            if old_str.is_empty() {
                return Err(ToolError::InvalidArgument(
                    "Parameter `old_str` must not be empty for command: str_replace".to_string(),
                ));
            }
            EditCommand::StrReplace {
                path,
                old_str,
                new_str: required("new_str")?,
            }
        }
        "insert" => {
            let insert_line = args
                .get("insert_line")
                .and_then(parse_insert_line)
                .ok_or(ToolError::MissingArgument {
                    name: "insert_line",
                    command,
                })?;
            EditCommand::Insert {
                path,
                insert_line,
                new_str: required("new_str")?,
            }
        }
        _ => EditCommand::UndoEdit { path },
    };
    Ok(parsed)
}

fn parse_shell(args: &ArgBag) -> Result<ShellCommand, ToolError> {
    if args.contains("restart") && is_truthy(args.get("restart")) {
        debug!("parse_shell: restart requested");
        return Ok(ShellCommand::Restart);
    }

    let command = args
        .get("command")
        .filter(|c| !c.trim().is_empty())
        .ok_or(ToolError::EmptyCommand)?;

    Ok(ShellCommand::Run {
        command: command.to_string(),
        timeout: args.get("timeout").and_then(parse_timeout),
        mode: args.get("mode").and_then(ShellMode::parse_lenient),
    })
}

/// A flag given without a value counts as set
fn is_truthy(value: Option<&str>) -> bool {
    match value {
        None => true,
        Some(v) => matches!(v.trim().to_lowercase().as_str(), "true" | "1" | "yes" | "on"),
    }
}

/// Accepts `[1, 5]`, `1,5`, `1 5`; anything else is treated as absent
pub fn parse_view_range(text: &str) -> Option<ViewRange> {
    if let Ok(values) = serde_json::from_str::<Vec<i64>>(text) {
        return match values.as_slice() {
            [start, end] => Some(ViewRange { start: *start, end: *end }),
            _ => {
                warn!(%text, "parse_view_range: expected two integers, ignoring");
                None
            }
        };
    }

    let trimmed = text.trim().trim_start_matches(['[', '(']).trim_end_matches([']', ')']);
    let parts: Vec<&str> = trimmed
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|p| !p.is_empty())
        .collect();
    match parts.as_slice() {
        [start, end] => match (start.parse(), end.parse()) {
            (Ok(start), Ok(end)) => Some(ViewRange { start, end }),
            _ => {
                warn!(%text, "parse_view_range: non-numeric range, ignoring");
                None
            }
        },
        _ => {
            warn!(%text, "parse_view_range: malformed range, ignoring");
            None
        }
    }
}

/// Integer line number, or absent when not numeric
pub fn parse_insert_line(text: &str) -> Option<i64> {
    match text.trim().parse() {
        Ok(line) => Some(line),
        Err(_) => {
            warn!(%text, "parse_insert_line: not an integer, ignoring");
            None
        }
    }
}

/// Timeout in seconds; non-positive or non-numeric values are absent
fn parse_timeout(text: &str) -> Option<Duration> {
    match text.trim().parse::<f64>() {
        Ok(secs) if secs > 0.0 => match Duration::try_from_secs_f64(secs) {
            Ok(timeout) => Some(timeout),
            Err(e) => {
                warn!(%text, %e, "parse_timeout: timeout out of range, using default");
                None
            }
        },
        _ => {
            warn!(%text, "parse_timeout: invalid timeout, using default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn ctx() -> (tempfile::TempDir, ToolContext) {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf());
        (temp, ctx)
    }

    #[test]
    fn test_view_range_formats() {
        assert_eq!(parse_view_range("[1, 5]"), Some(ViewRange { start: 1, end: 5 }));
        assert_eq!(parse_view_range("3,-1"), Some(ViewRange { start: 3, end: -1 }));
        assert_eq!(parse_view_range(" 2 9 "), Some(ViewRange { start: 2, end: 9 }));
        assert_eq!(parse_view_range("(4, 6)"), Some(ViewRange { start: 4, end: 6 }));
    }

    #[test]
    fn test_malformed_view_range_is_absent() {
        assert_eq!(parse_view_range("[1, 2, 3]"), None);
        assert_eq!(parse_view_range("one to five"), None);
        assert_eq!(parse_view_range("[1"), None);
        assert_eq!(parse_view_range(""), None);
    }

    #[test]
    fn test_timeout_out_of_range_is_absent() {
        assert_eq!(parse_timeout("2.5"), Some(Duration::from_millis(2500)));
        assert_eq!(parse_timeout("1e30"), None);
        assert_eq!(parse_timeout("inf"), None);
        assert_eq!(parse_timeout("NaN"), None);
        assert_eq!(parse_timeout("0"), None);
        assert_eq!(parse_timeout("-3"), None);
    }

    #[test]
    fn test_insert_line_is_lenient() {
        assert_eq!(parse_insert_line(" 7 "), Some(7));
        assert_eq!(parse_insert_line("-1"), Some(-1));
        assert_eq!(parse_insert_line("seven"), None);
    }

    #[test]
    fn test_cli_args_value_may_start_with_dashes() {
        let tokens: Vec<String> = ["--command", "str_replace", "--old_str", "--verbose", "--new_str"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let bag = ArgBag::from_cli_args(&tokens).unwrap();

        assert_eq!(bag.get("command"), Some("str_replace"));
        assert_eq!(bag.get("old_str"), Some("--verbose"));
        assert!(bag.contains("new_str"));
        assert_eq!(bag.get("new_str"), None);
    }

    #[test]
    fn test_cli_args_reject_stray_values() {
        let tokens = vec!["view".to_string()];
        assert!(matches!(
            ArgBag::from_cli_args(&tokens),
            Err(ToolError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_json_args_become_text() {
        let json = serde_json::json!({"command": "view", "view_range": [1, 3], "insert_line": 4, "x": null});
        let bag = ArgBag::from_json(json.as_object().unwrap());

        assert_eq!(bag.get("view_range"), Some("[1,3]"));
        assert_eq!(bag.get("insert_line"), Some("4"));
        assert!(bag.contains("x"));
        assert_eq!(bag.get("x"), None);
    }

    #[test]
    fn test_parse_view_with_malformed_range_falls_back() {
        let (_temp, ctx) = ctx();
        let args = ArgBag::new()
            .with("command", "view")
            .with("path", "a.txt")
            .with("view_range", "lines 1-3");

        match ToolCall::parse("str_replace_editor", &args, &ctx).unwrap() {
            ToolCall::Edit(EditCommand::View { view_range, path }) => {
                assert_eq!(view_range, None);
                assert!(path.is_absolute());
            }
            other => panic!("unexpected call: {:?}", other),
        }
    }

    #[test]
    fn test_parse_missing_path_is_contract_violation() {
        let (_temp, ctx) = ctx();
        let args = ArgBag::new().with("command", "view").with("path", "  ");

        let err = ToolCall::parse("edit", &args, &ctx).unwrap_err();
        assert!(matches!(err, ToolError::MissingArgument { name: "path", .. }));
    }

    #[test]
    fn test_parse_unknown_tool_and_command() {
        let (_temp, ctx) = ctx();
        let args = ArgBag::new().with("command", "delete").with("path", "a.txt");

        assert!(matches!(
            ToolCall::parse("browser", &args, &ctx),
            Err(ToolError::UnknownTool { .. })
        ));
        assert!(matches!(
            ToolCall::parse("str_replace_editor", &args, &ctx),
            Err(ToolError::UnknownCommand { .. })
        ));
    }

    #[test]
    fn test_parse_insert_with_non_numeric_line_is_missing() {
        let (_temp, ctx) = ctx();
        let args = ArgBag::new()
            .with("command", "insert")
            .with("path", "a.txt")
            .with("insert_line", "after the imports")
            .with("new_str", "x");

        let err = ToolCall::parse("str_replace_editor", &args, &ctx).unwrap_err();
        assert!(matches!(err, ToolError::MissingArgument { name: "insert_line", .. }));
    }

    #[test]
    fn test_parse_str_replace_requires_non_empty_old_str() {
        let (_temp, ctx) = ctx();
        let args = ArgBag::new()
            .with("command", "str_replace")
            .with("path", "a.txt")
            .with("old_str", "")
            .with("new_str", "x");

        assert!(matches!(
            ToolCall::parse("str_replace_editor", &args, &ctx),
            Err(ToolError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_parse_new_str_given_without_value_is_empty() {
        let (_temp, ctx) = ctx();
        let mut args = ArgBag::new()
            .with("command", "str_replace")
            .with("path", "a.txt")
            .with("old_str", "debug!");
        args.insert("new_str", None);

        match ToolCall::parse("str_replace_editor", &args, &ctx).unwrap() {
            ToolCall::Edit(EditCommand::StrReplace { new_str, .. }) => assert_eq!(new_str, ""),
            other => panic!("unexpected call: {:?}", other),
        }
    }

    #[test]
    fn test_parse_shell_commands() {
        let args = ArgBag::new().with("command", "ls").with("timeout", "2.5").with("mode", "one-shot");
        assert_eq!(
            parse_shell(&args).unwrap(),
            ShellCommand::Run {
                command: "ls".to_string(),
                timeout: Some(Duration::from_millis(2500)),
                mode: Some(ShellMode::OneShot),
            }
        );

        let mut restart = ArgBag::new();
        restart.insert("restart", None);
        assert_eq!(parse_shell(&restart).unwrap(), ShellCommand::Restart);

        let not_restart = ArgBag::new().with("restart", "false").with("command", "pwd");
        assert!(matches!(parse_shell(&not_restart).unwrap(), ShellCommand::Run { .. }));
    }

    #[test]
    fn test_parse_shell_rejects_blank_command() {
        let args = ArgBag::new().with("command", "   \n");
        assert!(matches!(parse_shell(&args), Err(ToolError::EmptyCommand)));
        assert!(matches!(parse_shell(&ArgBag::new()), Err(ToolError::EmptyCommand)));
    }

    #[test]
    fn test_parse_shell_lenient_timeout_and_mode() {
        let args = ArgBag::new().with("command", "ls").with("timeout", "soon").with("mode", "sideways");
        match parse_shell(&args).unwrap() {
            ShellCommand::Run { timeout, mode, .. } => {
                assert_eq!(timeout, None);
                assert_eq!(mode, None);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
