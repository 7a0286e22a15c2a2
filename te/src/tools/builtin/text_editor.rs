//! str_replace_editor tool - view, create and edit files with undo

use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::config::EditorConfig;
use crate::tools::args::{EDITOR_COMMANDS, EDITOR_TOOL, EditCommand, ViewRange};
use crate::tools::history::{EditHistory, FileState, Snapshot};
use crate::tools::{Tool, ToolContext, ToolError, ToolResult};

use super::maybe_truncate;

const TAB_WIDTH: usize = 8;

/// What a path currently points at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PathKind {
    Missing,
    File,
    Directory,
}

async fn probe(path: &Path) -> PathKind {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => PathKind::Directory,
        Ok(_) => PathKind::File,
        Err(_) => PathKind::Missing,
    }
}

fn not_found(path: &Path) -> ToolResult {
    ToolResult::error(format!(
        "The path {} does not exist. Please provide a valid path.",
        path.display()
    ))
}

/// Text editor with per-file undo
///
/// Every mutating command snapshots the file's prior state into the
/// context's `EditHistory` right before writing, so `undo_edit` can write it
/// back verbatim.
pub struct TextEditorTool {
    snippet_lines: usize,
    max_response_len: usize,
}

impl TextEditorTool {
    pub fn new(config: &EditorConfig) -> Self {
        debug!(?config, "TextEditorTool::new: called");
        Self {
            snippet_lines: config.snippet_lines,
            max_response_len: config.max_response_len,
        }
    }

    async fn view(&self, path: &Path, view_range: Option<ViewRange>) -> Result<ToolResult, ToolError> {
        debug!(?path, ?view_range, "TextEditorTool::view: called");
        match probe(path).await {
            PathKind::Missing => Ok(not_found(path)),
            PathKind::Directory => {
                if view_range.is_some() {
                    return Err(ToolError::InvalidArgument(
                        "The `view_range` parameter is not allowed when `path` points to a directory.".to_string(),
                    ));
                }
                Ok(self.view_directory(path).await)
            }
            PathKind::File => Ok(self.view_file(path, view_range).await),
        }
    }

    async fn view_directory(&self, path: &Path) -> ToolResult {
        debug!(?path, "TextEditorTool::view_directory: called");
        let root = path.to_path_buf();
        let entries = match tokio::task::spawn_blocking(move || list_directory(&root)).await {
            Ok(entries) => entries,
            Err(e) => return ToolResult::error(format!("Ran into {} while listing {}", e, path.display())),
        };

        let (listing, notice) = maybe_truncate(entries.join("\n"), self.max_response_len);
        ToolResult::success(format!(
            "Here's the files and directories up to 2 levels deep in {}, excluding hidden items:\n{}\n",
            path.display(),
            listing
        ))
        .with_system(notice)
    }

    async fn view_file(&self, path: &Path, view_range: Option<ViewRange>) -> ToolResult {
        let content = match read_file(path).await {
            Ok(content) => content,
            Err(result) => return result,
        };

        let Some(range) = view_range else {
            return self.rendered(&content, &path.display().to_string(), 1, ToolResult::success);
        };

        let lines: Vec<&str> = content.split('\n').collect();
        let n_lines = lines.len() as i64;
        let ViewRange { start, end } = range;

        if start < 1 || start > n_lines {
            debug!(start, n_lines, "TextEditorTool::view_file: start out of range");
            return ToolResult::error(format!(
                "Invalid `view_range`: {}. Its first element `{}` should be within the range of lines of the file: [1, {}]",
                range, start, n_lines
            ));
        }
        if end > n_lines {
            debug!(end, n_lines, "TextEditorTool::view_file: end out of range");
            return ToolResult::error(format!(
                "Invalid `view_range`: {}. Its second element `{}` should be smaller than the number of lines in the file: `{}`",
                range, end, n_lines
            ));
        }
        if end != -1 && end < start {
            debug!(start, end, "TextEditorTool::view_file: end before start");
            return ToolResult::error(format!(
                "Invalid `view_range`: {}. Its second element `{}` should be larger or equal than its first `{}`",
                range, end, start
            ));
        }

        let first = (start - 1) as usize;
        let selected = if end == -1 {
            &lines[first..]
        } else {
            &lines[first..end as usize]
        };
        self.rendered(&selected.join("\n"), &path.display().to_string(), start, ToolResult::success)
    }

    async fn create(&self, path: &Path, file_text: &str, history: &mut EditHistory) -> Result<ToolResult, ToolError> {
        debug!(?path, "TextEditorTool::create: called");
        match probe(path).await {
            PathKind::Directory => return Err(ToolError::NotAFile { path: path.to_path_buf() }),
            PathKind::File => {
                debug!("TextEditorTool::create: refusing to overwrite");
                return Ok(ToolResult::error(format!(
                    "File already exists at: {}. Cannot overwrite files using command `create`.",
                    path.display()
                )));
            }
            PathKind::Missing => {}
        }

        if let Some(parent) = path.parent()
            && let Err(e) = tokio::fs::create_dir_all(parent).await
        {
            return Ok(ToolResult::error(format!(
                "Ran into {} while trying to write to {}",
                e,
                path.display()
            )));
        }

        history.snapshot(path, FileState::Absent);
        if let Err(result) = write_file(path, file_text).await {
            history.discard_latest(path);
            return Ok(result);
        }

        info!(?path, "Created file");
        Ok(ToolResult::success(format!("File created successfully at: {}", path.display())))
    }

    async fn str_replace(
        &self,
        path: &Path,
        old_str: &str,
        new_str: &str,
        history: &mut EditHistory,
    ) -> Result<ToolResult, ToolError> {
        debug!(?path, "TextEditorTool::str_replace: called");
        match probe(path).await {
            PathKind::Directory => return Err(ToolError::NotAFile { path: path.to_path_buf() }),
            PathKind::Missing => return Ok(not_found(path)),
            PathKind::File => {}
        }

        let content = match read_file(path).await {
            Ok(content) => content,
            Err(result) => return Ok(result),
        };

        let occurrences: Vec<usize> = content.match_indices(old_str).map(|(idx, _)| idx).collect();
        debug!(count = occurrences.len(), "TextEditorTool::str_replace: old_str occurrence count");

        let idx = match occurrences.as_slice() {
            [] => {
                return Ok(ToolResult::error(format!(
                    "No replacement was performed, old_str `{}` did not appear verbatim in {}.",
                    old_str,
                    path.display()
                )));
            }
            [idx] => *idx,
            many => {
                let lines: Vec<usize> = many.iter().map(|idx| line_of(&content, *idx) + 1).collect();
                return Ok(ToolResult::error(format!(
                    "No replacement was performed. Multiple occurrences of old_str `{}` in lines {:?}. Please ensure it is unique",
                    old_str, lines
                )));
            }
        };

        let mut new_content = String::with_capacity(content.len() - old_str.len() + new_str.len());
        new_content.push_str(&content[..idx]);
        new_content.push_str(new_str);
        new_content.push_str(&content[idx + old_str.len()..]);

        history.snapshot(path, FileState::Content(content.clone()));
        if let Err(result) = write_file(path, &new_content).await {
            history.discard_latest(path);
            return Ok(result);
        }

        let replacement_line = line_of(&content, idx);
        let start_line = replacement_line.saturating_sub(self.snippet_lines);
        let end_line = replacement_line + self.snippet_lines + new_str.matches('\n').count();
        let snippet: Vec<&str> = new_content
            .split('\n')
            .skip(start_line)
            .take(end_line - start_line + 1)
            .collect();

        info!(?path, line = replacement_line + 1, "Replaced string");
        Ok(self.rendered(
            &snippet.join("\n"),
            &format!("a snippet of {}", path.display()),
            start_line as i64 + 1,
            |rendered| {
                ToolResult::success(format!(
                    "The file {} has been edited. {}Review the changes and make sure they are as expected. Edit the file again if necessary.",
                    path.display(),
                    rendered
                ))
            },
        ))
    }

    async fn insert(
        &self,
        path: &Path,
        insert_line: i64,
        new_str: &str,
        history: &mut EditHistory,
    ) -> Result<ToolResult, ToolError> {
        debug!(?path, insert_line, "TextEditorTool::insert: called");
        match probe(path).await {
            PathKind::Directory => return Err(ToolError::NotAFile { path: path.to_path_buf() }),
            PathKind::Missing => return Ok(not_found(path)),
            PathKind::File => {}
        }

        let content = match read_file(path).await {
            Ok(content) => content,
            Err(result) => return Ok(result),
        };

        let lines: Vec<&str> = content.split('\n').collect();
        let n_lines = lines.len() as i64;
        if insert_line < 0 || insert_line > n_lines {
            debug!(insert_line, n_lines, "TextEditorTool::insert: line out of range");
            return Ok(ToolResult::error(format!(
                "Invalid `insert_line` parameter: {}. It should be within the range of lines of the file: [0, {}]",
                insert_line, n_lines
            )));
        }

        let at = insert_line as usize;
        let new_lines: Vec<&str> = new_str.split('\n').collect();
        let mut updated: Vec<&str> = Vec::with_capacity(lines.len() + new_lines.len());
        updated.extend_from_slice(&lines[..at]);
        updated.extend_from_slice(&new_lines);
        updated.extend_from_slice(&lines[at..]);

        let mut snippet: Vec<&str> = Vec::new();
        snippet.extend_from_slice(&lines[at.saturating_sub(self.snippet_lines)..at]);
        snippet.extend_from_slice(&new_lines);
        snippet.extend_from_slice(&lines[at..(at + self.snippet_lines).min(lines.len())]);

        history.snapshot(path, FileState::Content(content.clone()));
        if let Err(result) = write_file(path, &updated.join("\n")).await {
            history.discard_latest(path);
            return Ok(result);
        }

        info!(?path, insert_line, "Inserted text");
        let first_line = (insert_line - self.snippet_lines as i64 + 1).max(1);
        Ok(self.rendered(&snippet.join("\n"), "a snippet of the edited file", first_line, |rendered| {
            ToolResult::success(format!(
                "The file {} has been edited. {}Review the changes and make sure they are as expected (correct indentation, no duplicate lines, etc). Edit the file again if necessary.",
                path.display(),
                rendered
            ))
        }))
    }

    async fn undo_edit(&self, path: &Path, history: &mut EditHistory) -> Result<ToolResult, ToolError> {
        debug!(?path, depth = history.depth(path), "TextEditorTool::undo_edit: called");
        if probe(path).await == PathKind::Directory {
            return Err(ToolError::NotAFile { path: path.to_path_buf() });
        }

        let Some(snapshot) = history.pop(path) else {
            debug!("TextEditorTool::undo_edit: history empty");
            return Ok(ToolResult::error(format!("No edit history found for {}.", path.display())));
        };

        let Snapshot { state, taken_at } = snapshot;
        match state {
            FileState::Content(text) => {
                if let Some(parent) = path.parent()
                    && let Err(e) = tokio::fs::create_dir_all(parent).await
                {
                    warn!(?parent, %e, "TextEditorTool::undo_edit: cannot recreate parent directory");
                    history.reinstate(path, Snapshot { state: FileState::Content(text), taken_at });
                    return Ok(ToolResult::error(format!(
                        "Ran into {} while trying to create the directory {} for {}",
                        e,
                        parent.display(),
                        path.display()
                    )));
                }
                if let Err(result) = write_file(path, &text).await {
                    history.reinstate(path, Snapshot { state: FileState::Content(text), taken_at });
                    return Ok(result);
                }
                info!(?path, "Undid last edit");
                Ok(self.rendered(&text, &path.display().to_string(), 1, |rendered| {
                    ToolResult::success(format!(
                        "Last edit to {} undone successfully. {}",
                        path.display(),
                        rendered
                    ))
                }))
            }
            FileState::Absent => match tokio::fs::remove_file(path).await {
                Ok(()) => {
                    info!(?path, "Undid file creation");
                    Ok(ToolResult::success(format!(
                        "Last edit to {} undone successfully. The file did not exist before that edit and has been removed.",
                        path.display()
                    )))
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ToolResult::success(format!(
                    "Last edit to {} undone successfully. The file did not exist before that edit and is already gone.",
                    path.display()
                ))),
                Err(e) => {
                    history.reinstate(
                        path,
                        Snapshot {
                            state: FileState::Absent,
                            taken_at,
                        },
                    );
                    Ok(ToolResult::error(format!(
                        "Ran into {} while trying to remove {}",
                        e,
                        path.display()
                    )))
                }
            },
        }
    }

    /// `cat -n` style rendering, truncated to the response limit
    ///
    /// `wrap` receives the rendered block and builds the final result, which
    /// then gets the truncation notice attached.
    fn rendered(
        &self,
        content: &str,
        descriptor: &str,
        init_line: i64,
        wrap: impl FnOnce(String) -> ToolResult,
    ) -> ToolResult {
        let (content, notice) = maybe_truncate(content.to_string(), self.max_response_len);
        let numbered: Vec<String> = content
            .split('\n')
            .enumerate()
            .map(|(i, line)| format!("{:6}\t{}", i as i64 + init_line, expand_tabs(line)))
            .collect();
        let block = format!(
            "Here's the result of running `cat -n` on {}:\n{}\n",
            descriptor,
            numbered.join("\n")
        );
        wrap(block).with_system(notice)
    }
}

impl Default for TextEditorTool {
    fn default() -> Self {
        Self::new(&EditorConfig::default())
    }
}

#[async_trait]
impl Tool for TextEditorTool {
    type Command = EditCommand;

    fn name(&self) -> &'static str {
        EDITOR_TOOL
    }

    fn description(&self) -> &'static str {
        "Custom editing tool for viewing, creating and editing files\n\
         * State is persistent across command calls and discussions with the user\n\
         * If `path` is a file, `view` displays the result of applying `cat -n`. If `path` is a directory, `view` lists non-hidden files and directories up to 2 levels deep\n\
         * The `create` command cannot be used if the specified `path` already exists as a file\n\
         * If a `command` generates a long output, it will be truncated and marked with `<response clipped>`\n\
         * The `undo_edit` command will revert the last edit made to the file at `path`\n\
         Notes for using the `str_replace` command:\n\
         * The `old_str` parameter should match EXACTLY one or more consecutive lines from the original file. Be mindful of whitespaces!\n\
         * If the `old_str` parameter is not unique in the file, the replacement will not be performed. Make sure to include enough context in `old_str` to make it unique\n\
         * The `new_str` parameter should contain the edited lines that should replace the `old_str`"
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "enum": EDITOR_COMMANDS,
                    "description": "The commands to run. Allowed options are: `view`, `create`, `str_replace`, `insert`, `undo_edit`."
                },
                "path": {
                    "type": "string",
                    "description": "Path to file or directory, absolute or relative to the working directory"
                },
                "file_text": {
                    "type": "string",
                    "description": "Required parameter of `create` command, with the content of the file to be created."
                },
                "old_str": {
                    "type": "string",
                    "description": "Required parameter of `str_replace` command containing the string in `path` to replace."
                },
                "new_str": {
                    "type": "string",
                    "description": "Required parameter of `str_replace` command containing the new string. Required parameter of `insert` command containing the string to insert."
                },
                "insert_line": {
                    "type": "integer",
                    "description": "Required parameter of `insert` command. The `new_str` will be inserted AFTER the line `insert_line` of `path`."
                },
                "view_range": {
                    "type": "array",
                    "items": {"type": "integer"},
                    "description": "Optional parameter of `view` command when `path` points to a file. If none is given, the full file is shown. If provided, the file will be shown in the indicated line number range, e.g. [11, 12] will show lines 11 and 12. Indexing at 1 to start. Setting `[start_line, -1]` shows all lines from `start_line` to the end of the file."
                }
            },
            "required": ["command", "path"]
        })
    }

    async fn execute(&mut self, command: EditCommand, ctx: &mut ToolContext) -> Result<ToolResult, ToolError> {
        debug!(command = %command.name(), path = ?command.path(), "TextEditorTool::execute: called");
        match command {
            EditCommand::View { path, view_range } => self.view(&path, view_range).await,
            EditCommand::Create { path, file_text } => self.create(&path, &file_text, &mut ctx.history).await,
            EditCommand::StrReplace { path, old_str, new_str } => {
                self.str_replace(&path, &old_str, &new_str, &mut ctx.history).await
            }
            EditCommand::Insert {
                path,
                insert_line,
                new_str,
            } => self.insert(&path, insert_line, &new_str, &mut ctx.history).await,
            EditCommand::UndoEdit { path } => self.undo_edit(&path, &mut ctx.history).await,
        }
    }
}

async fn read_file(path: &Path) -> Result<String, ToolResult> {
    tokio::fs::read_to_string(path).await.map_err(|e| {
        debug!(%e, "read_file: failed");
        ToolResult::error(format!("Ran into {} while trying to read {}", e, path.display()))
    })
}

async fn write_file(path: &Path, content: &str) -> Result<(), ToolResult> {
    tokio::fs::write(path, content).await.map_err(|e| {
        debug!(%e, "write_file: failed");
        ToolResult::error(format!("Ran into {} while trying to write to {}", e, path.display()))
    })
}

/// Zero-based line of byte offset `idx`
fn line_of(content: &str, idx: usize) -> usize {
    content[..idx].matches('\n').count()
}

fn expand_tabs(line: &str) -> String {
    if !line.contains('\t') {
        return line.to_string();
    }
    let mut out = String::with_capacity(line.len() + TAB_WIDTH);
    let mut column = 0;
    for c in line.chars() {
        if c == '\t' {
            let pad = TAB_WIDTH - column % TAB_WIDTH;
            out.extend(std::iter::repeat_n(' ', pad));
            column += pad;
        } else {
            out.push(c);
            column += 1;
        }
    }
    out
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_str().is_some_and(|name| name.starts_with('.'))
}

/// Non-hidden entries up to two levels below `root`, root included
fn list_directory(root: &Path) -> Vec<String> {
    WalkDir::new(root)
        .max_depth(2)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry))
        .filter_map(Result::ok)
        .map(|entry| entry.path().display().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::{TempDir, tempdir};

    fn setup(filename: &str, content: &str) -> (TempDir, ToolContext, std::path::PathBuf) {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf());
        let path = ctx.normalize_path(Path::new(filename));
        fs::write(&path, content).unwrap();
        (temp, ctx, path)
    }

    fn output(result: &ToolResult) -> &str {
        result.output.as_deref().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_view_whole_file_numbers_lines() {
        let (_temp, mut ctx, path) = setup("a.txt", "alpha\n\tbeta");
        let mut tool = TextEditorTool::default();

        let result = tool
            .execute(EditCommand::View { path, view_range: None }, &mut ctx)
            .await
            .unwrap();

        assert!(result.is_success());
        assert!(output(&result).contains("Here's the result of running `cat -n`"));
        assert!(output(&result).contains("     1\talpha\n"));
        assert!(output(&result).contains("     2\t        beta\n"));
    }

    #[tokio::test]
    async fn test_view_range_to_end() {
        let (_temp, mut ctx, path) = setup("a.txt", "1\n2\n3\n4");
        let mut tool = TextEditorTool::default();

        let result = tool
            .execute(
                EditCommand::View {
                    path,
                    view_range: Some(ViewRange { start: 3, end: -1 }),
                },
                &mut ctx,
            )
            .await
            .unwrap();

        assert!(result.is_success());
        assert!(output(&result).ends_with("     3\t3\n     4\t4\n"));
        assert!(!output(&result).contains("     2\t2"));
    }

    #[tokio::test]
    async fn test_view_range_errors_are_operational() {
        let (_temp, mut ctx, path) = setup("a.txt", "1\n2\n3");
        let mut tool = TextEditorTool::default();

        for (start, end, expected) in [(4, -1, "first element"), (0, 2, "first element"), (1, 9, "second element"), (3, 2, "larger or equal")] {
            let result = tool
                .execute(
                    EditCommand::View {
                        path: path.clone(),
                        view_range: Some(ViewRange { start, end }),
                    },
                    &mut ctx,
                )
                .await
                .unwrap();
            assert!(!result.is_success(), "range [{}, {}] should fail", start, end);
            assert!(result.error.as_deref().unwrap().contains(expected));
        }
    }

    #[tokio::test]
    async fn test_view_missing_path_is_operational() {
        let temp = tempdir().unwrap();
        let mut ctx = ToolContext::new(temp.path().to_path_buf());
        let mut tool = TextEditorTool::default();

        let result = tool
            .execute(
                EditCommand::View {
                    path: temp.path().join("nope.txt"),
                    view_range: None,
                },
                &mut ctx,
            )
            .await
            .unwrap();

        assert!(result.error.as_deref().unwrap().contains("does not exist"));
    }

    #[tokio::test]
    async fn test_view_directory_skips_hidden_entries() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("src/nested/deep")).unwrap();
        fs::write(temp.path().join("src/lib.rs"), "").unwrap();
        fs::write(temp.path().join("src/nested/deep/far.rs"), "").unwrap();
        fs::create_dir(temp.path().join(".git")).unwrap();
        fs::write(temp.path().join(".git/config"), "").unwrap();
        let mut ctx = ToolContext::new(temp.path().to_path_buf());
        let mut tool = TextEditorTool::default();

        let result = tool
            .execute(
                EditCommand::View {
                    path: temp.path().to_path_buf(),
                    view_range: None,
                },
                &mut ctx,
            )
            .await
            .unwrap();

        let text = output(&result);
        assert!(text.contains("up to 2 levels deep"));
        assert!(text.contains("lib.rs"));
        assert!(text.contains("nested"));
        assert!(!text.contains("far.rs"));
        assert!(!text.contains(".git"));
    }

    #[tokio::test]
    async fn test_view_range_on_directory_is_rejected() {
        let temp = tempdir().unwrap();
        let mut ctx = ToolContext::new(temp.path().to_path_buf());
        let mut tool = TextEditorTool::default();

        let result = tool
            .execute(
                EditCommand::View {
                    path: temp.path().to_path_buf(),
                    view_range: Some(ViewRange { start: 1, end: 2 }),
                },
                &mut ctx,
            )
            .await;

        assert!(matches!(result, Err(ToolError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_create_refuses_to_overwrite() {
        let (_temp, mut ctx, path) = setup("a.txt", "original");
        let mut tool = TextEditorTool::default();

        let result = tool
            .execute(
                EditCommand::Create {
                    path: path.clone(),
                    file_text: "clobbered".to_string(),
                },
                &mut ctx,
            )
            .await
            .unwrap();

        assert!(result.error.as_deref().unwrap().contains("Cannot overwrite"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "original");
        assert_eq!(ctx.history.depth(&path), 0);
    }

    #[tokio::test]
    async fn test_create_then_undo_removes_file() {
        let temp = tempdir().unwrap();
        let mut ctx = ToolContext::new(temp.path().to_path_buf());
        let path = ctx.normalize_path(Path::new("sub/dir/new.txt"));
        let mut tool = TextEditorTool::default();

        let result = tool
            .execute(
                EditCommand::Create {
                    path: path.clone(),
                    file_text: "hello\n".to_string(),
                },
                &mut ctx,
            )
            .await
            .unwrap();
        assert!(output(&result).starts_with("File created successfully at:"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello\n");

        let result = tool
            .execute(EditCommand::UndoEdit { path: path.clone() }, &mut ctx)
            .await
            .unwrap();
        assert!(result.is_success());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_str_replace_unique() {
        let (_temp, mut ctx, path) = setup("a.txt", "fn main() {\n    println!(\"hi\");\n}\n");
        let mut tool = TextEditorTool::default();

        let result = tool
            .execute(
                EditCommand::StrReplace {
                    path: path.clone(),
                    old_str: "\"hi\"".to_string(),
                    new_str: "\"bye\"".to_string(),
                },
                &mut ctx,
            )
            .await
            .unwrap();

        assert!(result.is_success());
        assert!(output(&result).contains("has been edited"));
        assert!(output(&result).contains("     2\t    println!(\"bye\");"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "fn main() {\n    println!(\"bye\");\n}\n");
        assert_eq!(ctx.history.depth(&path), 1);
    }

    #[tokio::test]
    async fn test_str_replace_not_found_does_not_write() {
        let (_temp, mut ctx, path) = setup("a.txt", "hello world");
        let mut tool = TextEditorTool::default();

        let result = tool
            .execute(
                EditCommand::StrReplace {
                    path: path.clone(),
                    old_str: "notfound".to_string(),
                    new_str: "x".to_string(),
                },
                &mut ctx,
            )
            .await
            .unwrap();

        assert!(result.error.as_deref().unwrap().contains("did not appear verbatim"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello world");
        assert_eq!(ctx.history.depth(&path), 0);
    }

    #[tokio::test]
    async fn test_str_replace_ambiguous_lists_lines() {
        let (_temp, mut ctx, path) = setup("a.txt", "hello\nworld\nhello hello\n");
        let mut tool = TextEditorTool::default();

        let result = tool
            .execute(
                EditCommand::StrReplace {
                    path: path.clone(),
                    old_str: "hello".to_string(),
                    new_str: "hi".to_string(),
                },
                &mut ctx,
            )
            .await
            .unwrap();

        let error = result.error.as_deref().unwrap();
        assert!(error.contains("Multiple occurrences"));
        assert!(error.contains("[1, 3, 3]"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello\nworld\nhello hello\n");
        assert_eq!(ctx.history.depth(&path), 0);
    }

    #[tokio::test]
    async fn test_str_replace_counts_non_overlapping() {
        let (_temp, mut ctx, path) = setup("a.txt", "aaa");
        let mut tool = TextEditorTool::default();

        // "aa" occurs once non-overlapping in "aaa"
        let result = tool
            .execute(
                EditCommand::StrReplace {
                    path: path.clone(),
                    old_str: "aa".to_string(),
                    new_str: "b".to_string(),
                },
                &mut ctx,
            )
            .await
            .unwrap();

        assert!(result.is_success());
        assert_eq!(fs::read_to_string(&path).unwrap(), "ba");
    }

    #[tokio::test]
    async fn test_str_replace_on_directory_is_rejected() {
        let temp = tempdir().unwrap();
        let mut ctx = ToolContext::new(temp.path().to_path_buf());
        let mut tool = TextEditorTool::default();

        let result = tool
            .execute(
                EditCommand::StrReplace {
                    path: temp.path().to_path_buf(),
                    old_str: "a".to_string(),
                    new_str: "b".to_string(),
                },
                &mut ctx,
            )
            .await;

        assert!(matches!(result, Err(ToolError::NotAFile { .. })));
    }

    #[tokio::test]
    async fn test_insert_after_line() {
        let (_temp, mut ctx, path) = setup("a.txt", "line1\nline2\n");
        let mut tool = TextEditorTool::default();

        let result = tool
            .execute(
                EditCommand::Insert {
                    path: path.clone(),
                    insert_line: 1,
                    new_str: "inserted".to_string(),
                },
                &mut ctx,
            )
            .await
            .unwrap();

        assert!(result.is_success());
        assert_eq!(fs::read_to_string(&path).unwrap(), "line1\ninserted\nline2\n");
        assert!(output(&result).contains("     2\tinserted"));
    }

    #[tokio::test]
    async fn test_insert_at_zero_goes_first() {
        let (_temp, mut ctx, path) = setup("a.txt", "body");
        let mut tool = TextEditorTool::default();

        tool.execute(
            EditCommand::Insert {
                path: path.clone(),
                insert_line: 0,
                new_str: "header".to_string(),
            },
            &mut ctx,
        )
        .await
        .unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "header\nbody");
    }

    #[tokio::test]
    async fn test_insert_out_of_range() {
        let (_temp, mut ctx, path) = setup("a.txt", "one\ntwo");
        let mut tool = TextEditorTool::default();

        for insert_line in [-1, 3] {
            let result = tool
                .execute(
                    EditCommand::Insert {
                        path: path.clone(),
                        insert_line,
                        new_str: "x".to_string(),
                    },
                    &mut ctx,
                )
                .await
                .unwrap();
            assert!(result.error.as_deref().unwrap().contains("[0, 2]"));
        }
        assert_eq!(fs::read_to_string(&path).unwrap(), "one\ntwo");
        assert_eq!(ctx.history.depth(&path), 0);
    }

    #[tokio::test]
    async fn test_undo_restores_verbatim_and_then_reports_empty() {
        let (_temp, mut ctx, path) = setup("a.txt", "a\tb\r\nc\n");
        let mut tool = TextEditorTool::default();

        tool.execute(
            EditCommand::StrReplace {
                path: path.clone(),
                old_str: "c".to_string(),
                new_str: "C".to_string(),
            },
            &mut ctx,
        )
        .await
        .unwrap();

        let result = tool
            .execute(EditCommand::UndoEdit { path: path.clone() }, &mut ctx)
            .await
            .unwrap();
        assert!(output(&result).starts_with("Last edit to"));
        assert_eq!(fs::read(&path).unwrap(), b"a\tb\r\nc\n");

        let result = tool
            .execute(EditCommand::UndoEdit { path: path.clone() }, &mut ctx)
            .await
            .unwrap();
        assert!(result.error.as_deref().unwrap().contains("No edit history"));
        assert_eq!(fs::read(&path).unwrap(), b"a\tb\r\nc\n");
    }

    #[tokio::test]
    async fn test_undo_keeps_snapshot_when_parent_cannot_be_recreated() {
        let temp = tempdir().unwrap();
        let mut ctx = ToolContext::new(temp.path().to_path_buf());
        fs::create_dir(temp.path().join("gone")).unwrap();
        let path = ctx.normalize_path(Path::new("gone/b.txt"));
        fs::write(&path, "before").unwrap();
        let mut tool = TextEditorTool::default();

        tool.execute(
            EditCommand::StrReplace {
                path: path.clone(),
                old_str: "before".to_string(),
                new_str: "after".to_string(),
            },
            &mut ctx,
        )
        .await
        .unwrap();
        fs::remove_dir_all(temp.path().join("gone")).unwrap();
        fs::write(temp.path().join("gone"), "a file now").unwrap();

        let result = tool
            .execute(EditCommand::UndoEdit { path: path.clone() }, &mut ctx)
            .await
            .unwrap();

        assert!(!result.is_success());
        assert!(result.error.as_deref().unwrap().contains("while trying to create the directory"));
        assert_eq!(ctx.history.depth(&path), 1);
    }

    #[tokio::test]
    async fn test_long_view_is_truncated_with_notice() {
        let long = "x".repeat(100);
        let (_temp, mut ctx, path) = setup("a.txt", &long);
        let mut tool = TextEditorTool::new(&EditorConfig {
            max_response_len: 10,
            ..Default::default()
        });

        let result = tool
            .execute(EditCommand::View { path, view_range: None }, &mut ctx)
            .await
            .unwrap();

        assert!(result.is_success());
        assert!(output(&result).contains(&"x".repeat(10)));
        assert!(!output(&result).contains(&"x".repeat(11)));
        assert!(result.system.as_deref().unwrap().contains("<response clipped>"));
    }

    #[test]
    fn test_expand_tabs_aligns_to_stops() {
        assert_eq!(expand_tabs("\tx"), "        x");
        assert_eq!(expand_tabs("ab\tc"), "ab      c");
        assert_eq!(expand_tabs("plain"), "plain");
    }
}
