//! ToolContext - execution context for tools

use std::path::{Component, Path, PathBuf};
use tracing::debug;

use super::history::EditHistory;

/// Execution context shared by every tool call of one dispatcher
///
/// Holds the working directory relative paths resolve against, and the edit
/// history store. The history is owned here and nowhere else; the editor
/// borrows it for the duration of a single command.
#[derive(Debug)]
pub struct ToolContext {
    /// Directory relative paths and shell commands start from
    pub cwd: PathBuf,

    /// Snapshot stacks backing `undo_edit`
    pub history: EditHistory,
}

impl ToolContext {
    /// Create a new tool context with an empty history
    pub fn new(cwd: PathBuf) -> Self {
        debug!(?cwd, "ToolContext::new: called");
        Self {
            cwd,
            history: EditHistory::new(),
        }
    }

    /// Builder method to start from an existing history
    pub fn with_history(mut self, history: EditHistory) -> Self {
        self.history = history;
        self
    }

    /// Normalize a path to the absolute form used as a history key
    ///
    /// Relative paths are joined onto `cwd`, `.` and `..` are removed
    /// lexically, and symlinks in the longest existing prefix are resolved so
    /// that two spellings of one file share a key before and after it exists.
    pub fn normalize_path(&self, path: &Path) -> PathBuf {
        debug!(?path, "ToolContext::normalize_path: called");
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            debug!("ToolContext::normalize_path: path is relative, joining with cwd");
            self.cwd.join(path)
        };
        let lexical = lexical_normalize(&joined);

        if let Ok(canonical) = lexical.canonicalize() {
            debug!("ToolContext::normalize_path: path exists, canonicalized");
            return canonical;
        }

        // Not there yet (create): canonicalize the nearest existing ancestor
        // and re-append the missing components
        let mut missing = Vec::new();
        let mut ancestor = lexical.as_path();
        while let (Some(parent), Some(name)) = (ancestor.parent(), ancestor.file_name()) {
            missing.push(name.to_os_string());
            ancestor = parent;
            if let Ok(canonical) = ancestor.canonicalize() {
                debug!(depth = missing.len(), "ToolContext::normalize_path: canonicalized existing ancestor");
                return missing.iter().rev().fold(canonical, |acc, name| acc.join(name));
            }
        }
        lexical
    }
}

/// Remove `.` and resolve `..` without touching the filesystem
fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // Never pop past the root
                if !matches!(out.components().next_back(), Some(Component::RootDir | Component::Prefix(_)) | None) {
                    out.pop();
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
