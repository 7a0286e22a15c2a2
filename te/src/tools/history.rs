//! Edit history store - per-file snapshot stacks backing `undo_edit`
//!
//! The store maps a normalized absolute path to the stack of full prior
//! file states. It is persisted as a single JSON document so undo survives
//! process restarts:
//!
//! ```text
//! {
//!   "version": 1,
//!   "entries": {
//!     "/work/a.txt": [
//!       { "state": { "kind": "absent" }, "taken_at": "..." },
//!       { "state": { "kind": "content", "text": "line1\n" }, "taken_at": "..." }
//!     ]
//!   }
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

const HISTORY_FORMAT_VERSION: u32 = 1;

/// Errors reading or writing the persisted store
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("malformed history file")]
    Serde(#[from] serde_json::Error),

    #[error("unsupported history format version {0}")]
    Version(u32),
}

/// A prior state of a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum FileState {
    /// The file did not exist (recorded by `create`)
    Absent,
    /// Full prior text of the file
    Content(String),
}

/// One entry on a path's stack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub state: FileState,
    pub taken_at: DateTime<Utc>,
}

/// Snapshot stacks keyed by normalized path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditHistory {
    #[serde(default = "default_version")]
    version: u32,

    #[serde(default)]
    entries: BTreeMap<PathBuf, Vec<Snapshot>>,

    /// Oldest snapshots are evicted past this depth; `None` keeps everything
    #[serde(skip)]
    max_depth: Option<usize>,
}

fn default_version() -> u32 {
    HISTORY_FORMAT_VERSION
}

impl Default for EditHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl EditHistory {
    pub fn new() -> Self {
        Self {
            version: HISTORY_FORMAT_VERSION,
            entries: BTreeMap::new(),
            max_depth: None,
        }
    }

    /// Bound every stack to `max_depth` snapshots
    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Push the state a file had right before a mutating write
    pub fn snapshot(&mut self, path: &Path, state: FileState) {
        debug!(?path, "EditHistory::snapshot: called");
        let stack = self.entries.entry(path.to_path_buf()).or_default();
        stack.push(Snapshot {
            state,
            taken_at: Utc::now(),
        });

        if let Some(max_depth) = self.max_depth
            && stack.len() > max_depth
        {
            let evicted = stack.len() - max_depth;
            warn!(?path, evicted, max_depth, "EditHistory::snapshot: evicting oldest snapshots");
            stack.drain(..evicted);
        }
    }

    /// Remove and return the most recent snapshot for `path`
    pub fn pop(&mut self, path: &Path) -> Option<Snapshot> {
        debug!(?path, "EditHistory::pop: called");
        let stack = self.entries.get_mut(path)?;
        let snapshot = stack.pop();
        if stack.is_empty() {
            self.entries.remove(path);
        }
        snapshot
    }

    /// Put a popped snapshot back on top, as it was
    ///
    /// Used when writing a popped state back to disk fails, so the undo can
    /// be retried.
    pub fn reinstate(&mut self, path: &Path, snapshot: Snapshot) {
        debug!(?path, "EditHistory::reinstate: called");
        self.entries.entry(path.to_path_buf()).or_default().push(snapshot);
    }

    /// Discard the most recent snapshot after the write it guarded failed
    pub fn discard_latest(&mut self, path: &Path) {
        debug!(?path, "EditHistory::discard_latest: called");
        let _ = self.pop(path);
    }

    /// Number of snapshots held for `path`
    pub fn depth(&self, path: &Path) -> usize {
        self.entries.get(path).map_or(0, Vec::len)
    }

    /// Tracked paths with their stacks, in path order
    pub fn iter(&self) -> impl Iterator<Item = (&Path, &[Snapshot])> {
        self.entries.iter().map(|(path, stack)| (path.as_path(), stack.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop the stack for one path, returning how many snapshots it held
    pub fn clear(&mut self, path: &Path) -> usize {
        debug!(?path, "EditHistory::clear: called");
        self.entries.remove(path).map_or(0, |stack| stack.len())
    }

    /// Drop every stack
    pub fn clear_all(&mut self) {
        debug!("EditHistory::clear_all: called");
        self.entries.clear();
    }

    /// Load the store from `file`; a missing file is an empty store
    pub async fn load(file: &Path) -> Result<Self, HistoryError> {
        debug!(?file, "EditHistory::load: called");
        let bytes = match tokio::fs::read(file).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("EditHistory::load: no history file yet, starting empty");
                return Ok(Self::new());
            }
            Err(e) => return Err(e.into()),
        };

        let history: Self = serde_json::from_slice(&bytes)?;
        if history.version != HISTORY_FORMAT_VERSION {
            return Err(HistoryError::Version(history.version));
        }

        debug!(paths = history.entries.len(), "EditHistory::load: loaded");
        Ok(history)
    }

    /// Write the store to `file` atomically (temp file, then rename)
    pub async fn save(&self, file: &Path) -> Result<(), HistoryError> {
        debug!(?file, "EditHistory::save: called");
        if let Some(parent) = file.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_vec(self)?;
        let mut tmp = file.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, file).await?;

        info!(?file, paths = self.entries.len(), "Saved edit history");
        Ok(())
    }
}
