//! Built-in tools: the text editor and the shell

mod shell;
mod text_editor;

pub use shell::{ShellMode, ShellSession, ShellTool};
pub use text_editor::TextEditorTool;

/// Notice attached when a response is clipped
pub const TRUNCATED_MESSAGE: &str = "<response clipped><NOTE>To save on context only part of this file has been shown to you. You should retry this tool after you have searched inside the file with `grep -n` in order to find the line numbers of what you are looking for.</NOTE>";

/// Clip `content` to `max_len` characters
///
/// Returns the (possibly shortened) content and, when clipped, the notice to
/// carry on the result's `system` channel.
pub(crate) fn maybe_truncate(content: String, max_len: usize) -> (String, Option<String>) {
    match content.char_indices().nth(max_len) {
        Some((cut, _)) => {
            tracing::debug!(len = content.len(), max_len, "maybe_truncate: clipping response");
            let mut content = content;
            content.truncate(cut);
            (content, Some(TRUNCATED_MESSAGE.to_string()))
        }
        None => (content, None),
    }
}
