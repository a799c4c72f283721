//! Keeps local directory layout out of span fields and error messages.

use std::path::Path;

/// File name only, e.g. `talk_003.flac` for `/home/me/work/000001_talk/chunks/talk_003.flac`.
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}
