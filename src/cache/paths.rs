// Cache path utilities.
// Locates the snapshot directory and maps view paths to file names.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;

/// Get the base cache directory (~/.cache/octodash on Linux).
pub fn cache_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "octodash").map(|dirs| dirs.cache_dir().to_path_buf())
}

/// Default directory for view snapshots.
pub fn views_dir() -> Option<PathBuf> {
    cache_dir().map(|dir| dir.join("views"))
}

/// Snapshot file for a view path inside `dir`.
pub fn view_file(dir: &Path, view_path: &str) -> PathBuf {
    let name = sanitize_name(view_path.trim_start_matches('/'));
    let name = if name.is_empty() { "root".to_string() } else { name };
    dir.join(format!("{}.json", name))
}

/// Sanitize a name for use in filesystem paths.
/// Replaces problematic characters with underscores.
fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '&' | '=' => '_',
            _ => c,
        })
        .collect()
}
