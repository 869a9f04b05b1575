//! Files the scanner never reports: editor backups, on-disk lock files
//! and the client's own bookkeeping.

use crate::METADATA_FILE;

/// Extensions excluded from the local file set.
pub const IGNORE_EXTENSIONS: &[&str] = &["gpkg-shm", "gpkg-wal", "qgs~", "qgz~", "pyc", "swap"];

/// Exact file names excluded from the local file set.
pub const IGNORE_FILES: &[&str] = &[METADATA_FILE, ".DS_Store"];

/// Whether a file name is excluded by the ignore policy. The extension is
/// everything after the last `.` and must match an ignore entry exactly.
pub fn is_ignored(file_name: &str) -> bool {
    if IGNORE_FILES.contains(&file_name) {
        return true;
    }
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => {
            IGNORE_EXTENSIONS.iter().any(|ignored| ext == *ignored)
        }
        _ => false,
    }
}
