//! Local project directory scanning.

use camino::{Utf8Path, Utf8PathBuf};
use mergin_core::{ignore, path_utils::ProjectPath, MerginFile, SyncError, TEMP_FOLDER};
use mergin_infra::hashing::file_checksum;
use walkdir::WalkDir;

use crate::sync::metadata;

/// Enumerate the live file set of a project directory.
///
/// Skips the transient `.temp` subtree and everything the ignore policy
/// excludes, hashes each remaining file streaming, and reports forward-slash
/// relative paths. Ordering is unspecified; callers key by path.
pub fn scan_project_files(project_dir: &Utf8Path) -> Result<Vec<MerginFile>, SyncError> {
    let mut files = Vec::new();

    let walker = WalkDir::new(project_dir)
        .into_iter()
        .filter_entry(|e| e.file_name() != TEMP_FOLDER);

    for entry in walker {
        let entry = entry.map_err(|e| SyncError::Io(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = Utf8PathBuf::from_path_buf(entry.into_path()).map_err(|p| {
            SyncError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("non-utf8 path in project directory: {}", p.display()),
            ))
        })?;

        let file_name = path.file_name().unwrap_or_default();
        if ignore::is_ignored(file_name) {
            continue;
        }

        let rel = ProjectPath::normalize(
            path.strip_prefix(project_dir)
                .expect("walked path is under the project root")
                .as_str(),
        );

        let size = path.metadata()?.len();
        let checksum = file_checksum(&path)?;
        files.push(MerginFile {
            path: rel,
            checksum,
            size,
            chunks: Vec::new(),
        });
    }

    Ok(files)
}

/// Locate the local directory of an already-synchronized project by its
/// full name, looking at the baseline of every subdirectory of the data dir.
pub fn find_project_dir(data_dir: &Utf8Path, full_name: &str) -> Option<Utf8PathBuf> {
    let entries = std::fs::read_dir(data_dir).ok()?;
    for entry in entries.flatten() {
        let Ok(path) = Utf8PathBuf::from_path_buf(entry.path()) else {
            continue;
        };
        if !path.is_dir() {
            continue;
        }
        if let Ok(Some(baseline)) = metadata::read_baseline(&path) {
            if baseline.full_name() == full_name {
                return Some(path);
            }
        }
    }
    None
}
