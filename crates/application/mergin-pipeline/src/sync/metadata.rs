//! Baseline manifest persistence.
//!
//! The last server manifest applied to a project is kept as `mergin.json`
//! inside the project directory, mirroring the server response schema. A
//! project without one is a first-time clone.

use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use mergin_core::{ProjectManifest, SyncError, METADATA_FILE};

pub fn baseline_path(project_dir: &Utf8Path) -> Utf8PathBuf {
    project_dir.join(METADATA_FILE)
}

/// Read the stored baseline, `None` when the project has never been
/// synchronized.
pub fn read_baseline(project_dir: &Utf8Path) -> Result<Option<ProjectManifest>, SyncError> {
    let path = baseline_path(project_dir);
    if !path.exists() {
        return Ok(None);
    }
    let data = fs::read_to_string(&path)?;
    let manifest = serde_json::from_str(&data).map_err(|e| {
        SyncError::Io(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("corrupt baseline {path}: {e}"),
        ))
    })?;
    Ok(Some(manifest))
}

/// Replace the baseline atomically: write a sibling temp file, then rename.
pub fn write_baseline(project_dir: &Utf8Path, manifest: &ProjectManifest) -> Result<(), SyncError> {
    let path = baseline_path(project_dir);
    let data = serde_json::to_string_pretty(manifest).map_err(|e| {
        SyncError::Io(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("serialize baseline: {e}"),
        ))
    })?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, data)?;
    fs::rename(&tmp, &path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mergin_core::MerginFile;
    use tempfile::tempdir;

    fn manifest(version: i64) -> ProjectManifest {
        ProjectManifest {
            name: "demo".into(),
            namespace: "ns".into(),
            version,
            created: None,
            updated: None,
            creator: Some(1),
            writers: vec![1],
            files: vec![MerginFile {
                path: "a.txt".into(),
                checksum: "abc".into(),
                size: 3,
                chunks: vec![],
            }],
        }
    }

    #[test]
    fn missing_baseline_means_first_clone() {
        let dir = tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        assert!(read_baseline(root).unwrap().is_none());
    }

    #[test]
    fn baseline_round_trip() {
        let dir = tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        write_baseline(root, &manifest(3)).unwrap();
        let loaded = read_baseline(root).unwrap().unwrap();
        assert_eq!(loaded, manifest(3));
    }

    #[test]
    fn write_replaces_previous_baseline() {
        let dir = tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        write_baseline(root, &manifest(3)).unwrap();
        write_baseline(root, &manifest(4)).unwrap();
        assert_eq!(read_baseline(root).unwrap().unwrap().version, 4);
        // no stray temp file left behind
        assert!(!root.join("mergin.tmp").exists());
    }

    #[test]
    fn corrupt_baseline_is_an_error() {
        let dir = tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        fs::write(baseline_path(root), b"{ not json").unwrap();
        assert!(read_baseline(root).is_err());
    }
}
