//! Pull pipeline: fetch the server manifest, download changed files chunk by
//! chunk into a temp area, reconcile with local edits and atomically promote.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use mergin_core::{
    compare_project_files, full_project_name, path_utils::ProjectPath, MerginFile,
    ProjectManifest, SyncError, TEMP_FOLDER,
};
use mergin_infra::hashing::file_checksum;
use tracing::debug;

use crate::io_utils;
use crate::sync::engine::SyncEngine;
use crate::sync::transaction::TransactionState;
use crate::sync::{local, metadata, SyncEvent};

pub(crate) struct PullOutcome {
    pub project_dir: Utf8PathBuf,
    /// The manifest that became the new baseline.
    pub manifest: ProjectManifest,
}

fn unsafe_path(path: &str) -> SyncError {
    SyncError::Io(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        format!("unsafe path in server manifest: {path}"),
    ))
}

pub(crate) async fn run_pull(
    engine: &SyncEngine,
    tx: &Arc<TransactionState>,
    namespace: &str,
    name: &str,
) -> Result<PullOutcome, SyncError> {
    let full_name = full_project_name(namespace, name);

    // FetchingInfo. The baseline is read fresh at the start of every
    // transaction so external edits to the directory are never missed.
    let existing_dir = local::find_project_dir(engine.data_dir(), &full_name);
    let baseline = match &existing_dir {
        Some(dir) => metadata::read_baseline(dir)?,
        None => None,
    };

    let since = baseline.as_ref().map(|b| b.version).filter(|v| *v >= 0);
    let remote = match engine.api().project_info(namespace, name, since).await {
        Ok(remote) => remote,
        Err(SyncError::NotFound(project)) if baseline.is_some() => {
            engine.emit(SyncEvent::Notify {
                message: format!("Project {full_name} no longer exists on the server"),
            });
            return Err(SyncError::NotFound(project));
        }
        Err(err) => return Err(err),
    };
    tx.ensure_active()?;

    let first_time = baseline.is_none();
    let project_dir = match existing_dir {
        Some(dir) => dir,
        None => {
            let dir = io_utils::unique_directory(&engine.data_dir().join(name));
            fs::create_dir_all(&dir)?;
            dir
        }
    };
    {
        let mut details = tx.details();
        details.project_dir = Some(project_dir.clone());
        details.first_time = first_time;
        details.version = remote.version;
    }

    let local_files = if first_time {
        Vec::new()
    } else {
        local::scan_project_files(&project_dir)?
    };

    let baseline_files = baseline.map(|b| b.files).unwrap_or_default();
    let diff = compare_project_files(&baseline_files, &remote.files, &local_files);
    debug!("{full_name}\n{}", diff.dump());

    let download_paths = diff.files_to_download();
    // files are processed in server manifest order
    let to_download: Vec<MerginFile> = remote
        .files
        .iter()
        .filter(|f| download_paths.contains(&f.path))
        .cloned()
        .collect();
    let total: u64 = to_download.iter().map(|f| f.size).sum();

    let temp_dir = project_dir.join(TEMP_FOLDER);
    {
        let mut details = tx.details();
        details.temp_dir = Some(temp_dir.clone());
        details.files = to_download.clone();
        details.diff = diff.clone();
    }
    tx.set_total_bytes(total);
    engine.emit_status(&full_name, tx.progress());

    // Downloading
    if !to_download.is_empty() {
        engine.emit(SyncEvent::PullFilesStarted);
        if temp_dir.exists() {
            fs::remove_dir_all(&temp_dir)?;
        }
        fs::create_dir_all(&temp_dir)?;

        for file in &to_download {
            if !ProjectPath::verify_safe(&file.path) {
                return Err(unsafe_path(&file.path));
            }
            download_file(
                engine,
                tx,
                namespace,
                name,
                remote.version,
                file,
                &temp_dir,
                &full_name,
            )
            .await?;
        }
    }

    tx.ensure_active()?;

    // Finalizing
    let mut conflict_copies = Vec::new();

    for path in &diff.remote_deleted {
        if !ProjectPath::verify_safe(path) {
            return Err(unsafe_path(path));
        }
        let target = project_dir.join(path);
        if target.exists() {
            fs::remove_file(&target)?;
        }
    }

    // the server outcome wins, but the user's bytes survive as a sibling copy
    for path in diff
        .conflict_remote_deleted_local_updated
        .iter()
        .chain(&diff.conflict_remote_updated_local_deleted)
    {
        let target = project_dir.join(path);
        if target.exists() {
            let copy = io_utils::unique_conflict_path(&target);
            fs::copy(&target, &copy)?;
            conflict_copies.push(copy);
        }
    }
    for path in &diff.conflict_remote_deleted_local_updated {
        let target = project_dir.join(path);
        if target.exists() {
            fs::remove_file(&target)?;
        }
    }

    // both sides edited: move the local version aside before overlaying
    for path in diff
        .conflict_remote_updated_local_updated
        .iter()
        .chain(&diff.conflict_remote_added_local_added)
    {
        let target = project_dir.join(path);
        if target.exists() {
            let copy = io_utils::unique_conflict_path(&target);
            fs::rename(&target, &copy)?;
            conflict_copies.push(copy);
        }
    }

    for file in &to_download {
        let staged = temp_dir.join(&file.path);
        let target = project_dir.join(&file.path);
        io_utils::move_file(&staged, &target)?;
    }

    metadata::write_baseline(&project_dir, &remote)?;
    if temp_dir.exists() {
        let _ = fs::remove_dir_all(&temp_dir);
    }
    // the clone is complete once a baseline exists on disk
    tx.details().first_time = false;

    if !conflict_copies.is_empty() {
        engine.emit(SyncEvent::Notify {
            message: format!(
                "Conflicts in {full_name}: local changes were kept as conflict copies"
            ),
        });
    }

    let changed = !to_download.is_empty()
        || !diff.remote_deleted.is_empty()
        || !conflict_copies.is_empty();
    if changed {
        engine.emit(SyncEvent::ReloadProject {
            project_dir: project_dir.clone(),
        });
    }

    Ok(PullOutcome {
        project_dir,
        manifest: remote,
    })
}

#[allow(clippy::too_many_arguments)]
async fn download_file(
    engine: &SyncEngine,
    tx: &Arc<TransactionState>,
    namespace: &str,
    name: &str,
    version: i64,
    file: &MerginFile,
    temp_dir: &Utf8Path,
    full_name: &str,
) -> Result<(), SyncError> {
    let staged = temp_dir.join(&file.path);
    if let Some(parent) = staged.parent() {
        fs::create_dir_all(parent)?;
    }

    if file.size == 0 {
        fs::write(&staged, b"")?;
        return Ok(());
    }

    for chunk_no in 0..file.chunk_count() {
        tx.ensure_active()?;
        let bytes = engine
            .api()
            .download_chunk(namespace, name, &file.path, version, chunk_no)
            .await?;
        // one open handle per in-flight chunk, closed before suspending
        let mut handle = OpenOptions::new().create(true).append(true).open(&staged)?;
        handle.write_all(&bytes)?;
        drop(handle);
        tx.add_transferred(bytes.len() as u64);
        engine.emit_status(full_name, tx.progress());
    }

    let actual = file_checksum(&staged)?;
    if actual != file.checksum {
        return Err(SyncError::ChecksumMismatch {
            path: file.path.clone(),
            expected: file.checksum.clone(),
            actual,
        });
    }
    Ok(())
}
