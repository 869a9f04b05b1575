//! Push pipeline: pull to the server head first, then upload local changes
//! inside one server-side transaction.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use mergin_core::{
    compare_project_files, full_project_name, generate_chunk_ids, ChangesPayload, MerginFile,
    ProjectManifest, PushPayload, SyncError, UPLOAD_CHUNK_SIZE,
};
use mergin_infra::hashing::bytes_checksum;
use tracing::{debug, info};

use crate::sync::engine::SyncEngine;
use crate::sync::transaction::TransactionState;
use crate::sync::{local, metadata, pull, SyncEvent};

pub(crate) async fn run_push(
    engine: &SyncEngine,
    tx: &Arc<TransactionState>,
    namespace: &str,
    name: &str,
) -> Result<(Utf8PathBuf, bool), SyncError> {
    let full_name = full_project_name(namespace, name);
    let mut attempts = 0;

    loop {
        // The internal pull guarantees the baseline matches the server head.
        // Conflict copies it produces are new local files and get uploaded
        // right away, below.
        let pulled = pull::run_pull(engine, tx, namespace, name).await?;
        let project_dir = pulled.project_dir.clone();

        // PrefetchInfo: baseline re-read fresh, local state re-scanned
        let baseline = metadata::read_baseline(&project_dir)?.ok_or_else(|| {
            SyncError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("baseline missing after pull in {project_dir}"),
            ))
        })?;
        let local_files = local::scan_project_files(&project_dir)?;
        let diff = compare_project_files(&baseline.files, &baseline.files, &local_files);
        debug!("{full_name}\n{}", diff.dump());

        if diff.local_added.is_empty()
            && diff.local_updated.is_empty()
            && diff.local_deleted.is_empty()
        {
            engine.emit(SyncEvent::Notify {
                message: format!("Project {full_name} is already up to date"),
            });
            tx.details().version = baseline.version;
            return Ok((project_dir, false));
        }

        let entry_for = |path: &String| local_files.iter().find(|f| &f.path == path);
        let with_chunks = |f: &MerginFile| MerginFile {
            chunks: generate_chunk_ids(f.size),
            ..f.clone()
        };

        let added: Vec<MerginFile> = diff
            .local_added
            .iter()
            .filter_map(entry_for)
            .map(with_chunks)
            .collect();
        let updated: Vec<MerginFile> = diff
            .local_updated
            .iter()
            .filter_map(entry_for)
            .map(with_chunks)
            .collect();
        let removed: Vec<MerginFile> = diff
            .local_deleted
            .iter()
            .filter_map(|p| baseline.file(p).cloned())
            .collect();

        let upload_files: Vec<MerginFile> = added.iter().chain(&updated).cloned().collect();
        let total: u64 = upload_files.iter().map(|f| f.size).sum();
        {
            let mut details = tx.details();
            details.files = upload_files.clone();
            details.diff = diff;
        }

        let payload = PushPayload {
            version: baseline.version,
            changes: ChangesPayload {
                added,
                updated,
                removed,
                renamed: Vec::new(),
            },
        };

        // Starting. A cancel arriving before the token is issued never
        // reaches the server.
        tx.ensure_active()?;
        let token = match engine.api().push_start(namespace, name, &payload).await {
            Ok(token) => token,
            Err(SyncError::VersionMismatch) if attempts == 0 => {
                attempts += 1;
                info!("{full_name}: server moved ahead during push, repeating the pull");
                continue;
            }
            Err(err) => return Err(err),
        };
        tx.details().token = Some(token.clone());

        // Uploading
        tx.set_total_bytes(total);
        engine.emit(SyncEvent::PushFilesStarted);
        engine.emit_status(&full_name, tx.progress());

        for file in &upload_files {
            upload_file(engine, tx, &project_dir, &token, file, &full_name).await?;
        }
        tx.ensure_active()?;

        // Finishing
        let new_version = engine.api().push_finish(&token).await?;
        {
            let mut details = tx.details();
            details.token = None;
            details.version = new_version;
        }

        let manifest = derive_baseline(&pulled.manifest, &payload.changes, new_version);
        metadata::write_baseline(&project_dir, &manifest)?;
        return Ok((project_dir, true));
    }
}

async fn upload_file(
    engine: &SyncEngine,
    tx: &Arc<TransactionState>,
    project_dir: &Utf8Path,
    token: &str,
    file: &MerginFile,
    full_name: &str,
) -> Result<(), SyncError> {
    let path = project_dir.join(&file.path);

    for (index, chunk_id) in file.chunks.iter().enumerate() {
        tx.ensure_active()?;
        let data = read_chunk(&path, index as u64)?;
        let local_checksum = bytes_checksum(&data);
        let size = data.len() as u64;

        let ack = engine.api().push_chunk(token, chunk_id, data).await?;
        if ack.checksum != local_checksum || ack.size != size {
            return Err(SyncError::ChecksumMismatch {
                path: file.path.clone(),
                expected: local_checksum,
                actual: ack.checksum,
            });
        }
        tx.add_transferred(size);
        engine.emit_status(full_name, tx.progress());
    }
    Ok(())
}

/// Read one upload slice. The handle lives only for the duration of the
/// read and is closed before the chunk goes on the wire.
fn read_chunk(path: &Utf8Path, index: u64) -> Result<Vec<u8>, SyncError> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(index * UPLOAD_CHUNK_SIZE))?;
    let mut data = Vec::new();
    let mut limited = file.take(UPLOAD_CHUNK_SIZE);
    limited.read_to_end(&mut data)?;
    Ok(data)
}

/// New baseline after a successful push: the prefetched server manifest with
/// the uploaded delta applied and the server-assigned version.
fn derive_baseline(
    server: &ProjectManifest,
    changes: &ChangesPayload,
    version: i64,
) -> ProjectManifest {
    let mut manifest = server.clone();
    manifest
        .files
        .retain(|f| !changes.removed.iter().any(|r| r.path == f.path));
    for entry in changes.added.iter().chain(&changes.updated) {
        match manifest.files.iter_mut().find(|f| f.path == entry.path) {
            Some(existing) => *existing = entry.clone(),
            None => manifest.files.push(entry.clone()),
        }
    }
    manifest.version = version;
    manifest
}
