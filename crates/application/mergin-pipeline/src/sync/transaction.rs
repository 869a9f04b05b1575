//! Per-project transaction bookkeeping.
//!
//! At most one pull or push may be in flight for a project at any time. The
//! pipelines own the heavy state; the manager enforces exclusivity, answers
//! progress queries and carries the cancellation flag that pipelines observe
//! at their suspension points.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use camino::Utf8PathBuf;
use mergin_core::{MerginFile, ProjectDiff, SyncError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionKind {
    Pull,
    Push,
}

/// Mutable details the owning pipeline fills in as it learns them.
#[derive(Debug, Default)]
pub struct TransactionDetails {
    /// Server-issued upload token; push only. Held by exactly one
    /// transaction until finished or cancelled.
    pub token: Option<String>,
    /// Files queued for transfer, in manifest order.
    pub files: Vec<MerginFile>,
    pub project_dir: Option<Utf8PathBuf>,
    pub temp_dir: Option<Utf8PathBuf>,
    /// Version being pulled, or the version a push landed at.
    pub version: i64,
    /// Whether this pull is creating the project directory from scratch;
    /// on failure the whole directory is removed.
    pub first_time: bool,
    pub diff: ProjectDiff,
}

#[derive(Debug)]
pub struct TransactionState {
    pub kind: TransactionKind,
    pub project_full_name: String,
    total_bytes: AtomicU64,
    transferred_bytes: AtomicU64,
    cancelled: AtomicBool,
    details: Mutex<TransactionDetails>,
}

impl TransactionState {
    fn new(kind: TransactionKind, project_full_name: String) -> Self {
        Self {
            kind,
            project_full_name,
            total_bytes: AtomicU64::new(0),
            transferred_bytes: AtomicU64::new(0),
            cancelled: AtomicBool::new(false),
            details: Mutex::new(TransactionDetails {
                version: -1,
                ..TransactionDetails::default()
            }),
        }
    }

    pub fn details(&self) -> MutexGuard<'_, TransactionDetails> {
        self.details.lock().expect("transaction details poisoned")
    }

    /// Start a transfer phase with fresh byte counters.
    pub fn set_total_bytes(&self, total: u64) {
        self.total_bytes.store(total, Ordering::Relaxed);
        self.transferred_bytes.store(0, Ordering::Relaxed);
    }

    pub fn add_transferred(&self, bytes: u64) {
        self.transferred_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Transfer progress in `[0, 1]`; monotonic within a phase.
    pub fn progress(&self) -> f64 {
        let total = self.total_bytes.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        let transferred = self.transferred_bytes.load(Ordering::Relaxed);
        (transferred as f64 / total as f64).min(1.0)
    }

    /// Terminal; a cancelled transaction never goes back to in-progress.
    pub fn mark_cancelled(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Bail out of the pipeline if a cancel arrived. Called at suspension
    /// points: after each request, between chunks and between files.
    pub fn ensure_active(&self) -> Result<(), SyncError> {
        if self.is_cancelled() {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Registry of in-flight transactions keyed by `namespace/name`.
#[derive(Debug, Default)]
pub struct TransactionManager {
    active: Mutex<HashMap<String, Arc<TransactionState>>>,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<TransactionState>>> {
        self.active.lock().expect("transaction map poisoned")
    }

    /// Install a transaction; fails with [`SyncError::Busy`] when one is
    /// already running for the project.
    pub fn begin(
        &self,
        kind: TransactionKind,
        project_full_name: &str,
    ) -> Result<Arc<TransactionState>, SyncError> {
        let mut active = self.lock();
        if active.contains_key(project_full_name) {
            return Err(SyncError::Busy(project_full_name.to_string()));
        }
        let state = Arc::new(TransactionState::new(kind, project_full_name.to_string()));
        active.insert(project_full_name.to_string(), state.clone());
        Ok(state)
    }

    /// Remove a transaction regardless of outcome.
    pub fn end(&self, project_full_name: &str) -> Option<Arc<TransactionState>> {
        self.lock().remove(project_full_name)
    }

    pub fn get(&self, project_full_name: &str) -> Option<Arc<TransactionState>> {
        self.lock().get(project_full_name).cloned()
    }

    /// Flag a transaction for cancellation. Idempotent; returns whether a
    /// transaction was pending.
    pub fn cancel(&self, project_full_name: &str) -> bool {
        match self.get(project_full_name) {
            Some(state) => {
                state.mark_cancelled();
                true
            }
            None => false,
        }
    }

    /// Progress of the pending transaction, or `-1` when there is none.
    pub fn progress(&self, project_full_name: &str) -> f64 {
        match self.get(project_full_name) {
            Some(state) => state.progress(),
            None => -1.0,
        }
    }

    /// Full names of projects with a pending transaction.
    pub fn active_projects(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }
}
