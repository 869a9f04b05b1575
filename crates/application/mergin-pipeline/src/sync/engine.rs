//! Public entry points composing the pull and push pipelines.

use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use mergin_core::{full_project_name, ProjectListEntry, SyncError};
use mergin_infra::net::ApiClient;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

use crate::sync::transaction::{TransactionKind, TransactionManager, TransactionState};
use crate::sync::{pull, push, SyncEvent};

/// The sync orchestrator: one instance per server + data directory.
///
/// All operations run as sequential awaits on the caller's task; per-project
/// exclusivity is the only coordination.
pub struct SyncEngine {
    api: ApiClient,
    data_dir: Utf8PathBuf,
    transactions: TransactionManager,
    events: Option<UnboundedSender<SyncEvent>>,
}

impl SyncEngine {
    pub fn new(api: ApiClient, data_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            api,
            data_dir: data_dir.into(),
            transactions: TransactionManager::new(),
            events: None,
        }
    }

    /// Deliver lifecycle events to the host over the given channel.
    pub fn with_events(mut self, events: UnboundedSender<SyncEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub(crate) fn api(&self) -> &ApiClient {
        &self.api
    }

    pub(crate) fn data_dir(&self) -> &Utf8Path {
        &self.data_dir
    }

    pub(crate) fn emit(&self, event: SyncEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }

    pub(crate) fn emit_status(&self, project_full_name: &str, progress: f64) {
        self.emit(SyncEvent::SyncProjectStatusChanged {
            project_full_name: project_full_name.to_string(),
            progress,
        });
    }

    fn begin(
        &self,
        kind: TransactionKind,
        project_full_name: &str,
    ) -> Result<Arc<TransactionState>, SyncError> {
        if !self.api.has_auth() {
            self.emit(SyncEvent::NetworkErrorOccurred {
                message: format!("Failed to synchronize {project_full_name}"),
                detail: SyncError::AuthRequired.to_string(),
                show_as_dialog: true,
            });
            return Err(SyncError::AuthRequired);
        }
        self.transactions.begin(kind, project_full_name)
    }

    /// Download a project for the first time or apply pending server
    /// changes. Returns the local project directory.
    pub async fn update_project(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Utf8PathBuf, SyncError> {
        let full_name = full_project_name(namespace, name);
        let tx = self.begin(TransactionKind::Pull, &full_name)?;
        self.emit_status(&full_name, 0.0);

        match pull::run_pull(self, &tx, namespace, name).await {
            Ok(outcome) => {
                info!("{full_name}: updated to version {}", outcome.manifest.version);
                self.emit_status(&full_name, 1.0);
                self.transactions.end(&full_name);
                self.emit(SyncEvent::Notify {
                    message: format!("Project {full_name} updated"),
                });
                self.emit(SyncEvent::SyncProjectFinished {
                    project_dir: outcome.project_dir.clone(),
                    project_full_name: full_name,
                    success: true,
                });
                Ok(outcome.project_dir)
            }
            Err(err) => Err(self.fail_transaction(&full_name, &tx, err).await),
        }
    }

    /// Upload local changes. Implicitly chains an update so the push is
    /// always based on the server head. Returns the project directory.
    pub async fn upload_project(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Utf8PathBuf, SyncError> {
        let full_name = full_project_name(namespace, name);
        let tx = self.begin(TransactionKind::Push, &full_name)?;
        self.emit_status(&full_name, 0.0);

        match push::run_push(self, &tx, namespace, name).await {
            Ok((project_dir, uploaded)) => {
                let version = tx.details().version;
                info!("{full_name}: at version {version}");
                self.emit_status(&full_name, 1.0);
                self.transactions.end(&full_name);
                if uploaded {
                    self.emit(SyncEvent::Notify {
                        message: format!("Project {full_name} uploaded"),
                    });
                }
                self.emit(SyncEvent::SyncProjectFinished {
                    project_dir: project_dir.clone(),
                    project_full_name: full_name,
                    success: true,
                });
                Ok(project_dir)
            }
            Err(err) => Err(self.fail_transaction(&full_name, &tx, err).await),
        }
    }

    /// Abort a pending pull. Idempotent and terminal.
    pub fn update_cancel(&self, project_full_name: &str) -> bool {
        self.transactions.cancel(project_full_name)
    }

    /// Abort a pending push. If a server transaction token was already
    /// issued, a best-effort cancel is sent when the pipeline unwinds.
    pub fn upload_cancel(&self, project_full_name: &str) -> bool {
        self.transactions.cancel(project_full_name)
    }

    /// Progress of the pending sync in `[0, 1]`, or `-1` when there is none.
    pub fn progress(&self, project_full_name: &str) -> f64 {
        self.transactions.progress(project_full_name)
    }

    /// Full names of projects with a sync in flight.
    pub fn active_transactions(&self) -> Vec<String> {
        self.transactions.active_projects()
    }

    /// Cross-project listing, optionally filtered by a search expression.
    pub async fn list_projects(
        &self,
        search: Option<&str>,
    ) -> Result<Vec<ProjectListEntry>, SyncError> {
        match self.api.list_projects(search).await {
            Ok(projects) => {
                self.emit(SyncEvent::ListProjectsFinished {
                    projects: projects.clone(),
                });
                Ok(projects)
            }
            Err(err) => {
                self.emit(SyncEvent::ListProjectsFailed);
                Err(err)
            }
        }
    }

    /// Server version string.
    pub async fn ping(&self) -> Result<String, SyncError> {
        self.api.ping().await
    }

    /// Common failure epilogue: release the server transaction, clean the
    /// temp area, tear down a half-created clone and emit the events.
    async fn fail_transaction(
        &self,
        full_name: &str,
        tx: &Arc<TransactionState>,
        err: SyncError,
    ) -> SyncError {
        let (token, temp_dir, project_dir, first_time) = {
            let mut details = tx.details();
            (
                details.token.take(),
                details.temp_dir.clone(),
                details.project_dir.clone(),
                details.first_time,
            )
        };

        if let Some(token) = token {
            if let Err(cancel_err) = self.api.push_cancel(&token).await {
                warn!("{full_name}: server-side cancel failed: {cancel_err}");
            }
        }
        if let Some(temp_dir) = &temp_dir {
            if temp_dir.exists() {
                let _ = std::fs::remove_dir_all(temp_dir);
            }
        }
        if first_time {
            if let Some(dir) = &project_dir {
                let _ = std::fs::remove_dir_all(dir);
            }
        }
        self.transactions.end(full_name);

        warn!("{full_name}: sync failed: {err}");
        if !matches!(err, SyncError::Cancelled) {
            self.emit(SyncEvent::NetworkErrorOccurred {
                message: format!("Failed to synchronize {full_name}"),
                detail: err.to_string(),
                show_as_dialog: false,
            });
        }
        let fallback_dir = self
            .data_dir
            .join(full_name.rsplit('/').next().unwrap_or(full_name));
        self.emit(SyncEvent::SyncProjectFinished {
            project_dir: project_dir.unwrap_or(fallback_dir),
            project_full_name: full_name.to_string(),
            success: false,
        });
        err
    }
}
