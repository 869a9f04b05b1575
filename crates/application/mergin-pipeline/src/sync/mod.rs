use camino::Utf8PathBuf;
use mergin_core::ProjectListEntry;

pub mod engine;
pub mod local;
pub mod metadata;
pub(crate) mod pull;
pub(crate) mod push;
pub mod transaction;

pub use engine::SyncEngine;
pub use transaction::{TransactionKind, TransactionManager, TransactionState};

/// Lifecycle notifications emitted to hosts over an optional channel.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    SyncProjectFinished {
        project_dir: Utf8PathBuf,
        project_full_name: String,
        success: bool,
    },
    /// Progress in `[0, 1]` while a sync is pending; `-1` once it is gone.
    /// Monotonic per transfer phase; an upload restarts the ratio after its
    /// internal pull completes.
    SyncProjectStatusChanged {
        project_full_name: String,
        progress: f64,
    },
    /// The project directory content changed under the host's feet.
    ReloadProject { project_dir: Utf8PathBuf },
    NetworkErrorOccurred {
        message: String,
        detail: String,
        show_as_dialog: bool,
    },
    Notify { message: String },
    PullFilesStarted,
    PushFilesStarted,
    ListProjectsFinished { projects: Vec<ProjectListEntry> },
    ListProjectsFailed,
}

/// Convenience constructor for the default engine.
pub fn default_engine(
    api: mergin_infra::net::ApiClient,
    data_dir: impl Into<Utf8PathBuf>,
) -> SyncEngine {
    SyncEngine::new(api, data_dir)
}
