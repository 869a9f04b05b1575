/// Error taxonomy of the sync engine.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("authentication required")]
    AuthRequired,
    #[error("authentication failed: {0}")]
    AuthFailed(String),
    #[error("another sync is already running for {0}")]
    Busy(String),
    #[error("project not found on the server: {0}")]
    NotFound(String),
    #[error("project version changed on the server")]
    VersionMismatch,
    #[error("network error: {0}")]
    Network(String),
    #[error("checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: String,
        expected: String,
        actual: String,
    },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("server error ({status}): {detail}")]
    Server { status: u16, detail: String },
    #[error("sync cancelled")]
    Cancelled,
}

impl SyncError {
    /// Transient errors that chunk transfers retry in place.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Network(_) => true,
            SyncError::Server { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
