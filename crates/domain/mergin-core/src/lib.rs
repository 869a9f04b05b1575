use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod diff;
pub mod error;
pub mod ignore;
pub mod path_utils;

pub use diff::{compare_project_files, ProjectDiff};
pub use error::SyncError;

/// Buffer size for streaming reads and hashing.
pub const CHUNK_SIZE: usize = 65536;

/// Size of one uploaded chunk. Must match the server's chunk size.
pub const UPLOAD_CHUNK_SIZE: u64 = 10 * 1024 * 1024;

/// Baseline metadata file kept in every synchronized project directory.
pub const METADATA_FILE: &str = "mergin.json";

/// Transient download area inside a project directory.
pub const TEMP_FOLDER: &str = ".temp";

pub const API_VERSION_MAJOR: u32 = 2019;
pub const API_VERSION_MINOR: u32 = 4;

pub const DEFAULT_API_ROOT: &str = "https://public.cloudmergin.com/";

/// One file within a project, identified by its forward-slash relative path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MerginFile {
    pub path: String,
    /// Lowercase hex SHA-256 of the raw file bytes.
    pub checksum: String,
    pub size: u64,
    /// Chunk identifiers assigned at upload time, one per 10 MiB slice.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chunks: Vec<String>,
}

impl MerginFile {
    /// Number of transfer chunks for this file. Zero-byte files have none.
    pub fn chunk_count(&self) -> u64 {
        self.size.div_ceil(UPLOAD_CHUNK_SIZE)
    }
}

/// Snapshot of a project at one server version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectManifest {
    pub name: String,
    pub namespace: String,
    /// Server-assigned monotonic version; -1 means "no version yet".
    #[serde(default = "no_version")]
    pub version: i64,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub creator: Option<i64>,
    #[serde(default)]
    pub writers: Vec<i64>,
    #[serde(default)]
    pub files: Vec<MerginFile>,
}

fn no_version() -> i64 {
    -1
}

impl ProjectManifest {
    pub fn full_name(&self) -> String {
        full_project_name(&self.namespace, &self.name)
    }

    pub fn file(&self, path: &str) -> Option<&MerginFile> {
        self.files.iter().find(|f| f.path == path)
    }
}

/// One row of the cross-project listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectListEntry {
    pub name: String,
    pub namespace: String,
    #[serde(default = "no_version")]
    pub version: i64,
    #[serde(default)]
    pub creator: Option<i64>,
    #[serde(default)]
    pub writers: Vec<i64>,
    #[serde(default)]
    pub updated: Option<DateTime<Utc>>,
}

impl ProjectListEntry {
    pub fn full_name(&self) -> String {
        full_project_name(&self.namespace, &self.name)
    }
}

/// Structured delta sent when opening a push transaction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangesPayload {
    pub added: Vec<MerginFile>,
    pub updated: Vec<MerginFile>,
    pub removed: Vec<MerginFile>,
    /// Renames are represented as remove + add; this is always empty.
    pub renamed: Vec<MerginFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushPayload {
    pub version: i64,
    pub changes: ChangesPayload,
}

/// `namespace/name`, the unique key of a project.
pub fn full_project_name(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

/// Client-generated chunk identifiers for a file of the given size,
/// one per upload slice, in order.
pub fn generate_chunk_ids(size: u64) -> Vec<String> {
    let count = size.div_ceil(UPLOAD_CHUNK_SIZE);
    (0..count).map(|_| Uuid::new_v4().to_string()).collect()
}
