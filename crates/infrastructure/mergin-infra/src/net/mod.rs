//! HTTP client for the Mergin API (protocol version 2019.4).

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mergin_core::{
    ProjectListEntry, ProjectManifest, PushPayload, SyncError, API_VERSION_MAJOR,
    API_VERSION_MINOR,
};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use tracing::{debug, warn};

/// Timeout for control requests (info, start, finish, cancel, listing).
pub const CONTROL_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for chunk transfers.
pub const TRANSFER_TIMEOUT: Duration = Duration::from_secs(120);

/// How many times a failed chunk transfer is retried in place.
const CHUNK_RETRIES: u32 = 3;

/// Base of the linear backoff between chunk retries.
const CHUNK_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Source of the bearer token attached to every request.
///
/// The token is process-wide state owned by the auth collaborator; the sync
/// core reads it before each request and defers one refresh attempt on 401.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    fn token(&self) -> Option<String>;
    async fn refresh(&self) -> Result<String, SyncError>;
}

/// A fixed token with no refresh capability.
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenProvider for BearerToken {
    fn token(&self) -> Option<String> {
        Some(self.0.clone())
    }

    async fn refresh(&self) -> Result<String, SyncError> {
        Err(SyncError::AuthFailed(
            "token rejected by the server and no refresh is available".into(),
        ))
    }
}

/// Build the HTTP client the sync engine uses by default.
pub fn default_http_client() -> reqwest::Result<Client> {
    Client::builder().timeout(CONTROL_TIMEOUT).build()
}

#[derive(Deserialize)]
struct TransactionResponse {
    transaction: String,
}

/// Server acknowledgement of one uploaded chunk. Callers must verify the
/// checksum against the locally computed chunk hash.
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkAck {
    pub size: u64,
    pub checksum: String,
}

#[derive(Deserialize)]
struct VersionResponse {
    version: i64,
}

#[derive(Deserialize)]
struct PingResponse {
    version: String,
}

/// Client for one Mergin server.
pub struct ApiClient {
    http: Client,
    api_root: Url,
    auth: Arc<dyn TokenProvider>,
}

impl ApiClient {
    pub fn new(
        api_root: &str,
        auth: Arc<dyn TokenProvider>,
        http: Client,
    ) -> Result<Self, SyncError> {
        let mut api_root: Url = api_root
            .parse()
            .map_err(|e| SyncError::Network(format!("invalid api root {api_root}: {e}")))?;
        // Url::join treats a path without a trailing slash as a file name.
        if !api_root.path().ends_with('/') {
            api_root.set_path(&format!("{}/", api_root.path()));
        }
        Ok(Self {
            http,
            api_root,
            auth,
        })
    }

    pub fn api_root(&self) -> &Url {
        &self.api_root
    }

    /// Whether a token is currently available.
    pub fn has_auth(&self) -> bool {
        self.auth.token().is_some()
    }

    fn url(&self, segments: &[&str]) -> Result<Url, SyncError> {
        let mut url = self.api_root.clone();
        {
            let mut parts = url
                .path_segments_mut()
                .map_err(|_| SyncError::Network("api root cannot be a base".into()))?;
            parts.pop_if_empty();
            for segment in segments {
                parts.push(segment);
            }
        }
        Ok(url)
    }

    fn client_header() -> String {
        format!("mergin-client/{API_VERSION_MAJOR}.{API_VERSION_MINOR}")
    }

    /// Attach auth headers and dispatch; on 401 defer one token refresh and
    /// retry the request once before giving up.
    async fn send(&self, rb: RequestBuilder) -> Result<Response, SyncError> {
        let token = self.auth.token().ok_or(SyncError::AuthRequired)?;
        let retry = rb.try_clone();
        let resp = self
            .dispatch(rb.bearer_auth(&token))
            .await?;

        if resp.status() != StatusCode::UNAUTHORIZED {
            return Ok(resp);
        }

        let Some(retry) = retry else {
            return Err(SyncError::AuthRequired);
        };
        debug!("request rejected with 401, refreshing token");
        let token = self.auth.refresh().await?;
        let resp = self.dispatch(retry.bearer_auth(&token)).await?;
        if resp.status() == StatusCode::UNAUTHORIZED {
            return Err(SyncError::AuthRequired);
        }
        Ok(resp)
    }

    async fn dispatch(&self, rb: RequestBuilder) -> Result<Response, SyncError> {
        rb.header("X-Client", Self::client_header())
            .send()
            .await
            .map_err(|e| SyncError::Network(e.to_string()))
    }

    /// Map a non-success response to the error taxonomy. `subject` names the
    /// project or transaction the request was about.
    async fn check(resp: Response, subject: &str) -> Result<Response, SyncError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.bytes().await.unwrap_or_default();
        let detail = extract_server_error(&body);
        Err(match status {
            StatusCode::UNAUTHORIZED => SyncError::AuthRequired,
            StatusCode::FORBIDDEN => SyncError::AuthFailed(detail),
            StatusCode::NOT_FOUND => SyncError::NotFound(subject.to_string()),
            StatusCode::CONFLICT => SyncError::VersionMismatch,
            _ => SyncError::Server {
                status: status.as_u16(),
                detail,
            },
        })
    }

    async fn json_body<T: serde::de::DeserializeOwned>(resp: Response) -> Result<T, SyncError> {
        resp.json()
            .await
            .map_err(|e| SyncError::Network(format!("malformed server response: {e}")))
    }

    /// `GET /v1/project/{ns}/{name}`: the current server manifest.
    pub async fn project_info(
        &self,
        namespace: &str,
        name: &str,
        since: Option<i64>,
    ) -> Result<ProjectManifest, SyncError> {
        let full_name = mergin_core::full_project_name(namespace, name);
        let mut url = self.url(&["v1", "project", namespace, name])?;
        if let Some(since) = since {
            url.query_pairs_mut().append_pair("since", &since.to_string());
        }
        let resp = self.send(self.http.get(url)).await?;
        let resp = Self::check(resp, &full_name).await?;
        Self::json_body(resp).await
    }

    /// `GET /v1/project`: cross-project listing, optionally filtered.
    pub async fn list_projects(
        &self,
        search: Option<&str>,
    ) -> Result<Vec<ProjectListEntry>, SyncError> {
        let mut url = self.url(&["v1", "project"])?;
        if let Some(search) = search {
            url.query_pairs_mut().append_pair("q", search);
        }
        let resp = self.send(self.http.get(url)).await?;
        let resp = Self::check(resp, "project listing").await?;
        Self::json_body(resp).await
    }

    /// `GET /v1/project/raw/{ns}/{name}`: one chunk of one file at one
    /// version. Retried in place on transient errors.
    pub async fn download_chunk(
        &self,
        namespace: &str,
        name: &str,
        file_path: &str,
        version: i64,
        chunk_no: u64,
    ) -> Result<Vec<u8>, SyncError> {
        let full_name = mergin_core::full_project_name(namespace, name);
        let mut url = self.url(&["v1", "project", "raw", namespace, name])?;
        url.query_pairs_mut()
            .append_pair("file", file_path)
            .append_pair("version", &format!("v{version}"))
            .append_pair("chunk", &chunk_no.to_string());

        with_retry(|| {
            let url = url.clone();
            let full_name = full_name.clone();
            async move {
                let resp = self
                    .send(self.http.get(url).timeout(TRANSFER_TIMEOUT))
                    .await?;
                let resp = Self::check(resp, &full_name).await?;
                let bytes = resp
                    .bytes()
                    .await
                    .map_err(|e| SyncError::Network(e.to_string()))?;
                Ok(bytes.to_vec())
            }
        })
        .await
    }

    /// `POST /v1/project/push/{ns}/{name}`: open a push transaction with
    /// the structured delta; returns the transaction token. A 409 surfaces
    /// as [`SyncError::VersionMismatch`].
    pub async fn push_start(
        &self,
        namespace: &str,
        name: &str,
        payload: &PushPayload,
    ) -> Result<String, SyncError> {
        let full_name = mergin_core::full_project_name(namespace, name);
        let url = self.url(&["v1", "project", "push", namespace, name])?;
        let resp = self.send(self.http.post(url).json(payload)).await?;
        let resp = Self::check(resp, &full_name).await?;
        let body: TransactionResponse = Self::json_body(resp).await?;
        Ok(body.transaction)
    }

    /// `POST /v1/project/push/chunk/{transaction}/{chunkId}`: raw chunk
    /// bytes. Retried in place on transient errors.
    pub async fn push_chunk(
        &self,
        transaction: &str,
        chunk_id: &str,
        data: Vec<u8>,
    ) -> Result<ChunkAck, SyncError> {
        let url = self.url(&["v1", "project", "push", "chunk", transaction, chunk_id])?;

        with_retry(|| {
            let url = url.clone();
            let data = data.clone();
            async move {
                let resp = self
                    .send(
                        self.http
                            .post(url)
                            .timeout(TRANSFER_TIMEOUT)
                            .header("Content-Type", "application/octet-stream")
                            .body(data),
                    )
                    .await?;
                let resp = Self::check(resp, transaction).await?;
                Self::json_body(resp).await
            }
        })
        .await
    }

    /// `POST /v1/project/push/finish/{transaction}`: returns the new
    /// project version.
    pub async fn push_finish(&self, transaction: &str) -> Result<i64, SyncError> {
        let url = self.url(&["v1", "project", "push", "finish", transaction])?;
        let resp = self.send(self.http.post(url)).await?;
        let resp = Self::check(resp, transaction).await?;
        let body: VersionResponse = Self::json_body(resp).await?;
        Ok(body.version)
    }

    /// `POST /v1/project/push/cancel/{transaction}`: release a pending
    /// transaction on the server.
    pub async fn push_cancel(&self, transaction: &str) -> Result<(), SyncError> {
        let url = self.url(&["v1", "project", "push", "cancel", transaction])?;
        let resp = self.send(self.http.post(url)).await?;
        Self::check(resp, transaction).await?;
        Ok(())
    }

    /// `GET /ping`: server version string. Works without a token so hosts
    /// can check compatibility before authenticating.
    pub async fn ping(&self) -> Result<String, SyncError> {
        let url = self.url(&["ping"])?;
        let resp = self.dispatch(self.http.get(url)).await?;
        let resp = Self::check(resp, "ping").await?;
        let body: PingResponse = Self::json_body(resp).await?;
        Ok(body.version)
    }
}

/// Retry a chunk transfer on transient errors, at most [`CHUNK_RETRIES`]
/// attempts with linear backoff.
async fn with_retry<T, F, Fut>(mut op: F) -> Result<T, SyncError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SyncError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < CHUNK_RETRIES => {
                warn!("chunk transfer failed (attempt {attempt}): {err}");
                tokio::time::sleep(CHUNK_RETRY_DELAY * attempt).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Extract the `detail` message of a server error body; if the body is not
/// JSON or lacks the field, the whole body is returned.
pub fn extract_server_error(body: &[u8]) -> String {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
        if let Some(detail) = value.get("detail").and_then(|d| d.as_str()) {
            return detail.to_string();
        }
    }
    String::from_utf8_lossy(body).to_string()
}
