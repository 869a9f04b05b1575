use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use camino::{Utf8Path, Utf8PathBuf};
use mergin_core::{SyncError, UPLOAD_CHUNK_SIZE};
use mergin_infra::hashing::bytes_checksum;
use mergin_infra::net::{default_http_client, ApiClient, BearerToken, TokenProvider};
use mergin_pipeline::{SyncEngine, SyncEvent};
use serde_json::{json, Value};
use tempfile::tempdir;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

// --- In-process mock of the Mergin server ---

#[derive(Default)]
struct MockProject {
    version: i64,
    files: BTreeMap<String, Vec<u8>>,
}

#[derive(Default)]
struct PendingPush {
    full_name: String,
    payload: Value,
    chunks: HashMap<String, Vec<u8>>,
}

#[derive(Default)]
struct MockState {
    projects: HashMap<String, MockProject>,
    pending: HashMap<String, PendingPush>,
    cancelled_tokens: Vec<String>,
    push_starts: usize,
    next_token: usize,
    /// When set, the next push start is rejected with 409 once.
    reject_next_push: bool,
    /// Artificial delay inside the chunk upload handler, for cancel tests.
    chunk_delay_ms: u64,
    /// When set, raw chunk downloads answer 500.
    fail_downloads: bool,
    /// When set, raw chunk downloads serve flipped bytes.
    corrupt_downloads: bool,
}

type Shared = Arc<Mutex<MockState>>;

fn manifest_json(namespace: &str, name: &str, project: &MockProject) -> Value {
    let files: Vec<Value> = project
        .files
        .iter()
        .map(|(path, bytes)| {
            json!({
                "path": path,
                "size": bytes.len(),
                "checksum": bytes_checksum(bytes),
            })
        })
        .collect();
    json!({
        "name": name,
        "namespace": namespace,
        "version": project.version,
        "creator": 1,
        "writers": [1],
        "files": files,
    })
}

async fn handle_project_info(
    State(state): State<Shared>,
    Path((namespace, name)): Path<(String, String)>,
) -> Response {
    let state = state.lock().unwrap();
    match state.projects.get(&format!("{namespace}/{name}")) {
        Some(project) => Json(manifest_json(&namespace, &name, project)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"detail": "Project not found"})),
        )
            .into_response(),
    }
}

async fn handle_raw_chunk(
    State(state): State<Shared>,
    Path((namespace, name)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let state = state.lock().unwrap();
    if state.fail_downloads {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"detail": "storage backend unavailable"})),
        )
            .into_response();
    }
    let Some(project) = state.projects.get(&format!("{namespace}/{name}")) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let Some(bytes) = params.get("file").and_then(|f| project.files.get(f)) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let chunk: usize = params
        .get("chunk")
        .and_then(|c| c.parse().ok())
        .unwrap_or(0);
    let start = chunk * UPLOAD_CHUNK_SIZE as usize;
    let end = (start + UPLOAD_CHUNK_SIZE as usize).min(bytes.len());
    if start >= bytes.len() {
        return StatusCode::BAD_REQUEST.into_response();
    }
    let mut slice = bytes[start..end].to_vec();
    if state.corrupt_downloads {
        for byte in &mut slice {
            *byte ^= 0xff;
        }
    }
    slice.into_response()
}

async fn handle_push_start(
    State(state): State<Shared>,
    Path((namespace, name)): Path<(String, String)>,
    Json(payload): Json<Value>,
) -> Response {
    let mut state = state.lock().unwrap();
    state.push_starts += 1;
    if state.reject_next_push {
        state.reject_next_push = false;
        return (
            StatusCode::CONFLICT,
            Json(json!({"detail": "Version mismatch"})),
        )
            .into_response();
    }
    let full_name = format!("{namespace}/{name}");
    let Some(project) = state.projects.get(&full_name) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if payload.get("version").and_then(Value::as_i64) != Some(project.version) {
        return (
            StatusCode::CONFLICT,
            Json(json!({"detail": "Version mismatch"})),
        )
            .into_response();
    }
    state.next_token += 1;
    let token = format!("tx-{}", state.next_token);
    state.pending.insert(
        token.clone(),
        PendingPush {
            full_name,
            payload,
            chunks: HashMap::new(),
        },
    );
    Json(json!({"transaction": token})).into_response()
}

async fn handle_push_chunk(
    State(state): State<Shared>,
    Path((token, chunk_id)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    let delay = state.lock().unwrap().chunk_delay_ms;
    if delay > 0 {
        tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
    }
    let mut state = state.lock().unwrap();
    let Some(pending) = state.pending.get_mut(&token) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let data = body.to_vec();
    let ack = json!({"size": data.len(), "checksum": bytes_checksum(&data)});
    pending.chunks.insert(chunk_id, data);
    Json(ack).into_response()
}

async fn handle_push_finish(State(state): State<Shared>, Path(token): Path<String>) -> Response {
    let mut state = state.lock().unwrap();
    let Some(pending) = state.pending.remove(&token) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let changes = pending.payload.get("changes").cloned().unwrap_or_default();
    let assemble = |file: &Value, chunks: &HashMap<String, Vec<u8>>| -> (String, Vec<u8>) {
        let path = file["path"].as_str().unwrap().to_string();
        let mut bytes = Vec::new();
        if let Some(ids) = file.get("chunks").and_then(Value::as_array) {
            for id in ids {
                bytes.extend_from_slice(&chunks[id.as_str().unwrap()]);
            }
        }
        (path, bytes)
    };

    let project = state
        .projects
        .get_mut(&pending.full_name)
        .expect("pending push for a known project");
    for key in ["added", "updated"] {
        if let Some(files) = changes.get(key).and_then(Value::as_array) {
            for file in files {
                let (path, bytes) = assemble(file, &pending.chunks);
                project.files.insert(path, bytes);
            }
        }
    }
    if let Some(files) = changes.get("removed").and_then(Value::as_array) {
        for file in files {
            project.files.remove(file["path"].as_str().unwrap());
        }
    }
    project.version += 1;
    let version = project.version;
    Json(json!({"version": version})).into_response()
}

async fn handle_push_cancel(State(state): State<Shared>, Path(token): Path<String>) -> Response {
    let mut state = state.lock().unwrap();
    state.pending.remove(&token);
    state.cancelled_tokens.push(token);
    Json(json!({})).into_response()
}

async fn handle_ping() -> Json<Value> {
    Json(json!({"version": "2023.1"}))
}

async fn start_server(state: Shared) -> (SocketAddr, tokio::task::JoinHandle<()>) {
    let app = Router::new()
        .route("/v1/project/raw/:ns/:name", get(handle_raw_chunk))
        .route("/v1/project/push/chunk/:token/:chunk", post(handle_push_chunk))
        .route("/v1/project/push/finish/:token", post(handle_push_finish))
        .route("/v1/project/push/cancel/:token", post(handle_push_cancel))
        .route("/v1/project/push/:ns/:name", post(handle_push_start))
        .route("/v1/project/:ns/:name", get(handle_project_info))
        .route("/ping", get(handle_ping))
        .layer(axum::extract::DefaultBodyLimit::max(
            UPLOAD_CHUNK_SIZE as usize + 1024,
        ))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, handle)
}

// --- Test fixtures ---

fn demo_state(files: &[(&str, &[u8])], version: i64) -> Shared {
    let mut project = MockProject {
        version,
        files: BTreeMap::new(),
    };
    for (path, bytes) in files {
        project.files.insert(path.to_string(), bytes.to_vec());
    }
    let mut state = MockState::default();
    state.projects.insert("ns/demo".into(), project);
    Arc::new(Mutex::new(state))
}

fn make_engine(
    addr: SocketAddr,
    data_dir: &Utf8Path,
) -> (SyncEngine, UnboundedReceiver<SyncEvent>) {
    let auth: Arc<dyn TokenProvider> = Arc::new(BearerToken::new("test-token"));
    let api = ApiClient::new(
        &format!("http://{addr}"),
        auth,
        default_http_client().unwrap(),
    )
    .unwrap();
    let (tx, rx) = unbounded_channel();
    (SyncEngine::new(api, data_dir).with_events(tx), rx)
}

fn utf8_root(dir: &tempfile::TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap()
}

fn baseline_version(project_dir: &Utf8Path) -> i64 {
    let raw = std::fs::read_to_string(project_dir.join("mergin.json")).unwrap();
    serde_json::from_str::<Value>(&raw).unwrap()["version"]
        .as_i64()
        .unwrap()
}

fn drain(rx: &mut UnboundedReceiver<SyncEvent>) -> Vec<SyncEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// --- Scenarios ---

#[tokio::test]
async fn first_time_clone_downloads_all_files() {
    let big = vec![42u8; 12 * 1024 * 1024]; // two chunks
    let state = demo_state(&[("a.txt", b"hello a".as_slice()), ("b.txt", big.as_slice())], 3);
    let (addr, server) = start_server(state).await;

    let dir = tempdir().unwrap();
    let data_dir = utf8_root(&dir);
    let (engine, mut rx) = make_engine(addr, &data_dir);

    let project_dir = engine.update_project("ns", "demo").await.unwrap();
    assert_eq!(project_dir, data_dir.join("demo"));
    assert_eq!(
        std::fs::read(project_dir.join("a.txt")).unwrap(),
        b"hello a"
    );
    assert_eq!(std::fs::read(project_dir.join("b.txt")).unwrap(), big);
    assert_eq!(baseline_version(&project_dir), 3);
    assert!(!project_dir.join(".temp").exists());

    // progress events stay within [0, 1] and end at 1
    let progress: Vec<f64> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            SyncEvent::SyncProjectStatusChanged { progress, .. } => Some(progress),
            _ => None,
        })
        .collect();
    assert!(progress.iter().all(|p| (0.0..=1.0).contains(p)));
    assert_eq!(*progress.last().unwrap(), 1.0);
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));

    server.abort();
}

#[tokio::test]
async fn pull_at_current_version_is_a_noop() {
    let state = demo_state(&[("a.txt", b"hello a".as_slice())], 3);
    let (addr, server) = start_server(state).await;

    let dir = tempdir().unwrap();
    let data_dir = utf8_root(&dir);
    let (engine, _rx) = make_engine(addr, &data_dir);

    let first = engine.update_project("ns", "demo").await.unwrap();
    let second = engine.update_project("ns", "demo").await.unwrap();
    assert_eq!(first, second, "repeated pull must reuse the directory");

    let subdirs: Vec<_> = std::fs::read_dir(&data_dir)
        .unwrap()
        .filter(|e| e.as_ref().unwrap().path().is_dir())
        .collect();
    assert_eq!(subdirs.len(), 1);
    assert_eq!(baseline_version(&first), 3);

    server.abort();
}

#[tokio::test]
async fn clean_push_uploads_new_file_and_bumps_version() {
    let state = demo_state(&[("a.txt", b"hello a".as_slice())], 3);
    let (addr, server) = start_server(state.clone()).await;

    let dir = tempdir().unwrap();
    let data_dir = utf8_root(&dir);
    let (engine, mut rx) = make_engine(addr, &data_dir);

    let project_dir = engine.update_project("ns", "demo").await.unwrap();
    let payload = vec![7u8; 5 * 1024 * 1024];
    std::fs::write(project_dir.join("c.txt"), &payload).unwrap();

    engine.upload_project("ns", "demo").await.unwrap();

    {
        let state = state.lock().unwrap();
        let project = &state.projects["ns/demo"];
        assert_eq!(project.version, 4);
        assert_eq!(project.files["c.txt"], payload);
    }
    assert_eq!(baseline_version(&project_dir), 4);
    let baseline = std::fs::read_to_string(project_dir.join("mergin.json")).unwrap();
    assert!(baseline.contains("c.txt"));

    let events = drain(&mut rx);
    assert!(events
        .iter()
        .any(|e| matches!(e, SyncEvent::PushFilesStarted)));
    assert!(events.iter().any(|e| matches!(
        e,
        SyncEvent::SyncProjectFinished { success: true, .. }
    )));

    server.abort();
}

#[tokio::test]
async fn divergent_edits_keep_local_bytes_as_conflict_copy() {
    let state = demo_state(&[("a.txt", b"base".as_slice())], 3);
    let (addr, server) = start_server(state.clone()).await;

    let dir = tempdir().unwrap();
    let data_dir = utf8_root(&dir);
    let (engine, _rx) = make_engine(addr, &data_dir);

    let project_dir = engine.update_project("ns", "demo").await.unwrap();

    // both sides edit a.txt from the shared baseline
    std::fs::write(project_dir.join("a.txt"), b"local edit").unwrap();
    {
        let mut state = state.lock().unwrap();
        let project = state.projects.get_mut("ns/demo").unwrap();
        project.files.insert("a.txt".into(), b"server edit".to_vec());
        project.version = 4;
    }

    engine.update_project("ns", "demo").await.unwrap();

    assert_eq!(
        std::fs::read(project_dir.join("a.txt")).unwrap(),
        b"server edit"
    );
    assert_eq!(
        std::fs::read(project_dir.join("a_conflict_copy.txt")).unwrap(),
        b"local edit"
    );
    assert_eq!(baseline_version(&project_dir), 4);

    server.abort();
}

#[tokio::test]
async fn remote_delete_of_locally_edited_file_keeps_a_copy() {
    let state = demo_state(&[("a.txt", b"base".as_slice()), ("keep.txt", b"keep".as_slice())], 3);
    let (addr, server) = start_server(state.clone()).await;

    let dir = tempdir().unwrap();
    let data_dir = utf8_root(&dir);
    let (engine, _rx) = make_engine(addr, &data_dir);

    let project_dir = engine.update_project("ns", "demo").await.unwrap();

    std::fs::write(project_dir.join("a.txt"), b"local edit").unwrap();
    {
        let mut state = state.lock().unwrap();
        let project = state.projects.get_mut("ns/demo").unwrap();
        project.files.remove("a.txt");
        project.version = 4;
    }

    engine.update_project("ns", "demo").await.unwrap();

    assert!(!project_dir.join("a.txt").exists());
    assert_eq!(
        std::fs::read(project_dir.join("a_conflict_copy.txt")).unwrap(),
        b"local edit"
    );
    assert!(project_dir.join("keep.txt").exists());

    server.abort();
}

#[tokio::test]
async fn push_behind_server_head_pulls_then_lands_on_top() {
    let state = demo_state(&[("a.txt", b"v3 content".as_slice())], 3);
    let (addr, server) = start_server(state.clone()).await;

    let dir = tempdir().unwrap();
    let data_dir = utf8_root(&dir);
    let (engine, _rx) = make_engine(addr, &data_dir);

    let project_dir = engine.update_project("ns", "demo").await.unwrap();

    // the server moves to version 4 behind our back
    {
        let mut state = state.lock().unwrap();
        let project = state.projects.get_mut("ns/demo").unwrap();
        project.files.insert("a.txt".into(), b"v4 content".to_vec());
        project.version = 4;
    }
    std::fs::write(project_dir.join("c.txt"), b"local addition").unwrap();

    engine.upload_project("ns", "demo").await.unwrap();

    {
        let state = state.lock().unwrap();
        let project = &state.projects["ns/demo"];
        assert_eq!(project.version, 5);
        assert_eq!(project.files["c.txt"], b"local addition");
    }
    // the internal pull applied the v4 change before pushing
    assert_eq!(
        std::fs::read(project_dir.join("a.txt")).unwrap(),
        b"v4 content"
    );
    assert_eq!(baseline_version(&project_dir), 5);

    server.abort();
}

#[tokio::test]
async fn push_rejected_with_conflict_retries_once() {
    let state = demo_state(&[("a.txt", b"base".as_slice())], 3);
    state.lock().unwrap().reject_next_push = true;
    let (addr, server) = start_server(state.clone()).await;

    let dir = tempdir().unwrap();
    let data_dir = utf8_root(&dir);
    let (engine, _rx) = make_engine(addr, &data_dir);

    let project_dir = engine.update_project("ns", "demo").await.unwrap();
    std::fs::write(project_dir.join("c.txt"), b"new").unwrap();

    engine.upload_project("ns", "demo").await.unwrap();

    let state = state.lock().unwrap();
    assert_eq!(state.push_starts, 2, "one rejection, one success");
    assert_eq!(state.projects["ns/demo"].version, 4);

    server.abort();
}

#[tokio::test]
async fn cancel_mid_upload_releases_the_server_transaction() {
    let state = demo_state(&[("a.txt", b"base".as_slice())], 3);
    state.lock().unwrap().chunk_delay_ms = 200;
    let (addr, server) = start_server(state.clone()).await;

    let dir = tempdir().unwrap();
    let data_dir = utf8_root(&dir);
    let (engine, mut rx) = make_engine(addr, &data_dir);
    let engine = Arc::new(engine);

    let project_dir = engine.update_project("ns", "demo").await.unwrap();
    std::fs::write(project_dir.join("c.txt"), b"to upload").unwrap();
    drain(&mut rx);

    let uploader = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.upload_project("ns", "demo").await })
    };

    // wait until chunks start flowing, then cancel
    loop {
        match rx.recv().await.expect("event stream ended early") {
            SyncEvent::PushFilesStarted => break,
            _ => continue,
        }
    }
    assert!(engine.upload_cancel("ns/demo"));

    let result = uploader.await.unwrap();
    assert!(matches!(result, Err(SyncError::Cancelled)));

    {
        let state = state.lock().unwrap();
        assert_eq!(state.cancelled_tokens.len(), 1, "server cancel was posted");
        assert_eq!(state.projects["ns/demo"].version, 3, "finish never ran");
    }
    assert_eq!(engine.progress("ns/demo"), -1.0);
    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        SyncEvent::SyncProjectFinished { success: false, .. }
    )));

    // a fresh upload starts from scratch and succeeds
    state.lock().unwrap().chunk_delay_ms = 0;
    engine.upload_project("ns", "demo").await.unwrap();
    assert_eq!(state.lock().unwrap().projects["ns/demo"].version, 4);

    server.abort();
}

#[tokio::test]
async fn push_then_pull_on_second_client_round_trips() {
    let state = demo_state(&[("a.txt", b"shared base".as_slice())], 3);
    let (addr, server) = start_server(state).await;

    let dir_a = tempdir().unwrap();
    let dir_b = tempdir().unwrap();
    let (client_a, _rx_a) = make_engine(addr, &utf8_root(&dir_a));
    let (client_b, _rx_b) = make_engine(addr, &utf8_root(&dir_b));

    let project_a = client_a.update_project("ns", "demo").await.unwrap();
    std::fs::create_dir_all(project_a.join("data")).unwrap();
    std::fs::write(project_a.join("data/points.geojson"), b"{\"features\":[]}").unwrap();
    std::fs::write(project_a.join("a.txt"), b"edited by a").unwrap();
    client_a.upload_project("ns", "demo").await.unwrap();

    let project_b = client_b.update_project("ns", "demo").await.unwrap();

    for rel in ["a.txt", "data/points.geojson"] {
        assert_eq!(
            std::fs::read(project_a.join(rel)).unwrap(),
            std::fs::read(project_b.join(rel)).unwrap(),
            "{rel} differs between clients"
        );
    }
    // baselines agree on version and file identities (chunk ids are
    // transient upload metadata and only the pushing side has them)
    let identities = |dir: &Utf8Path| -> (i64, Vec<(String, u64, String)>) {
        let raw = std::fs::read_to_string(dir.join("mergin.json")).unwrap();
        let manifest: Value = serde_json::from_str(&raw).unwrap();
        let mut files: Vec<(String, u64, String)> = manifest["files"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| {
                (
                    f["path"].as_str().unwrap().to_string(),
                    f["size"].as_u64().unwrap(),
                    f["checksum"].as_str().unwrap().to_string(),
                )
            })
            .collect();
        files.sort();
        (manifest["version"].as_i64().unwrap(), files)
    };
    assert_eq!(identities(&project_a), identities(&project_b));

    server.abort();
}

#[tokio::test]
async fn second_sync_of_the_same_project_is_busy() {
    let big = vec![1u8; 11 * 1024 * 1024];
    let state = demo_state(&[("big.bin", big.as_slice())], 3);
    let (addr, server) = start_server(state).await;

    let dir = tempdir().unwrap();
    let data_dir = utf8_root(&dir);
    let (engine, _rx) = make_engine(addr, &data_dir);

    let (first, second) = tokio::join!(
        engine.update_project("ns", "demo"),
        engine.update_project("ns", "demo"),
    );
    let results = [first, second];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(SyncError::Busy(p)) if p == "ns/demo")));

    server.abort();
}

#[tokio::test]
async fn project_removed_on_server_surfaces_not_found() {
    let state = demo_state(&[("a.txt", b"base".as_slice())], 3);
    let (addr, server) = start_server(state.clone()).await;

    let dir = tempdir().unwrap();
    let data_dir = utf8_root(&dir);
    let (engine, mut rx) = make_engine(addr, &data_dir);

    let project_dir = engine.update_project("ns", "demo").await.unwrap();
    state.lock().unwrap().projects.clear();

    let result = engine.update_project("ns", "demo").await;
    assert!(matches!(result, Err(SyncError::NotFound(_))));
    // the already-cloned directory must survive
    assert!(project_dir.join("a.txt").exists());

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        SyncEvent::Notify { message } if message.contains("no longer exists")
    )));

    server.abort();
}

#[tokio::test]
async fn failed_first_clone_removes_the_directory() {
    let state = demo_state(&[("a.txt", b"base".as_slice())], 3);
    state.lock().unwrap().fail_downloads = true;
    let (addr, server) = start_server(state).await;

    let dir = tempdir().unwrap();
    let data_dir = utf8_root(&dir);
    let (engine, _rx) = make_engine(addr, &data_dir);

    let result = engine.update_project("ns", "demo").await;
    assert!(matches!(result, Err(SyncError::Server { status: 500, .. })));
    assert!(
        !data_dir.join("demo").exists(),
        "failed first clone must remove the created directory"
    );

    server.abort();
}

#[tokio::test]
async fn corrupted_download_aborts_with_checksum_mismatch() {
    let state = demo_state(&[("a.txt", b"pristine content".as_slice())], 3);
    let (addr, server) = start_server(state.clone()).await;

    let dir = tempdir().unwrap();
    let data_dir = utf8_root(&dir);
    let (engine, _rx) = make_engine(addr, &data_dir);

    let project_dir = engine.update_project("ns", "demo").await.unwrap();

    {
        let mut state = state.lock().unwrap();
        let project = state.projects.get_mut("ns/demo").unwrap();
        project.files.insert("a.txt".into(), b"next revision".to_vec());
        project.version = 4;
        state.corrupt_downloads = true;
    }

    let result = engine.update_project("ns", "demo").await;
    assert!(matches!(result, Err(SyncError::ChecksumMismatch { .. })));
    // the existing project survives a failed (non-first-time) pull
    assert_eq!(
        std::fs::read(project_dir.join("a.txt")).unwrap(),
        b"pristine content"
    );
    assert_eq!(baseline_version(&project_dir), 3);
    assert!(!project_dir.join(".temp").exists());

    server.abort();
}

#[tokio::test]
async fn ping_reports_server_version() {
    let state = demo_state(&[], 0);
    let (addr, server) = start_server(state).await;

    let dir = tempdir().unwrap();
    let (engine, _rx) = make_engine(addr, &utf8_root(&dir));
    assert_eq!(engine.ping().await.unwrap(), "2023.1");

    server.abort();
}
