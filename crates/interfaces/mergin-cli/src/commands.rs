use std::sync::Arc;

use anyhow::{bail, Context, Result};
use camino::Utf8PathBuf;
use humansize::{format_size, DECIMAL};
use indicatif::{ProgressBar, ProgressStyle};
use mergin_core::compare_project_files;
use mergin_infra::net::{default_http_client, ApiClient, BearerToken, TokenProvider};
use mergin_pipeline::sync::{local, metadata};
use mergin_pipeline::{default_engine, SyncEngine, SyncEvent};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tokio::task::JoinHandle;

pub struct Connection {
    pub url: String,
    pub token: Option<String>,
    pub data_dir: Utf8PathBuf,
}

impl Connection {
    fn api(&self, require_token: bool) -> Result<ApiClient> {
        let token = self
            .token
            .clone()
            .or_else(|| std::env::var("MERGIN_AUTH_TOKEN").ok());
        if require_token && token.is_none() {
            bail!("no authentication token; pass --token or set MERGIN_AUTH_TOKEN");
        }
        let auth: Arc<dyn TokenProvider> = Arc::new(BearerToken::new(token.unwrap_or_default()));
        let http = default_http_client().context("failed to build HTTP client")?;
        ApiClient::new(&self.url, auth, http).context("invalid server URL")
    }

    fn engine(&self) -> Result<(SyncEngine, UnboundedReceiver<SyncEvent>)> {
        let (tx, rx) = unbounded_channel();
        let engine = default_engine(self.api(true)?, self.data_dir.clone()).with_events(tx);
        Ok((engine, rx))
    }
}

fn spawn_progress(mut rx: UnboundedReceiver<SyncEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{bar:30.green} {percent:>3}% {msg}")
                .unwrap(),
        );
        while let Some(event) = rx.recv().await {
            match event {
                SyncEvent::SyncProjectStatusChanged {
                    progress,
                    project_full_name,
                } if progress >= 0.0 => {
                    bar.set_position((progress * 100.0).round() as u64);
                    bar.set_message(project_full_name);
                }
                SyncEvent::Notify { message } => bar.println(format!(":: {message}")),
                SyncEvent::NetworkErrorOccurred {
                    message, detail, ..
                } => bar.println(format!("!! {message}: {detail}")),
                SyncEvent::SyncProjectFinished { .. } => bar.finish_and_clear(),
                _ => {}
            }
        }
    })
}

pub async fn cmd_download(conn: Connection, namespace: &str, name: &str) -> Result<()> {
    let (engine, rx) = conn.engine()?;
    let progress = spawn_progress(rx);

    let result = engine.update_project(namespace, name).await;
    drop(engine);
    let _ = progress.await;

    let project_dir = result.with_context(|| format!("update of {namespace}/{name} failed"))?;
    println!(":: Project available in {project_dir}");
    Ok(())
}

pub async fn cmd_sync(conn: Connection, namespace: &str, name: &str) -> Result<()> {
    let (engine, rx) = conn.engine()?;
    let progress = spawn_progress(rx);

    let result = engine.upload_project(namespace, name).await;
    drop(engine);
    let _ = progress.await;

    let project_dir = result.with_context(|| format!("upload of {namespace}/{name} failed"))?;
    println!(":: Project synchronized in {project_dir}");
    Ok(())
}

/// Offline report of local changes against the stored baseline.
pub async fn cmd_status(project_dir: Utf8PathBuf) -> Result<()> {
    let baseline = metadata::read_baseline(&project_dir)
        .context("baseline unreadable")?
        .with_context(|| format!("{project_dir} is not a synchronized project"))?;
    let local_files = local::scan_project_files(&project_dir)?;
    let diff = compare_project_files(&baseline.files, &baseline.files, &local_files);

    println!(
        ":: {} at version {}",
        baseline.full_name(),
        baseline.version
    );
    if diff.is_empty() {
        println!("   No local changes");
        return Ok(());
    }
    for path in &diff.local_added {
        let size = local_files
            .iter()
            .find(|f| &f.path == path)
            .map(|f| f.size)
            .unwrap_or(0);
        println!("   added    {path} ({})", format_size(size, DECIMAL));
    }
    for path in &diff.local_updated {
        println!("   updated  {path}");
    }
    for path in &diff.local_deleted {
        println!("   deleted  {path}");
    }
    Ok(())
}

pub async fn cmd_list(conn: Connection, search: Option<String>) -> Result<()> {
    let (engine, _rx) = conn.engine()?;
    let projects = engine.list_projects(search.as_deref()).await?;
    if projects.is_empty() {
        println!(":: No projects found");
        return Ok(());
    }
    for project in projects {
        let updated = project
            .updated
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "-".into());
        println!(
            "   {:<40} v{:<5} {updated}",
            project.full_name(),
            project.version
        );
    }
    Ok(())
}

pub async fn cmd_ping(conn: Connection) -> Result<()> {
    let api = conn.api(false)?;
    let version = api.ping().await.context("server unreachable")?;
    println!(":: Server {} is up, version {version}", conn.url);
    Ok(())
}
