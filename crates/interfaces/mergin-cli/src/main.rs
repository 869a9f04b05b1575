use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use mergin_cli::{commands, split_project_name};
use mergin_core::DEFAULT_API_ROOT;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(author, version, about = "Sync client for hosted Mergin project stores")]
struct Cli {
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Server URL
    #[arg(long, global = true, default_value = DEFAULT_API_ROOT)]
    url: String,
    /// Directory holding the local projects
    #[arg(long, global = true, default_value = ".")]
    data_dir: Utf8PathBuf,
    /// Bearer token (falls back to MERGIN_AUTH_TOKEN)
    #[arg(long, global = true)]
    token: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download a project, or apply pending server changes
    Download {
        /// <namespace>/<name> or a project URL
        project: String,
    },
    /// Upload local changes (pulls server changes first)
    Sync {
        /// <namespace>/<name> or a project URL
        project: String,
    },
    /// Show local changes against the stored baseline (offline)
    Status { project_dir: Utf8PathBuf },
    /// List projects on the server
    List {
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Check server availability and version
    Ping,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).expect("default subscriber");

    let conn = commands::Connection {
        url: cli.url,
        token: cli.token,
        data_dir: cli.data_dir,
    };

    match cli.command {
        Commands::Download { project } => {
            let (namespace, name) = split_project_name(&project)?;
            commands::cmd_download(conn, &namespace, &name).await
        }
        Commands::Sync { project } => {
            let (namespace, name) = split_project_name(&project)?;
            commands::cmd_sync(conn, &namespace, &name).await
        }
        Commands::Status { project_dir } => commands::cmd_status(project_dir).await,
        Commands::List { search } => commands::cmd_list(conn, search).await,
        Commands::Ping => commands::cmd_ping(conn).await,
    }
}
