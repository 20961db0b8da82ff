//! Refile Server
//!
//! Axum server over the refile core: catalog indexing, pattern lifecycle,
//! classification, and batch rename/copy requests. The same binary offers
//! one-shot `index` and `apply` commands.

mod api;

use anyhow::Context;
use clap::{Parser, Subcommand};
use refile_core::config::{runtime_path, RefileConfig};
use refile_core::state::RefileDb;
use refile_core::tools::indexer;
use refile_core::workflow::{BatchRequest, ChangeRequestExecutor, ExecutorConfig, FileSelection};
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Clone)]
#[command(author, version, about = "Refile - pattern-driven file renaming and copying")]
struct Args {
    #[command(subcommand)]
    command: Option<CliCommand>,
}

#[derive(Subcommand, Clone)]
enum CliCommand {
    /// Start the HTTP server (default)
    Serve {
        /// Address to bind, overriding the configured one
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Index a directory into the catalog and exit
    Index {
        /// Directory to walk
        directory: PathBuf,
    },
    /// Run one batch rename/copy with a confirmed pattern and exit
    Apply {
        /// Confirmed pattern id
        #[arg(short, long)]
        pattern: i64,
        /// Destination directory
        #[arg(short, long)]
        destination: String,
        /// Rename template, e.g. "{name} - S{season:02}E{ep:02}"
        #[arg(short, long)]
        rename: String,
        /// File ids (all cataloged files when omitted)
        files: Vec<i64>,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("refile=info,refile_core=info,refile_server=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn open_db(config: &RefileConfig) -> anyhow::Result<RefileDb> {
    RefileDb::open_at(&config.database_path).with_context(|| {
        format!(
            "Failed to open database at {}",
            config.database_path.display()
        )
    })
}

async fn run_server(config: RefileConfig, bind: Option<String>) -> anyhow::Result<()> {
    let db = open_db(&config)?;
    let addr = bind.unwrap_or_else(|| config.bind_address.clone());
    let state = api::AppState::new(db, config, runtime_path().join("config.json"));

    let app = api::router(state);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("Refile server running at http://{}", addr);
    tracing::info!("OpenAPI document at http://{}/api/v1/openapi.json", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

async fn run_index(config: RefileConfig, directory: PathBuf) -> anyhow::Result<()> {
    let db = open_db(&config)?;
    let report = indexer::index(&db, &directory, config.index_batch_size)
        .await
        .with_context(|| format!("Indexing {} failed", directory.display()))?;

    println!(
        "Indexed {} new files, pruned {}",
        report.indexed_files.len(),
        report.pruned
    );
    Ok(())
}

async fn run_apply(
    config: RefileConfig,
    pattern_id: i64,
    destination_path: String,
    rename_pattern_string: String,
    files: Vec<i64>,
) -> anyhow::Result<()> {
    let db = open_db(&config)?;
    let selection = if files.is_empty() {
        FileSelection::all()
    } else {
        FileSelection::Explicit(files)
    };

    let request = ChangeRequestExecutor::new(&db, ExecutorConfig::from(&config))
        .apply_batch(&BatchRequest {
            pattern_id,
            selection,
            destination_path,
            rename_pattern_string,
        })
        .await
        .context("Change request could not start")?;

    println!(
        "Request {} {}: {} succeeded, {} failed",
        request.id,
        request.status.as_str(),
        request.success_count,
        request.failed_count
    );
    println!("{}", request.details);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let args = Args::parse();
    let config = RefileConfig::load();

    match args.command {
        None => run_server(config, None).await,
        Some(CliCommand::Serve { bind }) => run_server(config, bind).await,
        Some(CliCommand::Index { directory }) => run_index(config, directory).await,
        Some(CliCommand::Apply {
            pattern,
            destination,
            rename,
            files,
        }) => run_apply(config, pattern, destination, rename, files).await,
    }
}
