//! Nodimus Memory Server
//!
//! Serves the memory repository over JSON-RPC on stdio, or runs one
//! maintenance command and exits.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use nodimus_core::{graph, Repository, SnapshotScheduler, DATABASE_FILE, GRAPH_FILE};
use nodimus_mcp::protocol::stdio::StdioTransport;
use nodimus_mcp::{init_logging, BackgroundWorker, Config, MemoryServer, ShutdownMode};

/// Nodimus - memory server for AI assistants
#[derive(Parser)]
#[command(name = "nodimus-memory")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Memory server for AI assistants: JSON-RPC over stdio")]
struct Cli {
    /// Path to config.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Data directory (overrides config and NODIMUS_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve JSON-RPC requests on stdin/stdout (default)
    Serve,

    /// Write a consistent snapshot of the store and exit
    Snapshot {
        /// Output file; defaults to snapshots/YYYY-MM-DD.db in the data directory
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Rebuild the search index from the relational store
    Reindex,

    /// Run the integrity check and print store statistics
    Check,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config.logging);
    info!("Nodimus memory server v{} starting...", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(cli, config).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: Config) -> anyhow::Result<()> {
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => config.data_dir()?,
    };
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

    let db_path = data_dir.join(DATABASE_FILE);
    let repo = Repository::open(&db_path)
        .with_context(|| format!("failed to open repository at {}", db_path.display()))?;
    info!(path = %db_path.display(), "Repository opened");
    let repo = Arc::new(repo);

    let result = match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(repo.clone(), &data_dir, &config).await,
        Commands::Snapshot { output } => run_snapshot(repo.clone(), &data_dir, output).await,
        Commands::Reindex => run_reindex(&repo),
        Commands::Check => run_check(&repo),
    };

    close_repository(repo);
    result
}

async fn serve(repo: Arc<Repository>, data_dir: &Path, config: &Config) -> anyhow::Result<()> {
    if let Some(documents) = repo.reconcile_index().context("failed to reconcile search index")? {
        info!(documents, "Search index rebuilt at startup");
    }

    let graph_path = data_dir.join(GRAPH_FILE);
    if let Err(e) = graph::generate(repo.as_ref(), &graph_path) {
        warn!("Failed to generate knowledge graph: {}", e);
    }

    let worker = BackgroundWorker::spawn(repo.clone(), graph_path);

    let mut scheduler = SnapshotScheduler::new(repo.clone(), data_dir, config.snapshot_interval());
    if config.snapshot.enabled {
        scheduler.start().context("failed to start snapshot scheduler")?;
    }

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received, shutting down");
                shutdown.cancel();
            }
        });
    }

    let server = MemoryServer::new(repo, worker.handle());
    info!("Serving JSON-RPC on stdio");
    let served = StdioTransport::new().run(&server, shutdown).await;

    // Stop producers before the stores close
    scheduler.stop().await;
    drop(scheduler);
    drop(server);
    worker.shutdown(ShutdownMode::Drain).await;

    served.context("stdio transport failed")
}

async fn run_snapshot(
    repo: Arc<Repository>,
    data_dir: &Path,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    println!("{}", "=== Nodimus Snapshot ===".cyan().bold());

    let path = match output {
        Some(path) => {
            if path.exists() {
                anyhow::bail!("Output already exists: {}", path.display());
            }
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            repo.snapshot_to(&path)?;
            path
        }
        None => {
            let scheduler =
                SnapshotScheduler::new(repo, data_dir, nodimus_core::DEFAULT_SNAPSHOT_INTERVAL);
            scheduler.run_once().await?
        }
    };

    nodimus_core::check_file(&path).context("snapshot failed its integrity check")?;

    let size = std::fs::metadata(&path)?.len();
    println!("  {} {}", "Written:".dimmed(), path.display());
    println!("  {}    {} bytes", "Size:".dimmed(), size);
    println!("{}", "Snapshot complete".green().bold());
    Ok(())
}

fn run_reindex(repo: &Repository) -> anyhow::Result<()> {
    println!("{}", "=== Nodimus Reindex ===".cyan().bold());
    let documents = repo.rebuild_index()?;
    println!("{}: {}", "Documents indexed".white(), documents);
    Ok(())
}

fn run_check(repo: &Repository) -> anyhow::Result<()> {
    println!("{}", "=== Nodimus Check ===".cyan().bold());

    repo.integrity_check()?;
    let stats = repo.stats()?;

    let in_sync = stats.memories == stats.indexed_documents;
    let status = if in_sync {
        "HEALTHY".green().bold()
    } else {
        "INDEX OUT OF SYNC".yellow().bold()
    };

    println!("{}: {}", "Status".white().bold(), status);
    println!("{}: {}", "Memories".white(), stats.memories);
    println!("{}: {}", "Entities".white(), stats.entities);
    println!("{}: {}", "Relationships".white(), stats.relationships);
    println!("{}: {}", "Indexed documents".white(), stats.indexed_documents);
    if !in_sync {
        println!();
        println!("Run {} to rebuild the search index.", "nodimus-memory reindex".bold());
    }
    Ok(())
}

/// Close both stores, logging each half that fails
fn close_repository(repo: Arc<Repository>) {
    match Arc::try_unwrap(repo) {
        Ok(repo) => match repo.close() {
            Ok(()) => info!("Repository closed"),
            Err(e) => {
                if let Some(err) = &e.relational {
                    error!("Failed to close relational store: {}", err);
                }
                if let Some(err) = &e.index {
                    error!("Failed to close search index: {}", err);
                }
            }
        },
        Err(_) => warn!("Repository still shared at shutdown; closing on drop"),
    }
}
