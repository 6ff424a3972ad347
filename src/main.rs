//! lifedb CLI entry point.

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use lifedb::blob::BlobStore;
use lifedb::catalog::Catalog;
use lifedb::config::Config;
use lifedb::digest::{CoordinateOptions, Coordinator, Registry, Supervisor, digesters, ensure};
use lifedb::gateway::{HttpCrawlGateway, HttpLlmGateway, HttpMediaGateway};
use lifedb::queue::{IndexQueue, SqliteTaskQueue};
use lifedb::scan::Scanner;
use lifedb::watcher::FileWatcher;
use lifedb::PipelineDeps;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "lifedb", version)]
#[command(about = "Personal life database: capture anything and let the pipeline enrich it")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Data root override (defaults to LIFEDB_DATA_ROOT or the platform data dir)
    #[arg(short, long, global = true)]
    data_root: Option<std::path::PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Run the digest pipeline in the foreground (default)
    Run,
    /// Scan the data root once and exit
    Scan,
    /// Reset digests for a file, then re-run them
    Reset {
        /// Catalog-relative file path
        path: String,
        /// Reset only this digester output
        #[arg(short = 'g', long)]
        digester: Option<String>,
    },
    /// Show per-digester status counts
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load()?;
    if let Some(data_root) = cli.data_root {
        std::fs::create_dir_all(&data_root)
            .with_context(|| format!("failed to create data root: {}", data_root.display()))?;
        config.data_root = data_root;
    }

    let _log_guard = init_tracing(cli.debug, &config.log_dir())?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => cmd_run(config).await,
        Command::Scan => cmd_scan(config).await,
        Command::Reset { path, digester } => cmd_reset(config, path, digester).await,
        Command::Status => cmd_status(config).await,
    }
}

fn init_tracing(
    debug: bool,
    log_dir: &Path,
) -> anyhow::Result<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::layer::SubscriberExt as _;
    use tracing_subscriber::util::SubscriberInitExt as _;

    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("failed to create log directory: {}", log_dir.display()))?;

    let file_appender = tracing_appender::rolling::daily(log_dir, "lifedb.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let default_filter = if debug { "lifedb=debug,info" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();

    Ok(guard)
}

/// Open the catalog and assemble the shared pipeline dependencies.
async fn build_pipeline(config: Config) -> anyhow::Result<(PipelineDeps, Arc<Registry>)> {
    let app_dir = config.app_dir();
    std::fs::create_dir_all(&app_dir)
        .with_context(|| format!("failed to create app directory: {}", app_dir.display()))?;

    let options = SqliteConnectOptions::new()
        .filename(config.catalog_path())
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await
        .context("failed to open the catalog database")?;

    let catalog = Catalog::new(pool.clone());
    catalog.initialize().await?;

    let queue = SqliteTaskQueue::new(pool);
    queue.initialize().await?;

    let timeout = config.gateways.timeout;
    let crawl = config
        .gateways
        .crawl_url
        .as_ref()
        .map(|url| HttpCrawlGateway::new(url.clone(), timeout))
        .transpose()?
        .map(|gateway| Arc::new(gateway) as Arc<dyn lifedb::gateway::CrawlGateway>);
    let media = config
        .gateways
        .media_url
        .as_ref()
        .map(|url| HttpMediaGateway::new(url.clone(), timeout))
        .transpose()?
        .map(|gateway| Arc::new(gateway) as Arc<dyn lifedb::gateway::MediaGateway>);
    let llm = config
        .gateways
        .llm_url
        .as_ref()
        .map(|url| HttpLlmGateway::new(url.clone(), timeout))
        .transpose()?
        .map(|gateway| Arc::new(gateway) as Arc<dyn lifedb::gateway::LlmGateway>);

    if crawl.is_none() {
        tracing::warn!("no crawl gateway configured; URL digesters will be skipped");
    }
    if media.is_none() {
        tracing::warn!("no media gateway configured; document/OCR/speech digesters will be skipped");
    }
    if llm.is_none() {
        tracing::warn!("no LLM gateway configured; summary/tags/slug digesters will be skipped");
    }

    let registry = Arc::new(digesters::default_registry()?);

    let deps = PipelineDeps {
        blobs: BlobStore::new(config.blob_root()),
        catalog,
        crawl,
        media,
        llm,
        index_queue: IndexQueue::new(Arc::new(queue)),
        config: Arc::new(config),
    };

    Ok((deps, registry))
}

async fn cmd_run(config: Config) -> anyhow::Result<()> {
    let (deps, registry) = build_pipeline(config).await?;

    let scanner = Scanner::new(deps.clone(), registry.clone());
    scanner.scan_all().await?;
    ensure::ensure_all_files(&deps.catalog, &registry).await?;

    // The pipeline still runs from periodic scans if the watcher cannot start.
    let watcher = match FileWatcher::start(
        &deps.config.data_root,
        &deps.config.digest.excluded_path_prefixes,
    ) {
        Ok(watcher) => Some(watcher),
        Err(error) => {
            tracing::warn!(%error, "filesystem watcher unavailable, relying on scans");
            None
        }
    };

    let cancel = CancellationToken::new();
    let supervisor = Supervisor::new(deps, registry, cancel.clone());
    let handle = supervisor.spawn(watcher.as_ref().map(FileWatcher::subscribe));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    tracing::info!("shutdown requested");
    cancel.cancel();

    handle.await.context("supervisor task panicked")?;
    Ok(())
}

async fn cmd_scan(config: Config) -> anyhow::Result<()> {
    let (deps, registry) = build_pipeline(config).await?;

    let summary = Scanner::new(deps.clone(), registry.clone())
        .scan_all()
        .await?;
    ensure::ensure_all_files(&deps.catalog, &registry).await?;

    println!(
        "scanned {} files, {} folders, pruned {}",
        summary.files, summary.folders, summary.pruned
    );
    Ok(())
}

async fn cmd_reset(config: Config, path: String, digester: Option<String>) -> anyhow::Result<()> {
    let (deps, registry) = build_pipeline(config).await?;

    let outcome = Coordinator::new(deps, registry)
        .process(&path, CoordinateOptions { reset: true, digester })
        .await?;

    println!("{outcome:?}");
    Ok(())
}

async fn cmd_status(config: Config) -> anyhow::Result<()> {
    let (deps, _registry) = build_pipeline(config).await?;

    let counts = deps.catalog.digests.status_counts().await?;
    if counts.is_empty() {
        println!("no digests recorded yet");
        return Ok(());
    }

    for (digester, status, count) in counts {
        println!("{digester:<24} {:<12} {count:>6}", status.as_str());
    }
    Ok(())
}
