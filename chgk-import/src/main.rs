//! chgk-import - quiz package import service
//!
//! `serve` (default) runs the job orchestrator and the status API.
//! `parse` runs the structural parser on a block feed and prints the result,
//! which is handy when tuning documents that import badly.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use chgk_common::config::{resolve_config_path, resolve_root_folder, RootLayout, TomlConfig};
use chgk_import::jobs::extractor::title_from_file_name;
use chgk_import::models::DocumentFeed;
use chgk_import::{build_router, parse_blocks, AppState, JobOrchestrator, ParserOptions};

/// Command-line arguments for chgk-import
#[derive(Parser, Debug)]
#[command(name = "chgk-import")]
#[command(about = "Quiz package import service")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "CHGK_CONFIG")]
    config: Option<PathBuf>,

    /// Root folder for database, working directories and media
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the orchestrator and HTTP API (default)
    Serve,
    /// Parse a JSON block feed and print the package tree
    Parse {
        /// Block feed file
        input: PathBuf,
    },
}

fn init_tracing(default_level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .context("Invalid log level")?;
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref());
    let config = TomlConfig::load(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    init_tracing(&config.logging.level)?;

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(args.root_folder, config).await,
        Command::Parse { input } => parse_file(&input),
    }
}

fn parse_file(input: &std::path::Path) -> Result<()> {
    let text = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let feed: DocumentFeed = serde_json::from_str(text.trim_start_matches('\u{FEFF}'))
        .context("Not a block feed")?;

    let options = ParserOptions {
        fallback_title: feed
            .source_file_name
            .as_deref()
            .or_else(|| input.file_name().and_then(|n| n.to_str()))
            .and_then(title_from_file_name),
    };
    let result = parse_blocks(&feed.blocks, &options);

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn serve(root_arg: Option<PathBuf>, config: TomlConfig) -> Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        git_hash = env!("GIT_HASH"),
        built = env!("BUILD_TIMESTAMP"),
        profile = env!("BUILD_PROFILE"),
        "Starting chgk-import"
    );

    let root_folder = resolve_root_folder(root_arg.as_deref(), &config);
    let layout = RootLayout::new(root_folder);
    layout
        .ensure_directories()
        .context("Failed to initialize root folder")?;
    info!("Root folder: {}", layout.root.display());

    let db_pool = chgk_common::db::init_database(&layout.database_path())
        .await
        .context("Failed to open database")?;
    info!("Database: {}", layout.database_path().display());

    let orchestrator = Arc::new(
        JobOrchestrator::new(db_pool.clone(), &layout, config.import.clone())
            .context("Failed to create job orchestrator")?,
    );
    let state = AppState::new(
        db_pool,
        config.import.clone(),
        orchestrator.supported_extensions(),
    );

    let shutdown = CancellationToken::new();
    let worker = tokio::spawn(Arc::clone(&orchestrator).run(shutdown.clone()));

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&config.http.bind_address)
        .await
        .with_context(|| format!("Failed to bind to {}", config.http.bind_address))?;
    info!("Listening on http://{}", config.http.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .context("Server error")?;

    shutdown.cancel();
    worker
        .await
        .context("Orchestrator task panicked")?
        .context("Orchestrator failed")?;

    info!("Shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM, or when `shutdown` is cancelled elsewhere
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
        _ = shutdown.cancelled() => {}
    }
}
