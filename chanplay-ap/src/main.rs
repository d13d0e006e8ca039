//! chanplay Audio Player - Main entry point
//!
//! Loads the bootstrap config, wires the channel registry and serves the
//! HTTP control API until Ctrl+C/SIGTERM, then stops every channel.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chanplay_ap::api::{self, AppContext};
use chanplay_ap::config::Config;
use chanplay_ap::db::FileStore;
use chanplay_ap::playback::FfmpegTranscoder;
use chanplay_ap::request::{ParserChain, RequestContext};
use chanplay_ap::sink::FileSinkFactory;
use chanplay_ap::ChannelRegistry;
use chanplay_common::config::TomlConfig;
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for chanplay-ap
#[derive(Parser, Debug)]
#[command(name = "chanplay-ap")]
#[command(about = "Per-channel audio queue player")]
#[command(version)]
struct Args {
    /// Bootstrap config file (TOML)
    #[arg(short, long, env = "CHANPLAY_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "CHANPLAY_PORT")]
    port: Option<u16>,

    /// Directory receiving per-channel PCM output
    #[arg(short, long, env = "CHANPLAY_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Number of requests resolved ahead of playback
    #[arg(long)]
    preload_window: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let toml = TomlConfig::load_resolved(args.config.as_deref())
        .context("Failed to load configuration")?;
    let mut config = Config::from_toml(toml);
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(dir) = args.output_dir {
        config.output_dir = dir;
    }
    if let Some(window) = args.preload_window {
        config.worker.preload_window = window;
    }

    // RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("chanplay_ap={0},chanplay_common={0},tower_http=info", config.log_level)
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    config
        .worker
        .validate()
        .context("Invalid worker configuration")?;

    info!("Starting chanplay-ap on port {}", config.port);
    info!("Channel output directory: {}", config.output_dir.display());

    let transcoder = Arc::new(FfmpegTranscoder::new(config.ffmpeg_path.clone()));
    let mut request_ctx = RequestContext::new(transcoder)
        .with_allowed_hosts(config.allowed_hosts.clone())
        .with_debug_sources(config.enable_debug_sources);

    if let Some(path) = &config.store_database {
        let store = FileStore::open(path)
            .await
            .with_context(|| format!("Failed to open file store {}", path.display()))?;
        request_ctx = request_ctx.with_store(store);
    }

    let parsers = ParserChain::from_context(&request_ctx);
    info!("Request parsers: {}", parsers.parser_names().join(", "));

    let sinks = Arc::new(FileSinkFactory::new(
        config.output_dir.clone(),
        config.realtime_output,
    ));
    let registry = Arc::new(ChannelRegistry::new(sinks, parsers, config.worker.clone()));

    let app = api::create_router(AppContext {
        registry: registry.clone(),
        port: config.port,
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    registry.shutdown().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
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
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
