//! Cadence player (cadence-ap) - Main entry point
//!
//! Runs one session against the local transport: resolves each query, plays the
//! queue and writes raw s16le PCM to stdout. Pipe it into a player, e.g.
//! `cadence-ap "some song" | ffplay -f s16le -ar 48000 -ac 2 -`.
//! Logs go to stderr (or the configured log file).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use cadence_ap::config::EngineConfig;
use cadence_ap::pipeline::ProcessPipeline;
use cadence_ap::playback::{EngineServices, PlaybackEngine};
use cadence_ap::registry::SessionRegistry;
use cadence_ap::resolver::YtDlpResolver;
use cadence_ap::transport::LocalTransport;
use cadence_common::config::{resolve_config_path, LoggingConfig};
use cadence_common::events::{RepeatMode, SessionEvent};
use cadence_common::Requester;
use clap::Parser;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{info, warn};

const LOCAL_GUILD: u64 = 0;

/// Command-line arguments for cadence-ap
#[derive(Parser, Debug)]
#[command(name = "cadence-ap")]
#[command(about = "Stream and play audio for a voice session, writing PCM to stdout")]
#[command(version)]
struct Args {
    /// URLs or search text to enqueue, in order
    #[arg(required = true)]
    queries: Vec<String>,

    /// Config file (overrides CADENCE_CONFIG and the user config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Starting volume, 0-200 (clamped)
    #[arg(short, long, env = "CADENCE_VOLUME", allow_hyphen_values = true)]
    volume: Option<i64>,

    /// Repeat mode: off, track or queue
    #[arg(short, long, default_value = "off")]
    repeat: RepeatMode,

    /// Keep playing related tracks after the queue runs out
    #[arg(short, long)]
    autoplay: bool,

    /// Audio filter to apply (repeatable), e.g. --filter bassboost
    #[arg(short, long = "filter")]
    filters: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (config, logging) =
        EngineConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    init_tracing(&logging)?;

    info!(
        "Starting Cadence player (cadence-ap) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("CADENCE_GIT_HASH"),
        env!("CADENCE_BUILD_TIMESTAMP"),
        env!("CADENCE_BUILD_PROFILE")
    );
    match resolve_config_path(args.config.as_deref()) {
        Some(path) => info!("Config: {}", path.display()),
        None => info!("Config: built-in defaults"),
    }

    let config = config
        .with_volume(args.volume)
        .with_autoplay(args.autoplay);

    let resolver = Arc::new(YtDlpResolver::new(config.audio.fetcher_path.clone()));
    let services = EngineServices {
        pipeline: Arc::new(ProcessPipeline::new(config.audio.clone())),
        resolver: resolver.clone(),
        lookup: resolver,
    };

    let registry = SessionRegistry::new(config, services);
    let engine = registry
        .connect(LOCAL_GUILD, Arc::new(LocalTransport::stdout()))
        .await
        .context("Failed to start session")?;

    engine
        .set_repeat_mode(args.repeat)
        .await
        .context("Failed to set repeat mode")?;
    if !args.filters.is_empty() {
        engine
            .set_filters(&args.filters[..])
            .await
            .context("Invalid filter")?;
    }

    let events = engine.subscribe();
    let requester = Requester::new("local", "console");
    let mut enqueued = 0;
    for query in &args.queries {
        match engine.enqueue_query(query, &requester).await {
            Ok(tracks) => enqueued += tracks.len(),
            Err(e) => warn!("Could not enqueue {:?}: {}", query, e),
        }
    }
    if enqueued == 0 {
        registry.destroy(LOCAL_GUILD).await.ok();
        anyhow::bail!("Nothing to play");
    }

    tokio::select! {
        _ = wait_for_finish(&engine, events) => info!("Queue finished"),
        _ = shutdown_signal() => {}
    }

    registry.destroy(LOCAL_GUILD).await.ok();
    info!("Shutdown complete");
    Ok(())
}

/// Initialize tracing; stdout carries PCM so logs never go there
fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));

    match &logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

async fn wait_for_finish(engine: &PlaybackEngine, mut events: broadcast::Receiver<SessionEvent>) {
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(SessionEvent::SessionFinished { .. }) => return,
                Ok(SessionEvent::TrackStarted { track, .. }) => info!("Now playing: {}", track),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => warn!("Missed {} session events", n),
                Err(broadcast::error::RecvError::Closed) => return,
            },
            _ = engine.closed() => return,
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
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
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
