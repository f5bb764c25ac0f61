//! Chamador TV - Main entry point
//!
//! Opens the datastore, wires the host bridges into the TV engine, runs the
//! scheduler, and serves the admin/TV HTTP API until shutdown.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chamador_common::config::{default_config_path, resolve_database_path, TomlConfig};
use chamador_common::db::{init_database, CallStore};
use chamador_common::events::EventBus;
use chamador_common::feed::EventFeed;
use chamador_common::time::SystemClock;
use chamador_tv::api::{self, AppContext};
use chamador_tv::context::TvContext;
use chamador_tv::ducking::BroadcastPlayer;
use chamador_tv::scheduler::{Scheduler, SchedulerOptions};
use chamador_tv::speech::{CommandSpeech, EventToneSink, PageSpeech, SpeechBackends, ToneSink};
use clap::Parser;
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Event bus capacity (SSE clients lag beyond this)
const EVENT_BUS_CAPACITY: usize = 256;

/// Command-line arguments for chamador-tv
#[derive(Parser, Debug)]
#[command(name = "chamador-tv")]
#[command(about = "Clinic patient-calling TV display")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "CHAMADOR_PORT")]
    port: Option<u16>,

    /// SQLite database file
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// TOML bootstrap config file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let toml = TomlConfig::load_or_default(args.config.as_deref());
    init_tracing(&toml)?;
    report_config_source(args.config.as_deref());

    let port = args.port.unwrap_or_else(|| toml.port_or_default());
    let db_path = resolve_database_path(args.database.as_deref(), &toml);
    info!("Starting Chamador TV on port {}", port);
    info!("Database: {}", db_path.display());

    let pool = init_database(&db_path)
        .await
        .context("Failed to open database")?;
    let store = CallStore::new(pool, Arc::new(SystemClock))
        .await
        .context("Failed to load datastore")?;

    // Host bridges
    let bus = Arc::new(EventBus::new(EVENT_BUS_CAPACITY));
    let player = Arc::new(BroadcastPlayer::new(Arc::clone(&bus)));
    let page_speech = Arc::new(PageSpeech::new(Arc::clone(&bus)));
    let speech = SpeechBackends::new(
        Arc::new(CommandSpeech::detect()),
        page_speech.clone(),
        tone_sink(&bus),
    );

    let tv = Arc::new(TvContext::new(Arc::clone(&bus), player, speech));
    let feed: Arc<dyn EventFeed> = store.feed();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = Scheduler::new(Arc::clone(&tv), feed, SchedulerOptions::default());
    let scheduler_task = tokio::spawn(scheduler.run(shutdown_rx));

    let ctx = AppContext {
        store,
        tv,
        page_speech,
    };
    api::run(ctx, port, shutdown_signal())
        .await
        .context("HTTP server failed")?;

    let _ = shutdown_tx.send(true);
    if let Err(e) = scheduler_task.await {
        warn!("Scheduler task ended abnormally: {}", e);
    }

    info!("Shutdown complete");
    Ok(())
}

/// Tracing from `RUST_LOG`, else the configured level; stderr or the configured file
fn init_tracing(toml: &TomlConfig) -> Result<()> {
    let level = &toml.logging.level;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "chamador_tv={level},chamador_common={level},tower_http=info"
        ))
    });

    match toml.logging.file {
        Some(ref path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                )
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }
    Ok(())
}

/// The config file is read before logging exists; say which one it was
fn report_config_source(explicit: Option<&Path>) {
    let path = explicit.map(Path::to_path_buf).or_else(default_config_path);
    match path {
        Some(p) if p.exists() => info!("Bootstrap config: {}", p.display()),
        _ => info!("Bootstrap config: built-in defaults"),
    }
}

#[cfg(feature = "tone")]
fn tone_sink(bus: &Arc<EventBus>) -> Arc<dyn ToneSink> {
    use chamador_tv::speech::CpalToneSink;
    if CpalToneSink::probe() {
        info!("Beep fallback on the local output device");
        Arc::new(CpalToneSink::new())
    } else {
        warn!("No local output device; beep fallback relayed to the TV page");
        Arc::new(EventToneSink::new(Arc::clone(bus)))
    }
}

#[cfg(not(feature = "tone"))]
fn tone_sink(bus: &Arc<EventBus>) -> Arc<dyn ToneSink> {
    Arc::new(EventToneSink::new(Arc::clone(bus)))
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
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
