//! repost-engine - Main entry point
//!
//! Runs the repost scheduling daemon, or performs a single operator action
//! (status, manual trigger, queue clear, fingerprint match) and exits.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use repost_common::config::{
    database_path, ensure_root_folder, resolve_root_folder, TomlConfig,
};
use repost_common::events::{CycleSource, EventBus};
use repost_common::{time, Fingerprint, Platform};
use repost_engine::{CycleMode, CycleOrchestrator, EngineConfig, FingerprintMatcher, PeriodicTask};
use serde::Serialize;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments for repost-engine
#[derive(Parser, Debug)]
#[command(name = "repost-engine")]
#[command(about = "Content matching and repost scheduling engine")]
#[command(version)]
struct Args {
    /// Root folder holding the database
    #[arg(short, long, global = true)]
    root_folder: Option<PathBuf>,

    /// Path to config.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the scheduler daemon until Ctrl+C or SIGTERM
    Run,
    /// Print queue and trigger status as JSON
    Status,
    /// Run a forced cycle for one platform
    Trigger {
        #[arg(short, long, value_parser = parse_platform)]
        platform: Platform,
    },
    /// Delete every queue entry not currently being processed
    ClearQueue,
    /// Fingerprint a media file and match it against the catalog
    Match {
        #[arg(short, long)]
        file: PathBuf,
        /// Media duration in seconds, when known
        #[arg(short, long)]
        duration: Option<f64>,
    },
}

fn parse_platform(value: &str) -> std::result::Result<Platform, String> {
    value.parse::<Platform>().map_err(|e| e.to_string())
}

/// Filter directive: RUST_LOG wins, else the TOML level applied to both crates
fn log_filter(toml_config: &TomlConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = toml_config.logging.level.trim();
        let directive = if level.contains('=') || level.contains(',') {
            level.to_string()
        } else {
            format!("repost_engine={0},repost_common={0}", level)
        };
        EnvFilter::try_new(&directive)
            .unwrap_or_else(|_| EnvFilter::new("repost_engine=info,repost_common=info"))
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // The TOML file carries the log level, so its notice is logged once the
    // subscriber exists
    let (toml_config, config_notice) = TomlConfig::load_with_notice(args.config.as_deref());

    tracing_subscriber::registry()
        .with(log_filter(&toml_config))
        .with(tracing_subscriber::fmt::layer())
        .init();

    config_notice.log();

    let root_folder = resolve_root_folder(args.root_folder.as_deref(), &toml_config);
    ensure_root_folder(&root_folder).context("Failed to create root folder")?;
    let db_path = database_path(&root_folder, &toml_config);

    info!("Root folder: {}", root_folder.display());

    let pool = repost_common::db::init_database(&db_path)
        .await
        .context("Failed to initialize database")?;
    let config = EngineConfig::from_database(&pool).await;
    let events = EventBus::new(256);

    match args.command {
        Command::Run => run_daemon(pool, config, events).await,
        Command::Status => {
            let orchestrator = CycleOrchestrator::new(pool, config, events);
            let status = orchestrator.status().await.context("Failed to read status")?;
            print_json(&status)
        }
        Command::Trigger { platform } => {
            let orchestrator = CycleOrchestrator::new(pool, config, events);
            let outcome = orchestrator
                .run_cycle(platform, CycleMode::Forced, CycleSource::Manual, time::now())
                .await
                .with_context(|| format!("Repost cycle for {} failed", platform))?;
            print_json(&outcome)
        }
        Command::ClearQueue => {
            let orchestrator = CycleOrchestrator::new(pool, config, events);
            let removed = orchestrator
                .clear_queue(time::now())
                .await
                .context("Failed to clear queue")?;
            print_json(&serde_json::json!({ "removed": removed }))
        }
        Command::Match { file, duration } => {
            let fingerprint = Fingerprint::from_file(&file, duration)
                .await
                .with_context(|| format!("Failed to fingerprint {}", file.display()))?;
            let matcher = FingerprintMatcher::new(pool, config.matcher.clone());
            let result = matcher
                .match_fingerprint(&fingerprint)
                .await
                .context("Fingerprint match failed")?;
            print_json(&serde_json::json!({
                "fingerprint": fingerprint,
                "result": result,
            }))
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", text);
    Ok(())
}

async fn run_daemon(
    pool: sqlx::SqlitePool,
    config: EngineConfig,
    events: EventBus,
) -> Result<()> {
    info!(
        threshold = config.trigger.threshold,
        check_secs = config.trigger_check_interval.as_secs(),
        daily_secs = config.daily_pass_interval.as_secs(),
        "Starting repost scheduler"
    );

    let cancel = CancellationToken::new();
    let log_handle = tokio::spawn(log_events(events.clone(), cancel.clone()));

    let orchestrator = Arc::new(CycleOrchestrator::new(pool.clone(), config.clone(), events));

    let trigger_handle = {
        let orchestrator = orchestrator.clone();
        PeriodicTask::new("trigger-check", config.trigger_check_interval).spawn(
            cancel.clone(),
            move || {
                let orchestrator = orchestrator.clone();
                async move { orchestrator.run_scheduled(time::now()).await }
            },
        )
    };

    let daily_handle = {
        let orchestrator = orchestrator.clone();
        PeriodicTask::new("daily-pass", config.daily_pass_interval)
            .delayed()
            .spawn(cancel.clone(), move || {
                let orchestrator = orchestrator.clone();
                async move { orchestrator.run_daily_pass(time::now()).await }
            })
    };

    shutdown_signal().await;
    cancel.cancel();

    for (name, handle) in [
        ("trigger-check", trigger_handle),
        ("daily-pass", daily_handle),
        ("event-log", log_handle),
    ] {
        if let Err(e) = handle.await {
            warn!(task = name, error = %e, "Task ended abnormally");
        }
    }

    pool.close().await;
    info!("Shutdown complete");
    Ok(())
}

/// Mirror engine events into the log until cancelled
async fn log_events(events: EventBus, cancel: CancellationToken) {
    let mut rx = events.subscribe();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            received = rx.recv() => match received {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => debug!(event = event.event_type(), payload = %json, "Engine event"),
                    Err(e) => warn!(error = %e, "Failed to serialize event"),
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event log fell behind");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
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
