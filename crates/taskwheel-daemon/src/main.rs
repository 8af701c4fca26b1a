use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use taskwheel_core::config::TaskwheelConfig;
use taskwheel_engine::{HandlerRegistry, JobService, SchedulerEngine};
use taskwheel_handlers::{EchoHandler, NotifyHandler};
use taskwheel_store::JobStore;

/// Standalone scheduler daemon: evaluates job schedules once per tick and
/// dispatches whatever is due.
#[derive(Parser)]
#[command(name = "taskwheel", version, about)]
struct Args {
    /// Path to taskwheel.toml (overrides TASKWHEEL_CONFIG)
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "taskwheel=info,taskwheel_engine=info".into()),
        )
        .init();

    let args = Args::parse();

    // load config: explicit path > TASKWHEEL_CONFIG env > taskwheel.toml
    let config_path = args.config.or_else(|| std::env::var("TASKWHEEL_CONFIG").ok());
    let config = TaskwheelConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("config load failed ({e}), using defaults");
        TaskwheelConfig::default()
    });

    let db_path = &config.database.path;
    ensure_parent_dir(db_path);
    info!(path = %db_path, "opening SQLite database");

    // Schema migrations are idempotent and run on the first connection;
    // each subsystem then gets its own connection for thread safety.
    let open = |path: &str| -> anyhow::Result<rusqlite::Connection> {
        let conn = rusqlite::Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        Ok(conn)
    };

    let mut registry = HandlerRegistry::new();
    registry.register(Arc::new(EchoHandler));
    registry.register(Arc::new(NotifyHandler::default()));
    let registry = Arc::new(registry);
    info!(kinds = ?registry.kinds(), "job handlers registered");

    let service = JobService::new(
        Arc::new(JobStore::new(open(db_path)?)?),
        Arc::clone(&registry),
    );
    let engine = SchedulerEngine::new(
        Arc::new(JobStore::new(open(db_path)?)?),
        registry,
        config.scheduler.clone(),
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    // history retention loop: one purge pass per day
    let retention_days = config.scheduler.retention_days;
    let mut purge_shutdown = shutdown_rx.clone();
    let purge_task = tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(24 * 60 * 60));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match service.purge_older_than(chrono::Duration::days(retention_days as i64)) {
                        Ok(counts) => info!(
                            executions = counts.executions,
                            system_ops = counts.system_ops,
                            "history purge complete"
                        ),
                        Err(e) => warn!(err = %e, "history purge failed"),
                    }
                }
                _ = purge_shutdown.changed() => {
                    if *purge_shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    });

    let engine_task = tokio::spawn(async move { engine.run(shutdown_rx).await });

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    let _ = engine_task.await;
    let _ = purge_task.await;
    Ok(())
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
