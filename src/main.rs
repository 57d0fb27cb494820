//! Prosperous Universe Data Sync
//!
//! Syncs community price/shipping sheets and FIO inventory/production data
//! to SQLite. Runs continuously with daily sync scheduling.

use clap::Parser;
use prun_sync::{config, database, scheduler::Scheduler, sync, CancelToken};
use rusqlite::Connection;
use std::path::PathBuf;

/// Prosperous Universe data sync - community price sheets and FIO data to SQLite
#[derive(Parser, Debug)]
#[command(name = "prun_sync")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the SQLite database file
    #[arg(short, long, default_value_t = default_db_path())]
    database: String,

    /// Run interactive setup and exit
    #[arg(short, long, default_value_t = false)]
    setup: bool,

    /// Run a single sync pass and exit (default: run continuously)
    #[arg(long, default_value_t = false)]
    once: bool,
}

/// Returns the default database path: ~/.local/share/prun_sync/prun.db
fn default_db_path() -> String {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("prun_sync")
        .join("prun.db")
        .to_string_lossy()
        .to_string()
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let db_path = PathBuf::from(&args.database);

    log::info!("Starting prun_sync...");
    log::info!("Database path: {}", db_path.display());

    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        if !parent.exists() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                log::error!("Failed to create database directory: {}", e);
                std::process::exit(1);
            }
            log::info!("Created directory: {}", parent.display());
        }
    }

    let mut conn = match Connection::open(&db_path) {
        Ok(conn) => {
            log::info!("Opened database: {}", db_path.display());
            conn
        }
        Err(e) => {
            log::error!("Failed to open database: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = database::init_schema(&conn) {
        log::error!("Failed to initialize database schema: {}", e);
        std::process::exit(1);
    }

    if args.setup {
        if let Err(e) = config::run_setup(&mut conn).await {
            log::error!("Setup failed: {}", e);
            std::process::exit(1);
        }
        return;
    }

    if args.once {
        match sync::perform_sync(&mut conn).await {
            Ok(report) => log::info!("Sync completed: {}", report),
            Err(e) => {
                log::error!("Sync failed: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    // Continuous mode: signal handlers flip the token, the scheduler
    // observes it once per iteration and exits cleanly
    let cancel = CancelToken::new();
    spawn_signal_handlers(&cancel);

    Scheduler::new(cancel).run(&mut conn).await;
}

fn spawn_signal_handlers(cancel: &CancelToken) {
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Received Ctrl+C, shutting down gracefully...");
            token.cancel();
        }
    });

    #[cfg(unix)]
    {
        let token = cancel.clone();
        tokio::spawn(async move {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut term) => {
                    term.recv().await;
                    log::info!("Received SIGTERM, shutting down gracefully...");
                    token.cancel();
                }
                Err(e) => log::warn!("Could not install SIGTERM handler: {}", e),
            }
        });
    }
}
