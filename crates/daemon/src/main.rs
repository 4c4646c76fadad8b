// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tether daemon (tetherd)
//!
//! Long-lived server brokering WebSocket clients to a local coding-agent
//! CLI, one project directory at a time.
//!
//! Architecture:
//! - Listener task: accepts connections, one task per session
//! - Execution engine: at most one CLI child per project, streamed out
//! - Resource monitor: samples memory/threads, broadcasts server stats

use std::path::Path;

use tether_daemon::lifecycle::{self, Config, LifecycleError, StartupResult};
use tether_daemon::{env, resources};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Handle info flags before any config/lock acquisition
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("tetherd {}", env::VERSION);
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("tetherd {}", env::VERSION);
                println!("Tether daemon - brokers remote clients to a local coding-agent CLI");
                println!();
                println!("USAGE:");
                println!("    tetherd");
                println!();
                println!("Configuration comes from TETHER_* environment variables,");
                println!("e.g. TETHER_DATA_DIR, TETHER_LISTEN_ADDR, TETHER_CLI_BIN.");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help       Print help information");
                println!("    -v, --version    Print version information");
                return Ok(());
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: tetherd [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    let config = Config::load()?;

    // Rotate the log file if it has grown too large
    rotate_log_if_needed(&config.log_path());

    let log_guard = setup_logging(&config)?;
    info!(version = env::VERSION, "starting tetherd");

    let StartupResult { ctx, listener, lock_file: _lock_file } =
        match lifecycle::startup(config).await {
            Ok(r) => r,
            Err(LifecycleError::LockFailed(path)) => {
                let pid = std::fs::read_to_string(&path).unwrap_or_default().trim().to_string();
                eprintln!("tetherd is already running");
                if !pid.is_empty() {
                    eprintln!("  pid: {pid}");
                }
                std::process::exit(1);
            }
            Err(e) => {
                error!("failed to start daemon: {e}");
                drop(log_guard);
                return Err(e.into());
            }
        };

    tokio::spawn(tether_daemon::server::run_listener(listener, ctx.clone()));

    tokio::spawn(resources::run_monitor(
        ctx.clock.clone(),
        ctx.config.clone(),
        ctx.resources.clone(),
        ctx.registry.clone(),
        ctx.sessions.clone(),
        ctx.started_at,
        ctx.shutdown.clone(),
    ));

    // Signal ready for whatever supervises us
    println!("READY");

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sighup = signal(SignalKind::hangup())?;

    loop {
        tokio::select! {
            _ = sigterm.recv() => {
                info!("received SIGTERM, shutting down");
                break;
            }
            _ = sigint.recv() => {
                info!("received SIGINT, shutting down");
                break;
            }
            _ = sighup.recv() => {
                // Reserved for future config reload
                info!("received SIGHUP, ignoring");
            }
        }
    }

    lifecycle::shutdown(&ctx).await;
    info!("daemon stopped");
    Ok(())
}

/// Rename an oversized log aside so the daemon starts on a fresh file.
fn rotate_log_if_needed(log_path: &Path) {
    const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;
    if let Ok(meta) = std::fs::metadata(log_path) {
        if meta.len() > MAX_LOG_BYTES {
            let old = log_path.with_extension("log.old");
            let _ = std::fs::rename(log_path, old);
        }
    }
}

fn setup_logging(
    config: &Config,
) -> Result<tracing_appender::non_blocking::WorkerGuard, LifecycleError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let log_path = config.log_path();
    std::fs::create_dir_all(&config.data_dir)?;

    let file_appender = tracing_appender::rolling::never(
        log_path.parent().ok_or(LifecycleError::NoDataDir)?,
        log_path.file_name().ok_or(LifecycleError::NoDataDir)?,
    );
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::builder()
        .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
        .with_env_var("TETHER_LOG")
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    Ok(guard)
}
