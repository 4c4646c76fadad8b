// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon startup: lock, CLI check, recovery, listener bind.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fs2::FileExt;
use tether_core::{ProjectState, SystemClock};
use tether_core::Clock;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{Config, LifecycleError};
use crate::env;
use crate::executor::ExecutionEngine;
use crate::logstore::MessageLog;
use crate::registry::{ProjectHandle, ProjectRegistry};
use crate::resources::ResourceManager;
use crate::server::{ListenCtx, SessionTable};
use crate::store::ProjectStore;

/// Everything a running daemon needs.
///
/// The listener is returned separately so the caller can spawn the accept
/// loop; the lock file is held for the daemon's lifetime and released on
/// drop.
pub struct StartupResult {
    pub ctx: Arc<ListenCtx<SystemClock>>,
    pub listener: TcpListener,
    // NOTE(lifetime): held to maintain the exclusive file lock
    #[allow(dead_code)]
    pub lock_file: File,
}

impl std::fmt::Debug for StartupResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StartupResult").finish_non_exhaustive()
    }
}

/// Bring the daemon up: lock the data dir, validate the CLI, load projects
/// from disk, bind the listener.
pub async fn startup(mut config: Config) -> Result<StartupResult, LifecycleError> {
    fs::create_dir_all(&config.data_dir)?;
    let lock_file = acquire_lock(&config)?;
    fs::write(config.version_path(), env::VERSION)?;

    config.cli_binary = resolve_cli(&config.cli_binary)?;
    info!(cli = %config.cli_binary.display(), "CLI binary resolved");

    if config.tls_cert.is_some() || config.tls_key.is_some() {
        info!("TLS material configured; termination is expected in front of the daemon");
    }

    let clock = SystemClock;
    let store = Arc::new(ProjectStore::new(&config.data_dir));
    fs::create_dir_all(store.root())?;
    let registry = Arc::new(ProjectRegistry::new(config.max_projects));

    for mut project in store.load_all()? {
        // No execution survived the previous daemon.
        if project.state == ProjectState::Executing {
            warn!(project_id = %project.id, "demoting project interrupted by restart");
            project.state = ProjectState::Error;
            project.error_details = "interrupted by restart".to_string();
            if let Err(e) = store.save(&project) {
                warn!(project_id = %project.id, error = %e, "failed to persist demoted project");
            }
        }

        let log = match MessageLog::open(
            store.logs_dir(&project.id),
            config.rotate_limits(),
            clock.epoch_ms(),
        ) {
            Ok(log) => log,
            Err(e) => {
                warn!(project_id = %project.id, error = %e, "skipping project with unopenable log");
                continue;
            }
        };

        let id = project.id;
        if let Err(e) = registry.insert(ProjectHandle::new(project, log)) {
            warn!(project_id = %id, error = %e, "skipping project violating registry invariants");
        }
    }

    let listener = TcpListener::bind(&config.listen_addr).await.map_err(|source| {
        LifecycleError::Bind { addr: config.listen_addr.clone(), source }
    })?;

    let config = Arc::new(config);
    let resources = Arc::new(ResourceManager::new(&config));
    let engine = Arc::new(ExecutionEngine::new(
        Arc::clone(&config),
        clock.clone(),
        Arc::clone(&store),
        Arc::clone(&resources),
    ));
    let sessions = Arc::new(SessionTable::new());

    let ctx = Arc::new(ListenCtx {
        started_at: clock.now(),
        clock,
        registry,
        store,
        engine,
        resources,
        sessions,
        shutdown: CancellationToken::new(),
        config,
    });

    info!(
        addr = %ctx.config.listen_addr,
        projects = ctx.registry.count(),
        "daemon ready"
    );
    Ok(StartupResult { ctx, listener, lock_file })
}

/// Exclusive advisory lock on the pid file; one daemon per data dir.
fn acquire_lock(config: &Config) -> Result<File, LifecycleError> {
    let path = config.lock_path();
    let file = OpenOptions::new().create(true).write(true).open(&path)?;
    file.try_lock_exclusive().map_err(|_| LifecycleError::LockFailed(path))?;
    file.set_len(0)?;
    writeln!(&file, "{}", std::process::id())?;
    Ok(file)
}

/// Resolve the configured CLI binary, searching PATH for bare names.
/// A missing CLI is a fatal startup error.
fn resolve_cli(binary: &Path) -> Result<PathBuf, LifecycleError> {
    if binary.components().count() > 1 || binary.is_absolute() {
        if is_executable(binary) {
            return Ok(binary.to_path_buf());
        }
        return Err(LifecycleError::CliMissing(binary.to_path_buf()));
    }

    let path_var = std::env::var_os("PATH").unwrap_or_default();
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(binary);
        if is_executable(&candidate) {
            return Ok(candidate);
        }
    }
    Err(LifecycleError::CliMissing(binary.to_path_buf()))
}

#[cfg(unix)]
fn is_executable(path: &std::path::Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &std::path::Path) -> bool {
    path.is_file()
}

#[cfg(test)]
#[path = "startup_tests.rs"]
mod tests;
