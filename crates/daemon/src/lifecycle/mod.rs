// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle: configuration, startup, shutdown.

mod shutdown;
mod startup;

pub use shutdown::shutdown;
pub use startup::{startup, StartupResult};

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::env;
use crate::logstore::RotateLimits;

/// Daemon configuration.
///
/// The full surface with its defaults; `load()` applies `TETHER_*`
/// environment overrides. Argument parsing is out of scope for the daemon
/// binary.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP listen address, e.g. `127.0.0.1:9190`.
    pub listen_addr: String,
    /// TLS material paths. Termination itself is handled in front of the
    /// daemon; when set, startup logs a notice.
    pub tls_cert: Option<PathBuf>,
    pub tls_key: Option<PathBuf>,
    /// Root state directory.
    pub data_dir: PathBuf,

    pub max_connections: usize,
    pub max_projects: usize,
    pub max_concurrent_executions: usize,
    /// Largest accepted WebSocket message, in bytes.
    pub max_frame_bytes: usize,

    pub execution_timeout: Duration,
    /// Close sessions with no inbound data frames for this long.
    pub idle_timeout: Duration,
    pub ping_interval: Duration,
    pub pong_timeout: Duration,
    /// Deadline applied to every outbound frame.
    pub write_timeout: Duration,
    /// Wait after SIGTERM before escalating to SIGKILL.
    pub graceful_kill_window: Duration,
    /// Wait after SIGKILL before declaring the process stuck.
    pub force_kill_window: Duration,
    /// Bound on draining in-flight executions at shutdown.
    pub shutdown_drain: Duration,
    pub stats_interval: Duration,

    pub rotation_bytes: u64,
    pub rotation_entries: usize,

    /// The coding-agent CLI. Resolved against PATH at startup when not
    /// absolute.
    pub cli_binary: PathBuf,
    pub cli_allowed_tools: Vec<String>,
    pub cli_disallowed_tools: Vec<String>,

    pub memory_soft_cap_mb: u64,
    pub thread_soft_cap: usize,
}

impl Config {
    /// Defaults rooted at the given data directory.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            listen_addr: "127.0.0.1:9190".to_string(),
            tls_cert: None,
            tls_key: None,
            data_dir: data_dir.into(),
            max_connections: 100,
            max_projects: 100,
            max_concurrent_executions: 10,
            max_frame_bytes: 1024 * 1024,
            execution_timeout: Duration::from_secs(300),
            idle_timeout: Duration::from_secs(300),
            ping_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(10),
            graceful_kill_window: Duration::from_secs(2),
            force_kill_window: Duration::from_secs(5),
            shutdown_drain: Duration::from_secs(30),
            stats_interval: Duration::from_secs(30),
            rotation_bytes: 100 * 1024 * 1024,
            rotation_entries: 10_000,
            cli_binary: PathBuf::from("claude"),
            cli_allowed_tools: Vec::new(),
            cli_disallowed_tools: Vec::new(),
            memory_soft_cap_mb: 1024,
            thread_soft_cap: 500,
        }
    }

    /// Load configuration from the environment.
    pub fn load() -> Result<Self, LifecycleError> {
        let data_dir = env::data_dir().ok_or(LifecycleError::NoDataDir)?;
        let mut config = Self::with_data_dir(data_dir);

        if let Some(addr) = env::string("TETHER_LISTEN_ADDR") {
            config.listen_addr = addr;
        }
        config.tls_cert = env::path("TETHER_TLS_CERT");
        config.tls_key = env::path("TETHER_TLS_KEY");
        if let Some(bin) = env::path("TETHER_CLI_BIN") {
            config.cli_binary = bin;
        }
        if let Some(tools) = env::list("TETHER_ALLOWED_TOOLS") {
            config.cli_allowed_tools = tools;
        }
        if let Some(tools) = env::list("TETHER_DISALLOWED_TOOLS") {
            config.cli_disallowed_tools = tools;
        }

        if let Some(n) = env::count("TETHER_MAX_CONNECTIONS") {
            config.max_connections = n;
        }
        if let Some(n) = env::count("TETHER_MAX_PROJECTS") {
            config.max_projects = n;
        }
        if let Some(n) = env::count("TETHER_MAX_EXECUTIONS") {
            config.max_concurrent_executions = n;
        }
        if let Some(n) = env::count("TETHER_MAX_FRAME_BYTES") {
            config.max_frame_bytes = n;
        }
        if let Some(n) = env::bytes("TETHER_ROTATION_BYTES") {
            config.rotation_bytes = n;
        }
        if let Some(n) = env::count("TETHER_ROTATION_ENTRIES") {
            config.rotation_entries = n;
        }
        if let Some(n) = env::bytes("TETHER_MEM_SOFT_CAP_MB") {
            config.memory_soft_cap_mb = n;
        }
        if let Some(n) = env::count("TETHER_THREAD_SOFT_CAP") {
            config.thread_soft_cap = n;
        }

        if let Some(d) = env::millis("TETHER_EXEC_TIMEOUT_MS") {
            config.execution_timeout = d;
        }
        if let Some(d) = env::millis("TETHER_IDLE_TIMEOUT_MS") {
            config.idle_timeout = d;
        }
        if let Some(d) = env::millis("TETHER_PING_INTERVAL_MS") {
            config.ping_interval = d;
        }
        if let Some(d) = env::millis("TETHER_PONG_TIMEOUT_MS") {
            config.pong_timeout = d;
        }
        if let Some(d) = env::millis("TETHER_WRITE_TIMEOUT_MS") {
            config.write_timeout = d;
        }
        if let Some(d) = env::millis("TETHER_DRAIN_TIMEOUT_MS") {
            config.shutdown_drain = d;
        }
        if let Some(d) = env::millis("TETHER_STATS_INTERVAL_MS") {
            config.stats_interval = d;
        }

        Ok(config)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.data_dir.join("daemon.pid")
    }

    pub fn version_path(&self) -> PathBuf {
        self.data_dir.join("daemon.version")
    }

    pub fn log_path(&self) -> PathBuf {
        self.data_dir.join("daemon.log")
    }

    pub fn rotate_limits(&self) -> RotateLimits {
        RotateLimits { bytes: self.rotation_bytes, entries: self.rotation_entries }
    }
}

/// Errors during startup and shutdown.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("cannot determine data directory (no TETHER_DATA_DIR or home)")]
    NoDataDir,

    #[error("another daemon holds the lock at {0}")]
    LockFailed(PathBuf),

    #[error("CLI binary not found: {0}")]
    CliMissing(PathBuf),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] crate::store::StoreError),

    #[error(transparent)]
    Log(#[from] crate::logstore::LogError),
}
