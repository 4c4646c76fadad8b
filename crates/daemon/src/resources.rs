// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resource accounting and the background monitor.
//!
//! Connection and execution slots are counted here and checked at
//! admission; the monitor task samples process memory and thread count,
//! warns above the soft caps, and broadcasts `server_stats` to every
//! connected session.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tether_core::Clock;
use tether_wire::{ServerMessage, ServerStats};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::lifecycle::Config;
use crate::registry::ProjectRegistry;
use crate::server::SessionTable;

/// Connection/execution slot accounting.
pub struct ResourceManager {
    max_connections: usize,
    max_executions: usize,
    memory_soft_cap_mb: u64,
    thread_soft_cap: usize,
    connections: AtomicUsize,
    executions: AtomicUsize,
}

impl ResourceManager {
    pub fn new(config: &Config) -> Self {
        Self {
            max_connections: config.max_connections,
            max_executions: config.max_concurrent_executions,
            memory_soft_cap_mb: config.memory_soft_cap_mb,
            thread_soft_cap: config.thread_soft_cap,
            connections: AtomicUsize::new(0),
            executions: AtomicUsize::new(0),
        }
    }

    fn try_acquire(counter: &AtomicUsize, max: usize) -> bool {
        let mut current = counter.load(Ordering::Relaxed);
        loop {
            if current >= max {
                return false;
            }
            match counter.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    pub fn try_acquire_connection(&self) -> bool {
        Self::try_acquire(&self.connections, self.max_connections)
    }

    pub fn release_connection(&self) {
        self.connections.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn try_acquire_execution(&self) -> bool {
        Self::try_acquire(&self.executions, self.max_executions)
    }

    pub fn release_execution(&self) {
        self.executions.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::Relaxed)
    }
}

/// Resident set size in MiB, from procfs. Zero where unavailable.
pub fn sample_memory_mb() -> u64 {
    proc_status_value("VmRSS:").map(|kb| kb / 1024).unwrap_or(0)
}

/// OS thread count of this process, from procfs. Zero where unavailable.
pub fn sample_threads() -> usize {
    proc_status_value("Threads:").unwrap_or(0) as usize
}

#[cfg(target_os = "linux")]
fn proc_status_value(key: &str) -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    let line = status.lines().find(|l| l.starts_with(key))?;
    line.split_whitespace().nth(1)?.parse().ok()
}

#[cfg(not(target_os = "linux"))]
fn proc_status_value(_key: &str) -> Option<u64> {
    None
}

/// Background monitor: sample, warn on soft-cap breaches, broadcast stats.
pub async fn run_monitor<C: Clock>(
    clock: C,
    config: Arc<Config>,
    resources: Arc<ResourceManager>,
    registry: Arc<ProjectRegistry>,
    sessions: Arc<SessionTable>,
    started_at: Instant,
    shutdown: CancellationToken,
) {
    let mut interval = tokio::time::interval(config.stats_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.cancelled() => break,
        }

        let memory_mb = sample_memory_mb();
        let threads = sample_threads();

        if memory_mb > resources.memory_soft_cap_mb {
            warn!(memory_mb, cap_mb = resources.memory_soft_cap_mb, "memory above soft cap");
        }
        if threads > resources.thread_soft_cap {
            warn!(threads, cap = resources.thread_soft_cap, "thread count above soft cap");
        }

        let stats = ServerStats {
            connections: resources.connections(),
            projects: registry.count(),
            active_executions: resources.executions(),
            memory_mb,
            threads,
            uptime_secs: clock.now().saturating_duration_since(started_at).as_secs(),
        };
        debug!(?stats, "resource sample");

        let frame = ServerMessage::server_stats(&stats, clock.wall());
        for session in sessions.snapshot() {
            // Broken peers close themselves; the session table is pruned
            // by each session's own cleanup path.
            let _ = session.send(&frame).await;
        }
    }
}

#[cfg(test)]
#[path = "resources_tests.rs"]
mod tests;
