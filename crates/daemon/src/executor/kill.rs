// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-group termination.
//!
//! The child was spawned into its own process group, so one signal reaches
//! it and every subprocess it started. Graceful termination sends SIGTERM
//! and waits a bounded window before escalating to SIGKILL on the whole
//! group; a process that survives SIGKILL past the force window is declared
//! stuck and abandoned so the process table never leaks.

use std::process::ExitStatus;
use std::time::Duration;

use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tokio::process::Child;
use tracing::{debug, error};

#[derive(Debug)]
pub(crate) enum KillDisposition {
    Exited(ExitStatus),
    /// Still alive after SIGKILL and the force window.
    Stuck,
}

pub(crate) fn signal_group(pgid: i32, signal: Signal) {
    if pgid <= 0 {
        return;
    }
    if let Err(e) = killpg(Pid::from_raw(pgid), signal) {
        // ESRCH just means the group is already gone.
        debug!(pgid, signal = %signal, error = %e, "killpg failed");
    }
}

/// Terminate the child's process group.
///
/// `skip_graceful` goes straight to SIGKILL (force kill).
pub(crate) async fn terminate_group(
    child: &mut Child,
    pgid: i32,
    skip_graceful: bool,
    graceful_window: Duration,
    force_window: Duration,
) -> KillDisposition {
    if !skip_graceful {
        signal_group(pgid, Signal::SIGTERM);
        if let Ok(Ok(status)) = tokio::time::timeout(graceful_window, child.wait()).await {
            return KillDisposition::Exited(status);
        }
        debug!(pgid, "graceful window elapsed, escalating to SIGKILL");
    }

    signal_group(pgid, Signal::SIGKILL);
    match tokio::time::timeout(force_window, child.wait()).await {
        Ok(Ok(status)) => KillDisposition::Exited(status),
        Ok(Err(e)) => {
            error!(pgid, error = %e, "wait on killed child failed");
            KillDisposition::Stuck
        }
        Err(_) => {
            error!(pgid, "process still alive after SIGKILL, abandoning as stuck");
            KillDisposition::Stuck
        }
    }
}
