// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Graceful shutdown.

use tether_core::Clock;
use tracing::{error, info, warn};

use crate::server::ListenCtx;

/// Drain the daemon: stop accepting, cancel executions, wait bounded,
/// persist, close logs and sessions.
///
/// In-flight executions get a graceful cancellation first; whatever
/// survives the drain window is force-killed so no child outlives the
/// daemon.
pub async fn shutdown<C: Clock>(ctx: &ListenCtx<C>) {
    info!("shutting down");
    ctx.shutdown.cancel();

    let active = ctx.engine.kill_all();
    if active > 0 {
        info!(active, "draining in-flight executions");
        if !ctx.engine.wait_idle(ctx.config.shutdown_drain).await {
            warn!("drain window elapsed, force killing remaining executions");
            ctx.engine.force_kill_all();
            if !ctx.engine.wait_idle(ctx.config.force_kill_window).await {
                error!("executions still present after force kill");
            }
        }
    }

    for handle in ctx.registry.list() {
        if let Err(e) = ctx.store.save(&handle.meta()) {
            error!(project_id = %handle.id, error = %e, "failed to persist project at shutdown");
        }
        handle.log.close();
    }

    ctx.sessions.close_all().await;
    info!("shutdown complete");
}
