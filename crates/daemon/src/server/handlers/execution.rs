// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution control handlers.

use std::sync::Arc;

use tether_core::{Clock, ProjectId, StateError};
use tether_wire::{ErrorCode, ExecuteOptions, ServerMessage};
use tracing::info;

use super::HandlerError;
use crate::registry::broadcast;
use crate::server::session::Session;
use crate::server::ListenCtx;

pub(crate) async fn execute<C: Clock>(
    ctx: &Arc<ListenCtx<C>>,
    session: &Arc<Session>,
    project_id: ProjectId,
    prompt: String,
    options: ExecuteOptions,
) -> Result<(), HandlerError> {
    let handle = ctx
        .registry
        .get(&project_id)
        .map_err(|e| HandlerError::from(e).with_project(project_id))?;

    ctx.engine
        .execute(Arc::clone(&handle), prompt, options)
        .await
        .map_err(|e| HandlerError::from(e).with_project(project_id))?;

    // Subscribers got the EXECUTING broadcast; a caller driving the
    // project without joining it still needs the immediate state.
    if !handle.is_subscriber(&session.id) {
        let frame = ServerMessage::project_state(&handle.snapshot(), ctx.clock.wall());
        let _ = session.send(&frame).await;
    }
    Ok(())
}

pub(crate) async fn kill<C: Clock>(
    ctx: &Arc<ListenCtx<C>>,
    _session: &Arc<Session>,
    project_id: ProjectId,
) -> Result<(), HandlerError> {
    ctx.registry
        .get(&project_id)
        .map_err(|e| HandlerError::from(e).with_project(project_id))?;

    ctx.engine
        .kill(&project_id, false)
        .map_err(|e| HandlerError::from(e).with_project(project_id))?;
    info!(project_id = %project_id, "kill requested");
    Ok(())
}

pub(crate) async fn new_session<C: Clock>(
    ctx: &Arc<ListenCtx<C>>,
    session: &Arc<Session>,
    project_id: ProjectId,
) -> Result<(), HandlerError> {
    let handle = ctx
        .registry
        .get(&project_id)
        .map_err(|e| HandlerError::from(e).with_project(project_id))?;

    let now = ctx.clock.wall();
    handle.with_meta(|m| m.reset_session(now)).map_err(|e| {
        let code = match e {
            StateError::Executing => ErrorCode::ProcessActive,
            _ => ErrorCode::InternalError,
        };
        HandlerError::new(code, "cannot reset session while executing").with_project(project_id)
    })?;

    ctx.store
        .save(&handle.meta())
        .map_err(|e| HandlerError::from(e).with_project(project_id))?;

    info!(project_id = %project_id, "session reset");

    broadcast(&handle, &ServerMessage::session_reset(project_id, now)).await;
    broadcast(&handle, &ServerMessage::project_state(&handle.snapshot(), now)).await;
    if !handle.is_subscriber(&session.id) {
        let _ = session.send(&ServerMessage::session_reset(project_id, now)).await;
    }
    Ok(())
}
