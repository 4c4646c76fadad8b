// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message-history handler.

use std::sync::Arc;

use tether_core::{Clock, ProjectId};
use tether_wire::ServerMessage;

use super::HandlerError;
use crate::server::session::Session;
use crate::server::ListenCtx;

pub(crate) async fn get<C: Clock>(
    ctx: &Arc<ListenCtx<C>>,
    session: &Arc<Session>,
    project_id: ProjectId,
    since_ms: u64,
    limit: usize,
) -> Result<(), HandlerError> {
    let handle = ctx
        .registry
        .get(&project_id)
        .map_err(|e| HandlerError::from(e).with_project(project_id))?;

    let entries = handle
        .log
        .read_since(since_ms, limit)
        .map_err(|e| HandlerError::from(e).with_project(project_id))?;

    let frame = ServerMessage::messages_response(project_id, &entries, ctx.clock.wall());
    let _ = session.send(&frame).await;
    Ok(())
}
