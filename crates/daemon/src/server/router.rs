// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Inbound frame dispatch.
//!
//! Validates the envelope, routes by operation, and turns handler failures
//! into `error` frames. Nothing here closes the connection; a bad frame is
//! answered and the session stays usable.

use std::sync::Arc;

use tether_core::Clock;
use tether_wire::{ClientRequest, ErrorData, ServerMessage};
use tracing::debug;

use super::handlers;
use super::session::Session;
use super::ListenCtx;

pub(crate) async fn dispatch<C: Clock>(
    ctx: &Arc<ListenCtx<C>>,
    session: &Arc<Session>,
    text: &str,
) {
    let request = match ClientRequest::parse(text) {
        Ok(request) => request,
        Err(e) => {
            debug!(session_id = %session.id, error = %e, "rejecting inbound frame");
            let data = ErrorData::new(e.code(), e.to_string());
            let _ = session.send(&ServerMessage::error(data, ctx.clock.wall())).await;
            return;
        }
    };

    let result = match request {
        ClientRequest::ProjectCreate { path } => {
            handlers::projects::create(ctx, session, path).await
        }
        ClientRequest::ProjectList => handlers::projects::list(ctx, session).await,
        ClientRequest::ProjectDelete { project_id } => {
            handlers::projects::delete(ctx, session, project_id).await
        }
        ClientRequest::ProjectJoin { project_id } => {
            handlers::projects::join(ctx, session, project_id).await
        }
        ClientRequest::ProjectLeave { project_id } => {
            handlers::projects::leave(ctx, session, project_id).await
        }
        ClientRequest::Execute { project_id, prompt, options } => {
            handlers::execution::execute(ctx, session, project_id, prompt, options).await
        }
        ClientRequest::AgentKill { project_id } => {
            handlers::execution::kill(ctx, session, project_id).await
        }
        ClientRequest::AgentNewSession { project_id } => {
            handlers::execution::new_session(ctx, session, project_id).await
        }
        ClientRequest::GetMessages { project_id, since_ms, limit } => {
            handlers::messages::get(ctx, session, project_id, since_ms, limit).await
        }
    };

    if let Err(err) = result {
        debug!(session_id = %session.id, code = %err.code, message = %err.message, "handler error");
        let _ = session.send(&err.frame(ctx.clock.wall())).await;
    }
}
