// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Project lifecycle and subscription handlers.

use std::sync::Arc;

use tether_core::{validate_project_path, Clock, Project, ProjectId};
use tether_wire::ServerMessage;
use tracing::info;

use super::HandlerError;
use crate::logstore::MessageLog;
use crate::registry::ProjectHandle;
use crate::server::session::Session;
use crate::server::ListenCtx;

pub(crate) async fn create<C: Clock>(
    ctx: &Arc<ListenCtx<C>>,
    session: &Arc<Session>,
    path: String,
) -> Result<(), HandlerError> {
    let canonical = validate_project_path(&path)?;
    let id = ProjectId::new();
    let now = ctx.clock.wall();
    let project = Project::new(id, canonical, now);

    ctx.store.prepare(&id).map_err(HandlerError::from)?;
    let log = MessageLog::open(
        ctx.store.logs_dir(&id),
        ctx.config.rotate_limits(),
        ctx.clock.epoch_ms(),
    )
    .map_err(HandlerError::from)?;

    let handle = match ctx.registry.insert(ProjectHandle::new(project.clone(), log)) {
        Ok(handle) => handle,
        Err(e) => {
            let _ = ctx.store.remove(&id);
            return Err(e.into());
        }
    };

    if let Err(e) = ctx.store.save(&project) {
        let _ = ctx.registry.remove(&id);
        let _ = ctx.store.remove(&id);
        return Err(e.into());
    }

    info!(project_id = %id, path = %project.path.display(), "project created");
    let frame = ServerMessage::project_state(&handle.snapshot(), now);
    let _ = session.send(&frame).await;
    Ok(())
}

pub(crate) async fn list<C: Clock>(
    ctx: &Arc<ListenCtx<C>>,
    session: &Arc<Session>,
) -> Result<(), HandlerError> {
    let frame = ServerMessage::project_list(&ctx.registry.snapshots(), ctx.clock.wall());
    let _ = session.send(&frame).await;
    Ok(())
}

pub(crate) async fn delete<C: Clock>(
    ctx: &Arc<ListenCtx<C>>,
    session: &Arc<Session>,
    project_id: ProjectId,
) -> Result<(), HandlerError> {
    let handle = ctx
        .registry
        .remove(&project_id)
        .map_err(|e| HandlerError::from(e).with_project(project_id))?;

    let caller_subscribed = handle.is_subscriber(&session.id);
    handle.log.close();
    ctx.store
        .remove(&project_id)
        .map_err(|e| HandlerError::from(e).with_project(project_id))?;

    info!(project_id = %project_id, "project deleted");

    // One terminal event to everyone who was subscribed, then the set is
    // gone for good.
    let frame = ServerMessage::project_deleted(project_id, ctx.clock.wall());
    for subscriber in handle.clear_subscribers() {
        let _ = subscriber.send(&frame).await;
        subscriber.clear_joined(&project_id);
    }
    if !caller_subscribed {
        let _ = session.send(&frame).await;
    }
    Ok(())
}

pub(crate) async fn join<C: Clock>(
    ctx: &Arc<ListenCtx<C>>,
    session: &Arc<Session>,
    project_id: ProjectId,
) -> Result<(), HandlerError> {
    let handle = ctx
        .registry
        .get(&project_id)
        .map_err(|e| HandlerError::from(e).with_project(project_id))?;

    // A session subscribes to at most one project; joining another leaves
    // the previous one implicitly.
    if let Some(previous) = session.joined_project() {
        if previous != project_id {
            if let Ok(old) = ctx.registry.get(&previous) {
                old.remove_subscriber(&session.id);
            }
        }
    }

    handle.add_subscriber(session);
    session.set_joined(project_id);

    let now = ctx.clock.wall();
    let _ = session.send(&ServerMessage::project_joined(project_id, now)).await;
    let _ = session.send(&ServerMessage::project_state(&handle.snapshot(), now)).await;
    Ok(())
}

pub(crate) async fn leave<C: Clock>(
    ctx: &Arc<ListenCtx<C>>,
    session: &Arc<Session>,
    project_id: ProjectId,
) -> Result<(), HandlerError> {
    let handle = ctx
        .registry
        .get(&project_id)
        .map_err(|e| HandlerError::from(e).with_project(project_id))?;

    handle.remove_subscriber(&session.id);
    session.clear_joined(&project_id);

    let _ = session.send(&ServerMessage::project_left(project_id, ctx.clock.wall())).await;
    Ok(())
}
