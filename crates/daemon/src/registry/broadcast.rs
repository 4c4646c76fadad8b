// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subscriber fan-out.

use tether_wire::ServerMessage;
use tracing::debug;

use super::ProjectHandle;

/// Send one frame to every current subscriber of a project.
///
/// Iterates a snapshot, so no registry or subscriber lock is held across a
/// send. A failed peer is closed and removed after the iteration; every
/// then-current subscriber either receives the frame or leaves the set.
pub async fn broadcast(project: &ProjectHandle, frame: &ServerMessage) {
    let subscribers = project.snapshot_subscribers();
    let mut broken = Vec::new();

    for session in subscribers {
        if session.send(frame).await.is_err() {
            debug!(
                project_id = %project.id,
                session_id = %session.id,
                "dropping subscriber after failed send"
            );
            session.close().await;
            broken.push(session.id);
        }
    }

    for id in broken {
        project.remove_subscriber(&id);
    }
}
