// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Listener task and per-connection lifecycle.
//!
//! The listener accepts TCP connections, upgrades them to WebSocket with
//! the configured frame-size cap, and spawns one task per connection. Each
//! connection runs a read loop with a heartbeat; everything a concurrent
//! sender needs lives on the [`session::Session`] object.

mod handlers;
mod router;
pub mod session;

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Instant;

use futures_util::stream::SplitStream;
use futures_util::StreamExt;
use parking_lot::Mutex;
use tether_core::{Clock, ConnId};
use tether_wire::{ErrorCode, ErrorData, HealthStatus, ServerMessage};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::env;
use crate::executor::ExecutionEngine;
use crate::lifecycle::Config;
use crate::registry::ProjectRegistry;
use crate::resources::ResourceManager;
use crate::store::ProjectStore;
use session::Session;

/// Shared daemon context for all connection tasks and handlers.
pub struct ListenCtx<C: Clock> {
    pub config: Arc<Config>,
    pub clock: C,
    pub registry: Arc<ProjectRegistry>,
    pub store: Arc<ProjectStore>,
    pub engine: Arc<ExecutionEngine<C>>,
    pub resources: Arc<ResourceManager>,
    pub sessions: Arc<SessionTable>,
    pub shutdown: CancellationToken,
    pub started_at: Instant,
}

/// All live sessions, for shutdown and the stats broadcast.
#[derive(Default)]
pub struct SessionTable {
    inner: Mutex<HashMap<ConnId, Weak<Session>>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, session: &Arc<Session>) {
        self.inner.lock().insert(session.id, Arc::downgrade(session));
    }

    pub fn remove(&self, id: &ConnId) {
        self.inner.lock().remove(id);
    }

    /// Live sessions; dead references are pruned as a side effect.
    pub fn snapshot(&self) -> Vec<Arc<Session>> {
        let mut inner = self.inner.lock();
        let mut live = Vec::with_capacity(inner.len());
        inner.retain(|_, weak| match weak.upgrade() {
            Some(session) => {
                live.push(session);
                true
            }
            None => false,
        });
        live
    }

    pub async fn close_all(&self) {
        for session in self.snapshot() {
            session.close().await;
        }
    }
}

/// Accept connections until shutdown, one task per connection.
pub async fn run_listener<C: Clock>(listener: TcpListener, ctx: Arc<ListenCtx<C>>) {
    loop {
        tokio::select! {
            _ = ctx.shutdown.cancelled() => break,
            result = listener.accept() => match result {
                Ok((stream, addr)) => {
                    debug!(%addr, "connection accepted");
                    let ctx = Arc::clone(&ctx);
                    tokio::spawn(async move {
                        handle_connection(ctx, stream).await;
                    });
                }
                Err(e) => error!(error = %e, "accept failed"),
            }
        }
    }
    info!("listener stopped");
}

async fn handle_connection<C: Clock>(ctx: Arc<ListenCtx<C>>, stream: TcpStream) {
    let ws_config = WebSocketConfig::default()
        .max_message_size(Some(ctx.config.max_frame_bytes))
        .max_frame_size(Some(ctx.config.max_frame_bytes));

    let ws = match tokio_tungstenite::accept_async_with_config(stream, Some(ws_config)).await {
        Ok(ws) => ws,
        Err(e) => {
            debug!(error = %e, "websocket handshake failed");
            return;
        }
    };
    let (sink, read) = ws.split();
    let session =
        Arc::new(Session::new(sink, ctx.config.write_timeout, ctx.clock.now()));

    if !ctx.resources.try_acquire_connection() {
        let data = ErrorData::new(ErrorCode::ResourceLimit, "connection limit reached");
        let _ = session.send(&ServerMessage::error(data, ctx.clock.wall())).await;
        session.close().await;
        return;
    }

    ctx.sessions.add(&session);
    info!(session_id = %session.id, "session opened");

    let uptime = ctx.clock.now().saturating_duration_since(ctx.started_at).as_secs();
    let health = HealthStatus::ok(env::VERSION, uptime);
    let _ = session.send(&ServerMessage::health_status(&health, ctx.clock.wall())).await;

    run_session(&ctx, &session, read).await;
    cleanup_session(&ctx, &session).await;
}

/// The read loop: inbound frames, heartbeat, idle enforcement.
async fn run_session<C: Clock>(
    ctx: &Arc<ListenCtx<C>>,
    session: &Arc<Session>,
    mut read: SplitStream<WebSocketStream<TcpStream>>,
) {
    let mut heartbeat = tokio::time::interval(ctx.config.ping_interval);
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // Consume the immediate first tick so pings start one interval in.
    heartbeat.tick().await;

    let closed = session.closed_token();

    loop {
        tokio::select! {
            _ = ctx.shutdown.cancelled() => break,
            _ = closed.cancelled() => break,
            _ = heartbeat.tick() => {
                let now = ctx.clock.now();
                if session.idle_since_seen(now) > ctx.config.pong_timeout {
                    info!(session_id = %session.id, "pong timeout, closing session");
                    break;
                }
                if session.idle_since_data(now) > ctx.config.idle_timeout {
                    info!(session_id = %session.id, "idle timeout, closing session");
                    break;
                }
                if session.ping().await.is_err() {
                    break;
                }
            }
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    session.touch_data(ctx.clock.now());
                    router::dispatch(ctx, session, text.as_str()).await;
                }
                Some(Ok(Message::Binary(_))) => {
                    session.touch_data(ctx.clock.now());
                    let data = ErrorData::new(
                        ErrorCode::InvalidMessage,
                        "binary frames are not supported",
                    );
                    let _ = session.send(&ServerMessage::error(data, ctx.clock.wall())).await;
                }
                Some(Ok(Message::Ping(payload))) => {
                    session.touch(ctx.clock.now());
                    let _ = session.pong(payload).await;
                }
                Some(Ok(Message::Pong(_))) => {
                    session.touch(ctx.clock.now());
                }
                Some(Ok(Message::Close(_))) => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    if matches!(e, WsError::Capacity(_)) {
                        let data = ErrorData::new(
                            ErrorCode::InvalidMessage,
                            format!(
                                "frame exceeds limit of {} bytes",
                                ctx.config.max_frame_bytes
                            ),
                        );
                        let _ = session
                            .send(&ServerMessage::error(data, ctx.clock.wall()))
                            .await;
                    } else {
                        debug!(session_id = %session.id, error = %e, "read error");
                    }
                    break;
                }
                None => break,
            }
        }
    }
}

/// Close the socket and drop every reference the daemon holds.
async fn cleanup_session<C: Clock>(ctx: &Arc<ListenCtx<C>>, session: &Arc<Session>) {
    session.close().await;
    if let Some(project_id) = session.take_joined() {
        if let Ok(handle) = ctx.registry.get(&project_id) {
            handle.remove_subscriber(&session.id);
        }
    }
    ctx.sessions.remove(&session.id);
    ctx.resources.release_connection();
    info!(session_id = %session.id, "session closed");
}
