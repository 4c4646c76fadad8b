// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One client connection.
//!
//! The read loop lives in the listener module; this type owns everything a
//! concurrent sender needs: the write half of the socket behind an async
//! mutex (all outbound frames are byte-serialized), the write deadline, the
//! heartbeat bookkeeping, and the close token. Broadcasters hold `Weak`
//! references; a session that fails a write cancels itself and is pruned
//! from its project's subscriber set.

use std::time::{Duration, Instant};

use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use parking_lot::Mutex;
use tether_core::{ConnId, ProjectId};
use tether_wire::ServerMessage;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{Bytes, Message};
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub(crate) type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;

/// Errors from the session write path.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session is closed")]
    Closed,

    #[error("write deadline exceeded")]
    WriteTimeout,

    #[error("websocket error: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A connected client.
pub struct Session {
    pub id: ConnId,
    created_at: Instant,
    writer: tokio::sync::Mutex<WsSink>,
    write_timeout: Duration,
    /// Any inbound traffic, pongs included. Drives the pong timeout.
    last_seen: Mutex<Instant>,
    /// Inbound data frames only. Drives the idle timeout.
    last_data: Mutex<Instant>,
    joined: Mutex<Option<ProjectId>>,
    closed: CancellationToken,
}

impl Session {
    pub(crate) fn new(sink: WsSink, write_timeout: Duration, now: Instant) -> Self {
        Self {
            id: ConnId::new(),
            created_at: now,
            writer: tokio::sync::Mutex::new(sink),
            write_timeout,
            last_seen: Mutex::new(now),
            last_data: Mutex::new(now),
            joined: Mutex::new(None),
            closed: CancellationToken::new(),
        }
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Send one frame. Serialized with every other sender through the
    /// writer mutex; a miss of the write deadline or a socket error marks
    /// the peer broken and closes the session.
    pub async fn send(&self, frame: &ServerMessage) -> Result<(), SessionError> {
        let text = frame.encode()?;
        self.send_message(Message::text(text)).await
    }

    pub(crate) async fn ping(&self) -> Result<(), SessionError> {
        self.send_message(Message::Ping(Bytes::new())).await
    }

    pub(crate) async fn pong(&self, payload: Bytes) -> Result<(), SessionError> {
        self.send_message(Message::Pong(payload)).await
    }

    async fn send_message(&self, message: Message) -> Result<(), SessionError> {
        if self.closed.is_cancelled() {
            return Err(SessionError::Closed);
        }
        let mut writer = self.writer.lock().await;
        let result = tokio::time::timeout(self.write_timeout, writer.send(message)).await;
        drop(writer);
        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                debug!(session_id = %self.id, error = %e, "session write failed");
                self.closed.cancel();
                Err(SessionError::Ws(e))
            }
            Err(_) => {
                debug!(session_id = %self.id, "session write deadline exceeded");
                self.closed.cancel();
                Err(SessionError::WriteTimeout)
            }
        }
    }

    /// Best-effort close frame, then mark the session closed. The read
    /// loop observes the token and runs the cleanup path.
    pub async fn close(&self) {
        if self.closed.is_cancelled() {
            return;
        }
        let mut writer = self.writer.lock().await;
        let _ = tokio::time::timeout(self.write_timeout, writer.send(Message::Close(None))).await;
        drop(writer);
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    pub(crate) fn closed_token(&self) -> CancellationToken {
        self.closed.clone()
    }

    /// Record inbound traffic of any kind (data or pong).
    pub(crate) fn touch(&self, now: Instant) {
        *self.last_seen.lock() = now;
    }

    /// Record an inbound data frame.
    pub(crate) fn touch_data(&self, now: Instant) {
        *self.last_seen.lock() = now;
        *self.last_data.lock() = now;
    }

    pub(crate) fn idle_since_seen(&self, now: Instant) -> Duration {
        now.saturating_duration_since(*self.last_seen.lock())
    }

    pub(crate) fn idle_since_data(&self, now: Instant) -> Duration {
        now.saturating_duration_since(*self.last_data.lock())
    }

    /// The project this session is subscribed to, if any.
    pub fn joined_project(&self) -> Option<ProjectId> {
        *self.joined.lock()
    }

    pub(crate) fn set_joined(&self, project_id: ProjectId) {
        *self.joined.lock() = Some(project_id);
    }

    /// Clear the joined project if it matches; returns the previous value.
    pub(crate) fn clear_joined(&self, project_id: &ProjectId) -> Option<ProjectId> {
        let mut joined = self.joined.lock();
        if joined.as_ref() == Some(project_id) {
            joined.take()
        } else {
            None
        }
    }

    pub(crate) fn take_joined(&self) -> Option<ProjectId> {
        self.joined.lock().take()
    }
}
