// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Outbound frame construction.
//!
//! Every server→client frame is `{type, project_id?, data, timestamp}`.
//! Constructors take the wall-clock time from the caller so frames are
//! testable against a fake clock.

use crate::error::{ErrorCode, ErrorData};
use crate::types::{HealthStatus, LogEntry, ProjectSnapshot, ServerStats};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tether_core::ProjectId;

/// Outbound frame types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerKind {
    ProjectState,
    ProjectListResponse,
    ProjectDeleted,
    ProjectJoined,
    ProjectLeft,
    AgentMessage,
    SessionReset,
    MessagesResponse,
    Error,
    ServerStats,
    HealthStatus,
}

tether_core::simple_display! {
    ServerKind {
        ProjectState => "project_state",
        ProjectListResponse => "project_list_response",
        ProjectDeleted => "project_deleted",
        ProjectJoined => "project_joined",
        ProjectLeft => "project_left",
        AgentMessage => "agent_message",
        SessionReset => "session_reset",
        MessagesResponse => "messages_response",
        Error => "error",
        ServerStats => "server_stats",
        HealthStatus => "health_status",
    }
}

/// A server→client frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerMessage {
    #[serde(rename = "type")]
    pub kind: ServerKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<ProjectId>,
    pub data: Value,
    /// RFC-3339 UTC instant, millisecond precision.
    pub timestamp: String,
}

fn stamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn data_of<T: Serialize>(value: &T) -> Value {
    // Payload types here serialize infallibly; Null is the safe fallback.
    serde_json::to_value(value).unwrap_or(Value::Null)
}

impl ServerMessage {
    fn new(kind: ServerKind, project_id: Option<ProjectId>, data: Value, now: DateTime<Utc>) -> Self {
        Self { kind, project_id, data, timestamp: stamp(now) }
    }

    pub fn project_state(snapshot: &ProjectSnapshot, now: DateTime<Utc>) -> Self {
        Self::new(ServerKind::ProjectState, Some(snapshot.id), data_of(snapshot), now)
    }

    pub fn project_list(snapshots: &[ProjectSnapshot], now: DateTime<Utc>) -> Self {
        Self::new(
            ServerKind::ProjectListResponse,
            None,
            data_of(&serde_json::json!({ "projects": snapshots })),
            now,
        )
    }

    pub fn project_deleted(project_id: ProjectId, now: DateTime<Utc>) -> Self {
        Self::new(ServerKind::ProjectDeleted, Some(project_id), Value::Null, now)
    }

    pub fn project_joined(project_id: ProjectId, now: DateTime<Utc>) -> Self {
        Self::new(ServerKind::ProjectJoined, Some(project_id), Value::Null, now)
    }

    pub fn project_left(project_id: ProjectId, now: DateTime<Utc>) -> Self {
        Self::new(ServerKind::ProjectLeft, Some(project_id), Value::Null, now)
    }

    /// Pass-through of one structured CLI output line.
    pub fn agent_message(project_id: ProjectId, line: Value, now: DateTime<Utc>) -> Self {
        Self::new(ServerKind::AgentMessage, Some(project_id), line, now)
    }

    pub fn session_reset(project_id: ProjectId, now: DateTime<Utc>) -> Self {
        Self::new(ServerKind::SessionReset, Some(project_id), Value::Null, now)
    }

    pub fn messages_response(
        project_id: ProjectId,
        entries: &[LogEntry],
        now: DateTime<Utc>,
    ) -> Self {
        Self::new(
            ServerKind::MessagesResponse,
            Some(project_id),
            data_of(&serde_json::json!({ "messages": entries })),
            now,
        )
    }

    pub fn error(data: ErrorData, now: DateTime<Utc>) -> Self {
        Self::new(ServerKind::Error, None, data_of(&data), now)
    }

    pub fn error_for(project_id: ProjectId, data: ErrorData, now: DateTime<Utc>) -> Self {
        Self::new(ServerKind::Error, Some(project_id), data_of(&data), now)
    }

    pub fn server_stats(stats: &ServerStats, now: DateTime<Utc>) -> Self {
        Self::new(ServerKind::ServerStats, None, data_of(stats), now)
    }

    pub fn health_status(health: &HealthStatus, now: DateTime<Utc>) -> Self {
        Self::new(ServerKind::HealthStatus, None, data_of(health), now)
    }

    /// Error code of an `error` frame, if this is one.
    pub fn error_code(&self) -> Option<ErrorCode> {
        if self.kind != ServerKind::Error {
            return None;
        }
        serde_json::from_value::<ErrorData>(self.data.clone()).ok().map(|d| d.code)
    }

    /// Serialize for the wire.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
#[path = "outbound_tests.rs"]
mod tests;
