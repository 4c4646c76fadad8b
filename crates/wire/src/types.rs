// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared payload types carried inside envelopes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tether_core::{Project, ProjectId, ProjectState};

/// Who produced a logged message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Client,
    Agent,
}

tether_core::simple_display! {
    Direction {
        Client => "client",
        Agent => "agent",
    }
}

/// One entry in a project's message log.
///
/// `timestamp` is epoch milliseconds at append time; entries are ordered by
/// it within a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: u64,
    pub direction: Direction,
    pub message: serde_json::Value,
}

/// Per-execute options forwarded to the CLI invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecuteOptions {
    /// Tool names the CLI is allowed to use; overrides the configured default
    /// when non-empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_tools: Vec<String>,
    /// Tool names the CLI must not use; overrides the configured default
    /// when non-empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disallowed_tools: Vec<String>,
    /// Extra arguments appended to the CLI argv verbatim.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_args: Vec<String>,
}

/// Point-in-time view of a project, sent in `project_state` and
/// `project_list_response` frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSnapshot {
    pub id: ProjectId,
    pub path: String,
    pub state: ProjectState,
    #[serde(default)]
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error_details: String,
    pub subscriber_count: usize,
}

impl ProjectSnapshot {
    pub fn from_project(project: &Project, subscriber_count: usize) -> Self {
        Self {
            id: project.id,
            path: project.path.display().to_string(),
            state: project.state,
            session_id: project.session_id.clone(),
            created_at: project.created_at,
            last_active: project.last_active,
            error_details: project.error_details.clone(),
            subscriber_count,
        }
    }
}

/// Payload of the periodic `server_stats` broadcast.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerStats {
    pub connections: usize,
    pub projects: usize,
    pub active_executions: usize,
    pub memory_mb: u64,
    pub threads: usize,
    pub uptime_secs: u64,
}

/// Payload of the `health_status` greeting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

impl HealthStatus {
    pub fn ok(version: impl Into<String>, uptime_secs: u64) -> Self {
        Self { status: "ok".to_string(), version: version.into(), uptime_secs }
    }
}
