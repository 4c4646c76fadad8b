// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Inbound envelope decoding.
//!
//! Decoding is two-stage so the router can answer with precise typed
//! errors: first the raw `{type, project_id?, data?}` envelope, then the
//! per-operation payload. Every failure here maps to `INVALID_MESSAGE` and
//! must not close the connection.

use crate::error::ErrorCode;
use crate::types::ExecuteOptions;
use serde::Deserialize;
use tether_core::ProjectId;
use thiserror::Error;

/// Default and maximum `get_messages` page size.
pub const MESSAGES_LIMIT: usize = 1000;

/// Raw inbound envelope, before operation dispatch.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl Envelope {
    pub fn parse(text: &str) -> Result<Self, WireError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Envelope-level decode failures.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing or empty type field")]
    MissingType,

    #[error("unknown message type: {0:?}")]
    UnknownType(String),

    #[error("project_id is required for {0}")]
    MissingProjectId(&'static str),

    #[error("invalid project_id for {0}")]
    InvalidProjectId(&'static str),

    #[error("invalid {op} payload: {err}")]
    BadPayload {
        op: &'static str,
        #[source]
        err: serde_json::Error,
    },

    #[error("prompt must not be empty")]
    EmptyPrompt,
}

impl WireError {
    /// All envelope failures surface as `INVALID_MESSAGE`.
    pub fn code(&self) -> ErrorCode {
        ErrorCode::InvalidMessage
    }
}

/// A validated inbound operation.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientRequest {
    ProjectCreate { path: String },
    ProjectList,
    ProjectDelete { project_id: ProjectId },
    ProjectJoin { project_id: ProjectId },
    ProjectLeave { project_id: ProjectId },
    Execute { project_id: ProjectId, prompt: String, options: ExecuteOptions },
    AgentKill { project_id: ProjectId },
    AgentNewSession { project_id: ProjectId },
    GetMessages { project_id: ProjectId, since_ms: u64, limit: usize },
}

#[derive(Deserialize)]
struct ProjectCreateData {
    path: String,
}

#[derive(Deserialize)]
struct ExecuteData {
    prompt: String,
    #[serde(default)]
    options: ExecuteOptions,
}

#[derive(Deserialize)]
struct GetMessagesData {
    #[serde(default)]
    since: u64,
    limit: Option<usize>,
}

fn payload<T: serde::de::DeserializeOwned>(
    op: &'static str,
    data: Option<serde_json::Value>,
) -> Result<T, WireError> {
    let value = data.unwrap_or(serde_json::Value::Null);
    serde_json::from_value(value).map_err(|err| WireError::BadPayload { op, err })
}

fn require_project(op: &'static str, env: &Envelope) -> Result<ProjectId, WireError> {
    match env.project_id.as_deref() {
        Some(id) if id.len() > tether_core::id::ID_MAX_LEN => {
            Err(WireError::InvalidProjectId(op))
        }
        Some(id) if !id.is_empty() => Ok(ProjectId::from_string(id)),
        _ => Err(WireError::MissingProjectId(op)),
    }
}

impl ClientRequest {
    /// Validate an envelope into a typed operation.
    pub fn from_envelope(env: Envelope) -> Result<Self, WireError> {
        if env.kind.is_empty() {
            return Err(WireError::MissingType);
        }
        match env.kind.as_str() {
            "project_create" => {
                let data: ProjectCreateData = payload("project_create", env.data)?;
                Ok(Self::ProjectCreate { path: data.path })
            }
            "project_list" => Ok(Self::ProjectList),
            "project_delete" => {
                Ok(Self::ProjectDelete { project_id: require_project("project_delete", &env)? })
            }
            "project_join" => {
                Ok(Self::ProjectJoin { project_id: require_project("project_join", &env)? })
            }
            "project_leave" => {
                Ok(Self::ProjectLeave { project_id: require_project("project_leave", &env)? })
            }
            "execute" => {
                let project_id = require_project("execute", &env)?;
                let data: ExecuteData = payload("execute", env.data)?;
                if data.prompt.trim().is_empty() {
                    return Err(WireError::EmptyPrompt);
                }
                Ok(Self::Execute { project_id, prompt: data.prompt, options: data.options })
            }
            "agent_kill" => {
                Ok(Self::AgentKill { project_id: require_project("agent_kill", &env)? })
            }
            "agent_new_session" => Ok(Self::AgentNewSession {
                project_id: require_project("agent_new_session", &env)?,
            }),
            "get_messages" => {
                let project_id = require_project("get_messages", &env)?;
                let data: GetMessagesData = payload("get_messages", env.data)?;
                let limit = data.limit.unwrap_or(MESSAGES_LIMIT).min(MESSAGES_LIMIT);
                Ok(Self::GetMessages { project_id, since_ms: data.since, limit })
            }
            other => Err(WireError::UnknownType(other.to_string())),
        }
    }

    /// Parse and validate a raw text frame in one step.
    pub fn parse(text: &str) -> Result<Self, WireError> {
        Self::from_envelope(Envelope::parse(text)?)
    }
}

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;
