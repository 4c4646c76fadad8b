// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operation handlers.
//!
//! Each handler produces zero or more outbound frames and/or side effects,
//! returning a [`HandlerError`] that the router renders as an `error`
//! frame. Module errors map onto the client-facing error codes here.

pub(crate) mod execution;
pub(crate) mod messages;
pub(crate) mod projects;

use chrono::{DateTime, Utc};
use tether_core::{PathError, ProjectId};
use tether_wire::{ErrorCode, ErrorData, ServerMessage};

use crate::executor::ExecError;
use crate::logstore::LogError;
use crate::registry::RegistryError;
use crate::store::StoreError;

/// A handler failure destined for an `error` frame.
#[derive(Debug)]
pub(crate) struct HandlerError {
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<String>,
    pub project_id: Option<ProjectId>,
}

impl HandlerError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), details: None, project_id: None }
    }

    pub fn with_project(mut self, project_id: ProjectId) -> Self {
        self.project_id = Some(project_id);
        self
    }

    pub fn frame(&self, now: DateTime<Utc>) -> ServerMessage {
        let mut data = ErrorData::new(self.code, self.message.clone());
        if let Some(details) = &self.details {
            data = data.with_details(details.clone());
        }
        match self.project_id {
            Some(project_id) => ServerMessage::error_for(project_id, data, now),
            None => ServerMessage::error(data, now),
        }
    }
}

impl From<PathError> for HandlerError {
    fn from(e: PathError) -> Self {
        Self::new(ErrorCode::InvalidPath, e.to_string())
    }
}

impl From<RegistryError> for HandlerError {
    fn from(e: RegistryError) -> Self {
        match &e {
            RegistryError::NotFound(_) => Self::new(ErrorCode::ProjectNotFound, e.to_string()),
            RegistryError::Nesting { existing } => {
                let mut err = Self::new(
                    ErrorCode::ProjectNesting,
                    "path nests with an existing project",
                );
                err.details = Some(format!("existing project: {existing}"));
                err
            }
            RegistryError::Limit { .. } => Self::new(ErrorCode::ProjectLimit, e.to_string()),
            RegistryError::Executing => Self::new(ErrorCode::ProcessActive, e.to_string()),
        }
    }
}

impl From<ExecError> for HandlerError {
    fn from(e: ExecError) -> Self {
        let code = match &e {
            ExecError::ProcessActive => ErrorCode::ProcessActive,
            ExecError::ResourceLimit => ErrorCode::ResourceLimit,
            ExecError::ProcessNotFound => ErrorCode::ProcessNotFound,
            ExecError::ErrorState | ExecError::Spawn(_) => ErrorCode::ExecutionFailed,
        };
        Self::new(code, e.to_string())
    }
}

impl From<StoreError> for HandlerError {
    fn from(e: StoreError) -> Self {
        Self::new(ErrorCode::FileOperation, e.to_string())
    }
}

impl From<LogError> for HandlerError {
    fn from(e: LogError) -> Self {
        Self::new(ErrorCode::FileOperation, e.to_string())
    }
}
