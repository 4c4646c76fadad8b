// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The project record and its state machine.
//!
//! A `Project` is the persisted metadata for one project directory: its
//! identity, canonical path, the CLI's continuation token, and the execution
//! state. The daemon wraps it in a handle that adds the message log and the
//! subscriber set; this type is what goes to disk and into snapshots.

use crate::id::ProjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Execution state of a project.
///
/// Legal transitions: Idle→Executing→{Idle|Error}, and {Idle|Error}→Idle
/// via a session reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProjectState {
    Idle,
    Executing,
    Error,
}

crate::simple_display! {
    ProjectState {
        Idle => "IDLE",
        Executing => "EXECUTING",
        Error => "ERROR",
    }
}

/// Illegal state-transition errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("project is already executing")]
    AlreadyExecuting,

    #[error("project is not executing")]
    NotExecuting,

    #[error("operation not allowed while executing")]
    Executing,
}

/// Persisted metadata for one project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub path: PathBuf,
    /// CLI session continuation token; empty until the CLI reports one.
    #[serde(default)]
    pub session_id: String,
    pub state: ProjectState,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    /// Human-readable failure detail; empty unless `state` is `Error`.
    #[serde(default)]
    pub error_details: String,
}

impl Project {
    pub fn new(id: ProjectId, path: PathBuf, now: DateTime<Utc>) -> Self {
        Self {
            id,
            path,
            session_id: String::new(),
            state: ProjectState::Idle,
            created_at: now,
            last_active: now,
            error_details: String::new(),
        }
    }

    /// Idle→Executing. Fails unless the project is idle.
    pub fn begin_execution(&mut self, now: DateTime<Utc>) -> Result<(), StateError> {
        match self.state {
            ProjectState::Idle => {
                self.state = ProjectState::Executing;
                self.last_active = now;
                Ok(())
            }
            ProjectState::Executing => Err(StateError::AlreadyExecuting),
            ProjectState::Error => Err(StateError::NotExecuting),
        }
    }

    /// Executing→Idle on clean completion, recording a fresh continuation
    /// token when the CLI produced one.
    pub fn complete_execution(
        &mut self,
        session_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), StateError> {
        if self.state != ProjectState::Executing {
            return Err(StateError::NotExecuting);
        }
        if let Some(sid) = session_id {
            if !sid.is_empty() {
                self.session_id = sid;
            }
        }
        self.state = ProjectState::Idle;
        self.error_details.clear();
        self.last_active = now;
        Ok(())
    }

    /// Executing→Error with failure detail.
    pub fn fail_execution(
        &mut self,
        details: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), StateError> {
        if self.state != ProjectState::Executing {
            return Err(StateError::NotExecuting);
        }
        self.state = ProjectState::Error;
        self.error_details = details.into();
        self.last_active = now;
        Ok(())
    }

    /// Clear the continuation token and return to Idle.
    ///
    /// Accepted from Idle and Error (an errored project is recovered this
    /// way); refused while executing.
    pub fn reset_session(&mut self, now: DateTime<Utc>) -> Result<(), StateError> {
        if self.state == ProjectState::Executing {
            return Err(StateError::Executing);
        }
        self.session_id.clear();
        self.error_details.clear();
        self.state = ProjectState::Idle;
        self.last_active = now;
        Ok(())
    }
}

#[cfg(test)]
#[path = "project_tests.rs"]
mod tests;
