// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client-visible error codes.

use serde::{Deserialize, Serialize};

/// Error code strings surfaced to clients in `error` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Envelope/schema/deserialization failure; connection stays open.
    InvalidMessage,
    /// Path empty, non-absolute, non-directory, or not canonicalizable.
    InvalidPath,
    /// Candidate path nests with an existing project.
    ProjectNesting,
    ProjectNotFound,
    /// Project count cap hit.
    ProjectLimit,
    /// Connection or concurrency cap hit.
    ResourceLimit,
    /// Execution or conflicting operation while EXECUTING.
    ProcessActive,
    /// Kill/inspect with no active execution.
    ProcessNotFound,
    ExecutionTimeout,
    ExecutionFailed,
    /// CLI binary missing at startup (fatal, never sent over the wire).
    ClaudeNotFound,
    /// Malformed output from the CLI.
    JsonParsing,
    /// Persistence I/O failure.
    FileOperation,
    InternalError,
}

tether_core::simple_display! {
    ErrorCode {
        InvalidMessage => "INVALID_MESSAGE",
        InvalidPath => "INVALID_PATH",
        ProjectNesting => "PROJECT_NESTING",
        ProjectNotFound => "PROJECT_NOT_FOUND",
        ProjectLimit => "PROJECT_LIMIT",
        ResourceLimit => "RESOURCE_LIMIT",
        ProcessActive => "PROCESS_ACTIVE",
        ProcessNotFound => "PROCESS_NOT_FOUND",
        ExecutionTimeout => "EXECUTION_TIMEOUT",
        ExecutionFailed => "EXECUTION_FAILED",
        ClaudeNotFound => "CLAUDE_NOT_FOUND",
        JsonParsing => "JSON_PARSING",
        FileOperation => "FILE_OPERATION",
        InternalError => "INTERNAL_ERROR",
    }
}

/// Payload of an `error` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorData {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorData {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), details: None }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}
