// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Structured-line parsing of CLI stdout.
//!
//! Each non-empty stdout line is one JSON object with a `type` field.
//! `system` lines carry the session continuation token; message-shaped
//! lines are appended to the project's log and fanned out to subscribers
//! as `agent_message` frames; an `error` line stops the stream. Anything
//! unrecognized or unparseable is logged at debug and skipped.

use serde_json::Value;
use tether_core::Clock;
use tether_wire::{Direction, ServerMessage};
use tracing::{debug, warn};

use crate::registry::{broadcast, ProjectHandle};

/// What a parsed line means for the read loop.
#[derive(Debug, PartialEq)]
pub(crate) enum LineOutcome {
    Continue,
    /// The CLI reported an error; stop parsing with this detail.
    Stop(String),
}

/// Accumulates stream state across one execution's stdout.
pub(crate) struct StreamParser<C: Clock> {
    clock: C,
    /// Most recent session id seen on a `system` line.
    pub session_id: Option<String>,
    /// Count of forwarded events.
    pub events: usize,
}

impl<C: Clock> StreamParser<C> {
    pub fn new(clock: C) -> Self {
        Self { clock, session_id: None, events: 0 }
    }

    pub async fn handle_line(&mut self, project: &ProjectHandle, line: &str) -> LineOutcome {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return LineOutcome::Continue;
        }

        let value: Value = match serde_json::from_str(trimmed) {
            Ok(v) => v,
            Err(e) => {
                debug!(project_id = %project.id, error = %e, "skipping unparseable CLI line");
                return LineOutcome::Continue;
            }
        };

        let kind = value.get("type").and_then(Value::as_str).unwrap_or("");
        match kind {
            "system" => {
                if let Some(sid) = value.get("session_id").and_then(Value::as_str) {
                    if !sid.is_empty() {
                        self.session_id = Some(sid.to_string());
                    }
                }
                LineOutcome::Continue
            }
            "assistant" | "user" | "result" | "message_start" | "message_delta"
            | "message_stop" => {
                self.forward(project, value).await;
                LineOutcome::Continue
            }
            k if k.starts_with("content_block_") => {
                self.forward(project, value).await;
                LineOutcome::Continue
            }
            "error" => {
                let detail = value
                    .get("message")
                    .or_else(|| value.get("error"))
                    .and_then(Value::as_str)
                    .unwrap_or("agent reported an error")
                    .to_string();
                self.forward(project, value).await;
                LineOutcome::Stop(detail)
            }
            other => {
                debug!(project_id = %project.id, kind = other, "ignoring unrecognized CLI line type");
                LineOutcome::Continue
            }
        }
    }

    /// Append to the message log and fan out to subscribers. A log failure
    /// must not stall the stream; it is logged and the event still reaches
    /// subscribers.
    async fn forward(&mut self, project: &ProjectHandle, value: Value) {
        if let Err(e) = self.clock_append(project, &value) {
            warn!(project_id = %project.id, error = %e, "message log append failed");
        }
        let frame = ServerMessage::agent_message(project.id, value, self.clock.wall());
        broadcast(project, &frame).await;
        self.events += 1;
    }

    fn clock_append(
        &self,
        project: &ProjectHandle,
        value: &Value,
    ) -> Result<u64, crate::logstore::LogError> {
        project.log.append(self.clock.epoch_ms(), Direction::Agent, value.clone())
    }
}

#[cfg(test)]
#[path = "stream_tests.rs"]
mod tests;
