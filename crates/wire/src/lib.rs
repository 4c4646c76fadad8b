// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client protocol for tether.
//!
//! Frames are UTF-8 JSON objects over a WebSocket text transport. Inbound
//! envelope: `{type, project_id?, data?}`. Outbound envelope:
//! `{type, project_id?, data, timestamp}` with an RFC-3339 timestamp.
//!
//! This crate does no I/O; the daemon feeds it frame text and sends back
//! whatever it produces.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod envelope;
mod error;
mod outbound;
mod types;

pub use envelope::{ClientRequest, Envelope, WireError, MESSAGES_LIMIT};
pub use error::{ErrorCode, ErrorData};
pub use outbound::{ServerKind, ServerMessage};
pub use types::{
    Direction, ExecuteOptions, HealthStatus, LogEntry, ProjectSnapshot, ServerStats,
};
