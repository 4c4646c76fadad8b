// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.
//!
//! Every knob of the configuration surface can be overridden with a
//! `TETHER_*` variable; `Config::load` is the only consumer.

use std::path::PathBuf;
use std::time::Duration;

/// Daemon version (from Cargo.toml)
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Resolve the data directory: TETHER_DATA_DIR > XDG_STATE_HOME/tether >
/// ~/.local/state/tether
pub fn data_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("TETHER_DATA_DIR") {
        return Some(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Some(PathBuf::from(xdg).join("tether"));
    }
    dirs::home_dir().map(|home| home.join(".local/state/tether"))
}

pub fn string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.is_empty())
}

pub fn path(key: &str) -> Option<PathBuf> {
    string(key).map(PathBuf::from)
}

pub fn count(key: &str) -> Option<usize> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

pub fn bytes(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

pub fn millis(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}

/// Comma-separated list variable.
pub fn list(key: &str) -> Option<Vec<String>> {
    string(key).map(|s| {
        s.split(',').map(|t| t.trim().to_string()).filter(|t| !t.is_empty()).collect()
    })
}
