// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-project append-only message log.
//!
//! Newline-delimited JSON entries in segment files named
//! `messages_<UTC instant>.jsonl`, so lexicographic order equals
//! chronological order. A segment is closed and a new one opened when it
//! reaches either the byte or the entry threshold; closed segments are
//! never modified or deleted.
//!
//! One writer per log, serialized under the log mutex. Readers open fresh
//! file handles and may run concurrently with the writer.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use tether_wire::{Direction, LogEntry};
use thiserror::Error;
use tracing::debug;

const SEGMENT_PREFIX: &str = "messages_";
const SEGMENT_SUFFIX: &str = ".jsonl";

/// Filesystem mtime can be coarser than entry timestamps; a segment is only
/// skipped when its mtime is older than `since` by more than this slack.
const MTIME_SLACK_MS: u64 = 2_000;

/// Errors from log I/O.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("log is closed")]
    Closed,
}

/// Dual rotation thresholds. A segment rotates when it reaches either.
#[derive(Debug, Clone, Copy)]
pub struct RotateLimits {
    pub bytes: u64,
    pub entries: usize,
}

struct Segment {
    file: File,
    bytes: u64,
    entries: usize,
    /// Timestamp of the most recent entry, used to keep the per-log
    /// timeline nondecreasing across wall-clock hiccups.
    last_ts: u64,
}

/// Append-only segmented log for one project.
pub struct MessageLog {
    dir: PathBuf,
    limits: RotateLimits,
    inner: Mutex<Option<Segment>>,
}

fn segment_name(ts_ms: u64) -> String {
    let instant = match Utc.timestamp_millis_opt(ts_ms as i64) {
        chrono::LocalResult::Single(dt) => dt,
        _ => chrono::DateTime::<Utc>::UNIX_EPOCH,
    };
    format!("{SEGMENT_PREFIX}{}{SEGMENT_SUFFIX}", instant.format("%Y%m%d%H%M%S%3f"))
}

fn is_segment(name: &str) -> bool {
    name.starts_with(SEGMENT_PREFIX) && name.ends_with(SEGMENT_SUFFIX)
}

/// Sorted list of segment paths; filename order is chronological order.
fn list_segments(dir: &Path) -> Result<Vec<PathBuf>, LogError> {
    let mut segments = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_segment(&name) {
            segments.push(entry.path());
        }
    }
    segments.sort();
    Ok(segments)
}

impl MessageLog {
    /// Open the log for a project, continuing the most recent segment if
    /// one exists.
    pub fn open(dir: PathBuf, limits: RotateLimits, now_ms: u64) -> Result<Self, LogError> {
        fs::create_dir_all(&dir)?;

        let segment = match list_segments(&dir)?.pop() {
            Some(path) => {
                let bytes = fs::metadata(&path)?.len();
                let (entries, last_ts) = scan_segment(&path)?;
                let file = OpenOptions::new().append(true).open(&path)?;
                Segment { file, bytes, entries, last_ts }
            }
            None => new_segment(&dir, now_ms)?,
        };

        Ok(Self { dir, limits, inner: Mutex::new(Some(segment)) })
    }

    /// Append one entry, rotating first if the current segment is full.
    ///
    /// The entry timestamp is `now_ms`, clamped so the per-log timeline
    /// never goes backwards. Returns the stamped timestamp.
    pub fn append(&self, now_ms: u64, direction: Direction, message: Value) -> Result<u64, LogError> {
        let mut guard = self.inner.lock();
        let segment = guard.as_mut().ok_or(LogError::Closed)?;

        if segment.entries >= self.limits.entries || segment.bytes >= self.limits.bytes {
            *segment = new_segment(&self.dir, now_ms.max(segment.last_ts))?;
        }

        let ts = now_ms.max(segment.last_ts);
        let entry = LogEntry { timestamp: ts, direction, message };
        let mut line = serde_json::to_vec(&entry)?;
        line.push(b'\n');

        segment.file.write_all(&line)?;
        segment.file.flush()?;
        segment.bytes += line.len() as u64;
        segment.entries += 1;
        segment.last_ts = ts;
        Ok(ts)
    }

    /// Read entries with `timestamp >= since_ms`, oldest first, up to
    /// `limit`. Segments whose last modification precedes `since_ms` are
    /// skipped entirely; unparseable lines are logged and skipped.
    pub fn read_since(&self, since_ms: u64, limit: usize) -> Result<Vec<LogEntry>, LogError> {
        let mut out = Vec::new();
        for path in list_segments(&self.dir)? {
            if out.len() >= limit {
                break;
            }
            if segment_mtime_ms(&path)?.saturating_add(MTIME_SLACK_MS) < since_ms {
                continue;
            }
            let reader = BufReader::new(File::open(&path)?);
            for line in reader.lines() {
                if out.len() >= limit {
                    break;
                }
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<LogEntry>(&line) {
                    Ok(entry) if entry.timestamp >= since_ms => out.push(entry),
                    Ok(_) => {}
                    Err(e) => {
                        debug!(path = %path.display(), error = %e, "skipping unparseable log line");
                    }
                }
            }
        }
        Ok(out)
    }

    /// Number of segment files currently on disk.
    pub fn segment_count(&self) -> Result<usize, LogError> {
        Ok(list_segments(&self.dir)?.len())
    }

    /// Flush and close the writer. Further appends fail with `Closed`;
    /// reads keep working.
    pub fn close(&self) {
        let mut guard = self.inner.lock();
        if let Some(segment) = guard.as_mut() {
            let _ = segment.file.flush();
        }
        *guard = None;
    }
}

fn new_segment(dir: &Path, ts_ms: u64) -> Result<Segment, LogError> {
    // Same-millisecond rotation gets a numeric suffix to keep names unique
    // and lexicographically increasing.
    let base = segment_name(ts_ms);
    let mut path = dir.join(&base);
    let mut n = 1u32;
    while path.exists() {
        let name = base
            .strip_suffix(SEGMENT_SUFFIX)
            .map(|stem| format!("{stem}_{n:03}{SEGMENT_SUFFIX}"))
            .unwrap_or_else(|| base.clone());
        path = dir.join(name);
        n += 1;
    }
    let file = OpenOptions::new().create_new(true).append(true).open(&path)?;
    Ok(Segment { file, bytes: 0, entries: 0, last_ts: ts_ms })
}

/// Count entries and find the last timestamp of an existing segment.
fn scan_segment(path: &Path) -> Result<(usize, u64), LogError> {
    let reader = BufReader::new(File::open(path)?);
    let mut entries = 0usize;
    let mut last_ts = 0u64;
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        entries += 1;
        if let Ok(entry) = serde_json::from_str::<LogEntry>(&line) {
            last_ts = last_ts.max(entry.timestamp);
        }
    }
    Ok((entries, last_ts))
}

fn segment_mtime_ms(path: &Path) -> Result<u64, LogError> {
    let modified = fs::metadata(path)?.modified()?;
    Ok(modified.duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64)
}

#[cfg(test)]
#[path = "logstore_tests.rs"]
mod tests;
