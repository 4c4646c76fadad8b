// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The execution engine.
//!
//! Runs the CLI at most once per project at a time: admission against the
//! process table and the global concurrency cap, spawn into a fresh
//! process group, prompt over stdin, streamed stdout parsing, timeout, and
//! rigorous cleanup on every exit path. State transitions are applied to
//! the project, persisted, and broadcast to subscribers.

mod kill;
mod spawn;
mod stream;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde_json::json;
use tether_core::{Clock, ProjectId, StateError};
use tether_wire::{Direction, ErrorCode, ErrorData, ExecuteOptions, ServerMessage};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::lifecycle::Config;
use crate::registry::{broadcast, ProjectHandle};
use crate::resources::ResourceManager;
use crate::store::ProjectStore;

use kill::{terminate_group, KillDisposition};
use stream::{LineOutcome, StreamParser};

/// Bytes of stderr kept for diagnostics.
const STDERR_TAIL_BYTES: usize = 8 * 1024;

/// Client-facing execution errors.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("an execution is already active for this project")]
    ProcessActive,

    #[error("concurrent execution limit reached")]
    ResourceLimit,

    #[error("no active execution for this project")]
    ProcessNotFound,

    #[error("project is in error state; reset the session first")]
    ErrorState,

    #[error("failed to start CLI: {0}")]
    Spawn(std::io::Error),
}

/// One active execution, keyed by project id in the process table.
pub struct ProcessRecord {
    pub pid: i32,
    pub started_at: Instant,
    cancel: CancellationToken,
    force: Arc<AtomicBool>,
}

/// Why the stdout loop ended.
enum StreamEnd {
    Eof,
    AgentError(String),
    Killed { force: bool },
    TimedOut,
    ReadFailed(String),
}

/// Final disposition of one execution.
enum ExecResult {
    Success { session_id: Option<String> },
    Canceled,
    Failed { code: ErrorCode, detail: String },
}

pub struct ExecutionEngine<C: Clock> {
    config: Arc<Config>,
    clock: C,
    store: Arc<ProjectStore>,
    resources: Arc<ResourceManager>,
    table: Mutex<HashMap<ProjectId, ProcessRecord>>,
}

impl<C: Clock> ExecutionEngine<C> {
    pub fn new(
        config: Arc<Config>,
        clock: C,
        store: Arc<ProjectStore>,
        resources: Arc<ResourceManager>,
    ) -> Self {
        Self { config, clock, store, resources, table: Mutex::new(HashMap::new()) }
    }

    /// Whether a project currently has an active execution.
    pub fn is_active(&self, id: &ProjectId) -> bool {
        self.table.lock().contains_key(id)
    }

    /// Project ids with active executions.
    pub fn active(&self) -> Vec<ProjectId> {
        self.table.lock().keys().copied().collect()
    }

    /// Start an execution for a project.
    ///
    /// On success the project is EXECUTING, the `project_state` broadcast
    /// has been sent, and a reader task owns the child until it finishes.
    pub async fn execute(
        self: &Arc<Self>,
        project: Arc<ProjectHandle>,
        prompt: String,
        options: ExecuteOptions,
    ) -> Result<(), ExecError> {
        let now = self.clock.wall();

        // Admission: process table, concurrency slot, then the state
        // machine, all under the table lock so two executes cannot both
        // pass.
        {
            let table = self.table.lock();
            if table.contains_key(&project.id) {
                return Err(ExecError::ProcessActive);
            }
            if !self.resources.try_acquire_execution() {
                return Err(ExecError::ResourceLimit);
            }
            if let Err(e) = project.with_meta(|m| m.begin_execution(now)) {
                self.resources.release_execution();
                return Err(match e {
                    StateError::AlreadyExecuting => ExecError::ProcessActive,
                    _ => ExecError::ErrorState,
                });
            }
        }

        // The prompt goes into the log before it reaches the CLI. Log
        // failures never abort the execution.
        let prompt_entry = json!({ "type": "prompt", "prompt": prompt });
        if let Err(e) =
            project.log.append(self.clock.epoch_ms(), Direction::Client, prompt_entry)
        {
            warn!(project_id = %project.id, error = %e, "failed to log prompt");
        }

        let session_id = project.with_meta(|m| m.session_id.clone());
        let args = spawn::build_args(&self.config, &session_id, &options);
        let mut cli = match spawn::spawn_cli(&self.config, &project.path, &args) {
            Ok(cli) => cli,
            Err(e) => {
                self.abort_before_start(&project, format!("failed to start CLI: {e}")).await;
                return Err(ExecError::Spawn(e));
            }
        };

        info!(project_id = %project.id, pid = cli.pid, "execution started");

        let cancel = CancellationToken::new();
        let force = Arc::new(AtomicBool::new(false));
        {
            let mut table = self.table.lock();
            table.insert(
                project.id,
                ProcessRecord {
                    pid: cli.pid,
                    started_at: self.clock.now(),
                    cancel: cancel.clone(),
                    force: Arc::clone(&force),
                },
            );
        }

        self.persist(&project);
        broadcast(&project, &ServerMessage::project_state(&project.snapshot(), now)).await;

        if let Err(e) = spawn::deliver_prompt(&mut cli.child, &prompt).await {
            warn!(project_id = %project.id, error = %e, "failed to write prompt to CLI stdin");
            // The reader task will observe the child's reaction (exit or
            // error output) and finish the execution normally.
        }

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            engine.run_to_completion(project, cli.child, cli.pid, cancel, force).await;
        });
        Ok(())
    }

    /// Request termination of a project's execution.
    ///
    /// Graceful by default: SIGTERM, a bounded wait, then SIGKILL on the
    /// whole group. `force` skips the graceful window.
    pub fn kill(&self, id: &ProjectId, force: bool) -> Result<(), ExecError> {
        let table = self.table.lock();
        let record = table.get(id).ok_or(ExecError::ProcessNotFound)?;
        if force {
            record.force.store(true, Ordering::Release);
        }
        record.cancel.cancel();
        Ok(())
    }

    /// Cancel every active execution (graceful). Returns how many were
    /// signaled.
    pub fn kill_all(&self) -> usize {
        let table = self.table.lock();
        for record in table.values() {
            record.cancel.cancel();
        }
        table.len()
    }

    /// Escalate every remaining execution to an immediate SIGKILL.
    pub fn force_kill_all(&self) {
        let table = self.table.lock();
        for record in table.values() {
            record.force.store(true, Ordering::Release);
            signal_now(record);
        }
    }

    /// Wait until the process table drains, bounded. True when drained.
    pub async fn wait_idle(&self, timeout: std::time::Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.table.lock().is_empty() {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
    }

    /// The reader task: owns the child from prompt delivery to the final
    /// state broadcast.
    async fn run_to_completion(
        self: Arc<Self>,
        project: Arc<ProjectHandle>,
        mut child: Child,
        pid: i32,
        cancel: CancellationToken,
        force: Arc<AtomicBool>,
    ) {
        let stderr_task = child.stderr.take().map(tail_stderr);

        let mut parser = StreamParser::new(self.clock.clone());
        let end = match child.stdout.take() {
            Some(stdout) => {
                let mut lines = BufReader::new(stdout).lines();
                let deadline = tokio::time::sleep(self.config.execution_timeout);
                tokio::pin!(deadline);
                loop {
                    tokio::select! {
                        _ = &mut deadline => break StreamEnd::TimedOut,
                        _ = cancel.cancelled() => {
                            break StreamEnd::Killed { force: force.load(Ordering::Acquire) };
                        }
                        line = lines.next_line() => match line {
                            Ok(Some(line)) => {
                                if let LineOutcome::Stop(detail) =
                                    parser.handle_line(&project, &line).await
                                {
                                    break StreamEnd::AgentError(detail);
                                }
                            }
                            Ok(None) => break StreamEnd::Eof,
                            Err(e) => break StreamEnd::ReadFailed(e.to_string()),
                        }
                    }
                }
            }
            None => StreamEnd::ReadFailed("child stdout not captured".to_string()),
        };

        let graceful = self.config.graceful_kill_window;
        let forceful = self.config.force_kill_window;

        let result = match end {
            StreamEnd::Eof => {
                // Stdout closed; give the child the graceful window to
                // exit on its own before escalating.
                match tokio::time::timeout(graceful, child.wait()).await {
                    Ok(Ok(status)) if status.success() => {
                        ExecResult::Success { session_id: parser.session_id.take() }
                    }
                    Ok(Ok(status)) => ExecResult::Failed {
                        code: ErrorCode::ExecutionFailed,
                        detail: format!("CLI exited with {status}"),
                    },
                    Ok(Err(e)) => ExecResult::Failed {
                        code: ErrorCode::ExecutionFailed,
                        detail: format!("wait on CLI failed: {e}"),
                    },
                    Err(_) => {
                        let disposition =
                            terminate_group(&mut child, pid, true, graceful, forceful).await;
                        log_stuck(&project, pid, &disposition);
                        ExecResult::Failed {
                            code: ErrorCode::ExecutionFailed,
                            detail: "CLI did not exit after closing its output".to_string(),
                        }
                    }
                }
            }
            StreamEnd::AgentError(detail) => {
                let disposition =
                    terminate_group(&mut child, pid, false, graceful, forceful).await;
                log_stuck(&project, pid, &disposition);
                ExecResult::Failed { code: ErrorCode::ExecutionFailed, detail }
            }
            StreamEnd::Killed { force } => {
                let disposition =
                    terminate_group(&mut child, pid, force, graceful, forceful).await;
                log_stuck(&project, pid, &disposition);
                ExecResult::Canceled
            }
            StreamEnd::TimedOut => {
                let disposition =
                    terminate_group(&mut child, pid, false, graceful, forceful).await;
                log_stuck(&project, pid, &disposition);
                ExecResult::Failed {
                    code: ErrorCode::ExecutionTimeout,
                    detail: "execution deadline exceeded".to_string(),
                }
            }
            StreamEnd::ReadFailed(detail) => {
                let disposition =
                    terminate_group(&mut child, pid, false, graceful, forceful).await;
                log_stuck(&project, pid, &disposition);
                ExecResult::Failed {
                    code: ErrorCode::ExecutionFailed,
                    detail: format!("reading CLI output failed: {detail}"),
                }
            }
        };

        let stderr_tail = match stderr_task {
            Some(task) => collect_stderr(task).await,
            None => String::new(),
        };

        self.finish(&project, result, stderr_tail).await;
    }

    /// Remove the record, apply the final transition, persist, broadcast.
    async fn finish(&self, project: &ProjectHandle, result: ExecResult, stderr_tail: String) {
        let now = self.clock.wall();
        {
            let mut table = self.table.lock();
            table.remove(&project.id);
            let transition = project.with_meta(|m| match &result {
                ExecResult::Success { session_id } => {
                    m.complete_execution(session_id.clone(), now)
                }
                ExecResult::Canceled => m.complete_execution(None, now),
                ExecResult::Failed { detail, .. } => m.fail_execution(detail.clone(), now),
            });
            if let Err(e) = transition {
                warn!(project_id = %project.id, error = %e, "unexpected final state transition");
            }
        }
        self.resources.release_execution();
        self.persist(project);

        if let ExecResult::Failed { code, detail } = &result {
            let mut data = ErrorData::new(*code, sanitize(detail));
            if !stderr_tail.is_empty() {
                data = data.with_details(sanitize(&stderr_tail));
            }
            broadcast(project, &ServerMessage::error_for(project.id, data, now)).await;
        }

        match &result {
            ExecResult::Success { .. } => {
                info!(project_id = %project.id, "execution completed")
            }
            ExecResult::Canceled => info!(project_id = %project.id, "execution canceled"),
            ExecResult::Failed { code, detail } => {
                warn!(project_id = %project.id, code = %code, detail = %detail, "execution failed")
            }
        }

        broadcast(project, &ServerMessage::project_state(&project.snapshot(), now)).await;
    }

    /// Failure before the child existed: undo the state transition and
    /// tell subscribers.
    async fn abort_before_start(&self, project: &ProjectHandle, detail: String) {
        let now = self.clock.wall();
        self.resources.release_execution();
        if let Err(e) = project.with_meta(|m| m.fail_execution(detail.clone(), now)) {
            warn!(project_id = %project.id, error = %e, "state transition after spawn failure");
        }
        self.persist(project);
        let data = ErrorData::new(ErrorCode::ExecutionFailed, sanitize(&detail));
        broadcast(project, &ServerMessage::error_for(project.id, data, now)).await;
        broadcast(project, &ServerMessage::project_state(&project.snapshot(), now)).await;
    }

    fn persist(&self, project: &ProjectHandle) {
        if let Err(e) = self.store.save(&project.meta()) {
            error!(project_id = %project.id, error = %e, "failed to persist project metadata");
        }
    }
}

fn signal_now(record: &ProcessRecord) {
    kill::signal_group(record.pid, nix::sys::signal::Signal::SIGKILL);
}

fn log_stuck(project: &ProjectHandle, pid: i32, disposition: &KillDisposition) {
    if matches!(disposition, KillDisposition::Stuck) {
        error!(project_id = %project.id, pid, "stuck process left behind after force kill");
    }
}

/// Keep the last [`STDERR_TAIL_BYTES`] of stderr for diagnostics.
fn tail_stderr(stderr: ChildStderr) -> tokio::task::JoinHandle<String> {
    tokio::spawn(async move {
        let mut reader = BufReader::new(stderr);
        let mut tail: Vec<u8> = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    tail.extend_from_slice(&buf[..n]);
                    if tail.len() > STDERR_TAIL_BYTES {
                        let cut = tail.len() - STDERR_TAIL_BYTES;
                        tail.drain(..cut);
                    }
                }
            }
        }
        String::from_utf8_lossy(&tail).into_owned()
    })
}

async fn collect_stderr(mut task: tokio::task::JoinHandle<String>) -> String {
    match tokio::time::timeout(std::time::Duration::from_secs(1), &mut task).await {
        Ok(Ok(tail)) => tail,
        Ok(Err(_)) => String::new(),
        Err(_) => {
            // Stuck child kept stderr open; stop reading.
            task.abort();
            String::new()
        }
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;

/// Strip user-home paths and bound the length of client-visible detail.
fn sanitize(detail: &str) -> String {
    let mut out = detail.to_string();
    if let Some(home) = dirs::home_dir() {
        out = out.replace(&home.display().to_string(), "~");
    }
    if out.len() > 500 {
        let mut cut = 500;
        while cut > 0 && !out.is_char_boundary(cut) {
            cut -= 1;
        }
        out.truncate(cut);
        out.push_str("…");
    }
    out
}
