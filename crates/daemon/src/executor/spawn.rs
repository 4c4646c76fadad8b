// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI process creation.
//!
//! The CLI is invoked non-interactively with streaming JSON output; the
//! prompt travels over stdin only, never in argv. The child gets its own
//! process group so it and any subprocesses can be signaled as a unit.

use std::path::Path;
use std::process::Stdio;

use tether_wire::ExecuteOptions;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};

use crate::lifecycle::Config;

/// A spawned CLI child. `pid` doubles as the process group id.
pub(crate) struct CliProcess {
    pub child: Child,
    pub pid: i32,
}

/// Build the CLI argument list.
///
/// Session continuation, tool allow/deny lists (per-execute overrides beat
/// the configured defaults), then pass-through options.
pub(crate) fn build_args(
    config: &Config,
    session_id: &str,
    options: &ExecuteOptions,
) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "--print".into(),
        "--verbose".into(),
        "--output-format".into(),
        "stream-json".into(),
    ];

    if !session_id.is_empty() {
        args.push("--resume".into());
        args.push(session_id.to_string());
    }

    let allowed = if options.allowed_tools.is_empty() {
        &config.cli_allowed_tools
    } else {
        &options.allowed_tools
    };
    if !allowed.is_empty() {
        args.push("--allowed-tools".into());
        args.push(allowed.join(","));
    }

    let disallowed = if options.disallowed_tools.is_empty() {
        &config.cli_disallowed_tools
    } else {
        &options.disallowed_tools
    };
    if !disallowed.is_empty() {
        args.push("--disallowed-tools".into());
        args.push(disallowed.join(","));
    }

    args.extend(options.extra_args.iter().cloned());
    args
}

/// Spawn the CLI in the project directory with piped stdio.
pub(crate) fn spawn_cli(
    config: &Config,
    project_path: &Path,
    args: &[String],
) -> std::io::Result<CliProcess> {
    let mut cmd = Command::new(&config.cli_binary);
    cmd.args(args)
        .current_dir(project_path)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    #[cfg(unix)]
    cmd.process_group(0);

    let child = cmd.spawn()?;
    let pid = child.id().map(|p| p as i32).unwrap_or(0);
    Ok(CliProcess { child, pid })
}

/// Write the prompt to stdin exactly once and close it.
pub(crate) async fn deliver_prompt(child: &mut Child, prompt: &str) -> std::io::Result<()> {
    let mut stdin = child.stdin.take().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::BrokenPipe, "child stdin not captured")
    })?;
    stdin.write_all(prompt.as_bytes()).await?;
    stdin.shutdown().await?;
    Ok(())
}

#[cfg(test)]
#[path = "spawn_tests.rs"]
mod tests;
