// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures: an in-process daemon and a WebSocket test client.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tether_core::{ProjectId, SystemClock};
use tether_daemon::lifecycle::{self, Config, StartupResult};
use tether_daemon::server::ListenCtx;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

/// Timeout applied to every receive in tests.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(10);

/// Stub CLI: one quick successful run with a session id.
pub const DEFAULT_CLI: &str = r#"cat > /dev/null
echo '{"type":"system","subtype":"init","session_id":"S1"}'
echo '{"type":"assistant","message":{"content":"hello"}}'
echo '{"type":"result","subtype":"success"}'
"#;

/// Stub CLI: announces itself, then hangs until killed.
pub const SLOW_CLI: &str = r#"cat > /dev/null
echo '{"type":"system","subtype":"init","session_id":"S-slow"}'
sleep 30
"#;

/// Stub CLI: fails with a nonzero exit.
pub const FAILING_CLI: &str = r#"cat > /dev/null
echo 'something went wrong' >&2
exit 1
"#;

pub struct TestDaemon {
    pub ctx: Arc<ListenCtx<SystemClock>>,
    pub addr: String,
    pub dir: tempfile::TempDir,
    _lock: std::fs::File,
}

impl TestDaemon {
    pub async fn start() -> Self {
        Self::start_with(DEFAULT_CLI, |_| {}).await
    }

    pub async fn start_with(cli_body: &str, tweak: impl FnOnce(&mut Config)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let cli = write_script(dir.path(), "stub-cli", cli_body);

        let mut config = Config::with_data_dir(dir.path());
        config.listen_addr = "127.0.0.1:0".to_string();
        config.cli_binary = cli;
        config.graceful_kill_window = Duration::from_millis(300);
        config.force_kill_window = Duration::from_millis(500);
        tweak(&mut config);

        let StartupResult { ctx, listener, lock_file } =
            lifecycle::startup(config).await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        tokio::spawn(tether_daemon::server::run_listener(listener, ctx.clone()));
        tokio::spawn(tether_daemon::resources::run_monitor(
            ctx.clock.clone(),
            ctx.config.clone(),
            ctx.resources.clone(),
            ctx.registry.clone(),
            ctx.sessions.clone(),
            ctx.started_at,
            ctx.shutdown.clone(),
        ));

        Self { ctx, addr, dir, _lock: lock_file }
    }

    /// Create a directory suitable as a project path.
    pub fn workdir(&self, name: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::create_dir_all(&path).unwrap();
        path
    }

    pub async fn connect(&self) -> Client {
        let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{}", self.addr))
            .await
            .unwrap();
        let mut client = Client { ws };
        // Every connection is greeted with health_status (a server_stats
        // broadcast may interleave first).
        let greeting = client.recv_type("health_status").await;
        assert_eq!(greeting["data"]["status"], "ok");
        client
    }

    /// Raw connection without consuming the greeting (for limit tests).
    pub async fn connect_raw(&self) -> Client {
        let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{}", self.addr))
            .await
            .unwrap();
        Client { ws }
    }

    pub fn segment_count(&self, project_id: &str) -> usize {
        let dir = self.ctx.store.logs_dir(&ProjectId::from_string(project_id));
        std::fs::read_dir(dir).unwrap().count()
    }

    pub async fn shutdown(&self) {
        lifecycle::shutdown(&self.ctx).await;
    }
}

pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

pub struct Client {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl Client {
    pub async fn send(&mut self, frame: Value) {
        self.ws.send(Message::text(frame.to_string())).await.unwrap();
    }

    pub async fn send_text(&mut self, text: String) {
        self.ws.send(Message::text(text)).await.unwrap();
    }

    /// Next text frame as JSON, skipping control frames. None when the
    /// connection closed.
    pub async fn recv(&mut self) -> Option<Value> {
        let deadline = tokio::time::Instant::now() + RECV_TIMEOUT;
        loop {
            let frame = tokio::time::timeout_at(deadline, self.ws.next())
                .await
                .expect("timed out waiting for a frame");
            match frame {
                Some(Ok(Message::Text(text))) => {
                    return Some(serde_json::from_str(text.as_str()).unwrap());
                }
                Some(Ok(Message::Close(_))) | None => return None,
                Some(Ok(_)) => continue,
                Some(Err(_)) => return None,
            }
        }
    }

    /// Skip frames until one of the given type arrives.
    pub async fn recv_type(&mut self, kind: &str) -> Value {
        loop {
            let frame = self.recv().await.unwrap_or_else(|| {
                panic!("connection closed while waiting for {kind}")
            });
            if frame["type"] == kind {
                return frame;
            }
        }
    }

    /// Collect frames until `stop` matches; returns everything seen
    /// (stop frame included, control/status frames excluded).
    pub async fn collect_until(&mut self, stop: impl Fn(&Value) -> bool) -> Vec<Value> {
        let mut frames = Vec::new();
        loop {
            let frame = self
                .recv()
                .await
                .expect("connection closed while collecting frames");
            let done = stop(&frame);
            frames.push(frame);
            if done {
                return frames;
            }
        }
    }

    /// Expect an `error` frame with the given code.
    pub async fn expect_error(&mut self, code: &str) -> Value {
        let frame = self.recv_type("error").await;
        assert_eq!(frame["data"]["code"], code, "unexpected error frame: {frame}");
        frame
    }

    /// True when the server has closed the connection.
    pub async fn closed(&mut self) -> bool {
        self.recv().await.is_none()
    }

    /// Wait for the next raw message of any kind (used by heartbeat tests).
    pub async fn recv_raw(&mut self) -> Option<Message> {
        let deadline = tokio::time::Instant::now() + RECV_TIMEOUT;
        match tokio::time::timeout_at(deadline, self.ws.next()).await {
            Ok(Some(Ok(message))) => Some(message),
            _ => None,
        }
    }
}

/// Convenience: create a project and return its id.
pub async fn create_project(client: &mut Client, path: &Path) -> String {
    client
        .send(serde_json::json!({
            "type": "project_create",
            "data": { "path": path.to_string_lossy() }
        }))
        .await;
    let state = client.recv_type("project_state").await;
    assert_eq!(state["data"]["state"], "IDLE");
    state["data"]["id"].as_str().unwrap().to_string()
}

/// Convenience: join a project.
pub async fn join_project(client: &mut Client, project_id: &str) {
    client
        .send(serde_json::json!({ "type": "project_join", "project_id": project_id }))
        .await;
    client.recv_type("project_joined").await;
    client.recv_type("project_state").await;
}

/// Convenience: send an execute request.
pub async fn execute(client: &mut Client, project_id: &str, prompt: &str) {
    client
        .send(serde_json::json!({
            "type": "execute",
            "project_id": project_id,
            "data": { "prompt": prompt }
        }))
        .await;
}
