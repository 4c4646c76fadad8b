// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution specs: the full run lifecycle, kill, limits, session reset.

use super::prelude::*;
use serde_json::json;

#[tokio::test]
async fn create_execute_complete() {
    let daemon = TestDaemon::start().await;
    let workdir = daemon.workdir("proj");
    let mut client = daemon.connect().await;

    let id = create_project(&mut client, &workdir).await;
    join_project(&mut client, &id).await;
    execute(&mut client, &id, "do the thing").await;

    let executing = client.recv_type("project_state").await;
    assert_eq!(executing["data"]["state"], "EXECUTING");

    let frames = client
        .collect_until(|f| f["type"] == "project_state" && f["data"]["state"] != "EXECUTING")
        .await;
    let agent_messages: Vec<_> =
        frames.iter().filter(|f| f["type"] == "agent_message").collect();
    assert!(!agent_messages.is_empty());
    assert_eq!(agent_messages[0]["data"]["type"], "assistant");

    let final_state = frames.last().unwrap();
    assert_eq!(final_state["data"]["state"], "IDLE");
    assert_eq!(final_state["data"]["session_id"], "S1");

    // Metadata on disk carries the captured session id.
    let on_disk = daemon.ctx.store.load_all().unwrap();
    assert_eq!(on_disk.len(), 1);
    assert_eq!(on_disk[0].session_id, "S1");
}

#[tokio::test]
async fn kill_during_execution_reaches_a_terminal_state() {
    let daemon = TestDaemon::start_with(SLOW_CLI, |_| {}).await;
    let workdir = daemon.workdir("proj");
    let mut client = daemon.connect().await;

    let id = create_project(&mut client, &workdir).await;
    join_project(&mut client, &id).await;
    execute(&mut client, &id, "long task").await;

    let executing = client.recv_type("project_state").await;
    assert_eq!(executing["data"]["state"], "EXECUTING");

    client.send(json!({ "type": "agent_kill", "project_id": id })).await;

    let terminal = client.recv_type("project_state").await;
    let state = terminal["data"]["state"].as_str().unwrap();
    assert!(state == "IDLE" || state == "ERROR", "unexpected state {state}");

    // No execution record remains.
    assert!(daemon.ctx.engine.active().is_empty());
}

#[tokio::test]
async fn two_subscribers_see_the_same_ordered_stream() {
    let daemon = TestDaemon::start().await;
    let workdir = daemon.workdir("proj");
    let mut a = daemon.connect().await;
    let mut b = daemon.connect().await;

    let id = create_project(&mut a, &workdir).await;
    join_project(&mut a, &id).await;
    join_project(&mut b, &id).await;

    execute(&mut a, &id, "shared run").await;

    let done =
        |f: &serde_json::Value| f["type"] == "project_state" && f["data"]["state"] == "IDLE";
    let seen_a = a.collect_until(done).await;
    let seen_b = b.collect_until(done).await;

    let stream_of = |frames: &[serde_json::Value]| {
        frames
            .iter()
            .filter(|f| f["type"] == "agent_message")
            .map(|f| f["data"].clone())
            .collect::<Vec<_>>()
    };
    let stream_a = stream_of(&seen_a);
    let stream_b = stream_of(&seen_b);
    assert!(!stream_a.is_empty());
    assert_eq!(stream_a, stream_b);
}

#[tokio::test]
async fn execute_while_executing_is_process_active() {
    let daemon = TestDaemon::start_with(SLOW_CLI, |_| {}).await;
    let workdir = daemon.workdir("proj");
    let mut client = daemon.connect().await;

    let id = create_project(&mut client, &workdir).await;
    join_project(&mut client, &id).await;
    execute(&mut client, &id, "first").await;
    client.recv_type("project_state").await;

    execute(&mut client, &id, "second").await;
    client.expect_error("PROCESS_ACTIVE").await;

    // Deleting an executing project is also refused.
    client.send(json!({ "type": "project_delete", "project_id": id })).await;
    client.expect_error("PROCESS_ACTIVE").await;

    client.send(json!({ "type": "agent_kill", "project_id": id })).await;
    client.recv_type("project_state").await;
}

#[tokio::test]
async fn concurrency_cap_yields_resource_limit() {
    let daemon =
        TestDaemon::start_with(SLOW_CLI, |c| c.max_concurrent_executions = 1).await;
    let mut client = daemon.connect().await;

    let a = create_project(&mut client, &daemon.workdir("a")).await;
    let b = create_project(&mut client, &daemon.workdir("b")).await;

    execute(&mut client, &a, "first").await;
    // Unjoined caller gets a direct project_state reply.
    let state = client.recv_type("project_state").await;
    assert_eq!(state["data"]["state"], "EXECUTING");

    execute(&mut client, &b, "second").await;
    client.expect_error("RESOURCE_LIMIT").await;

    client.send(json!({ "type": "agent_kill", "project_id": a })).await;
    // Unjoined caller: wait for the engine to drain instead of a frame.
    let deadline = tokio::time::Instant::now() + RECV_TIMEOUT;
    while !daemon.ctx.engine.active().is_empty() {
        assert!(tokio::time::Instant::now() < deadline, "execution never drained");
        tokio::time::sleep(std::time::Duration::from_millis(25)).await;
    }
}

#[tokio::test]
async fn empty_prompt_is_rejected() {
    let daemon = TestDaemon::start().await;
    let workdir = daemon.workdir("proj");
    let mut client = daemon.connect().await;

    let id = create_project(&mut client, &workdir).await;
    client
        .send(json!({ "type": "execute", "project_id": id, "data": { "prompt": "  " } }))
        .await;
    client.expect_error("INVALID_MESSAGE").await;
}

#[tokio::test]
async fn failed_execution_reports_and_recovers_via_session_reset() {
    let daemon = TestDaemon::start_with(FAILING_CLI, |_| {}).await;
    let workdir = daemon.workdir("proj");
    let mut client = daemon.connect().await;

    let id = create_project(&mut client, &workdir).await;
    join_project(&mut client, &id).await;
    execute(&mut client, &id, "will fail").await;

    let executing = client.recv_type("project_state").await;
    assert_eq!(executing["data"]["state"], "EXECUTING");

    let error = client.expect_error("EXECUTION_FAILED").await;
    assert!(error["data"]["message"].as_str().unwrap().contains("exit"));

    let errored = client.recv_type("project_state").await;
    assert_eq!(errored["data"]["state"], "ERROR");

    // Executing from ERROR is refused until the session is reset.
    execute(&mut client, &id, "again").await;
    client.expect_error("EXECUTION_FAILED").await;

    client.send(json!({ "type": "agent_new_session", "project_id": id })).await;
    client.recv_type("session_reset").await;
    let reset = client.recv_type("project_state").await;
    assert_eq!(reset["data"]["state"], "IDLE");
    assert_eq!(reset["data"]["session_id"], "");
}

#[tokio::test]
async fn new_session_clears_continuation_token() {
    let daemon = TestDaemon::start().await;
    let workdir = daemon.workdir("proj");
    let mut client = daemon.connect().await;

    let id = create_project(&mut client, &workdir).await;
    join_project(&mut client, &id).await;
    execute(&mut client, &id, "run").await;
    let done = client
        .collect_until(|f| f["type"] == "project_state" && f["data"]["state"] == "IDLE")
        .await;
    assert_eq!(done.last().unwrap()["data"]["session_id"], "S1");

    client.send(json!({ "type": "agent_new_session", "project_id": id })).await;
    client.recv_type("session_reset").await;
    let state = client.recv_type("project_state").await;
    assert_eq!(state["data"]["session_id"], "");

    let on_disk = daemon.ctx.store.load_all().unwrap();
    assert_eq!(on_disk[0].session_id, "");
}

#[tokio::test]
async fn new_session_refused_while_executing() {
    let daemon = TestDaemon::start_with(SLOW_CLI, |_| {}).await;
    let workdir = daemon.workdir("proj");
    let mut client = daemon.connect().await;

    let id = create_project(&mut client, &workdir).await;
    join_project(&mut client, &id).await;
    execute(&mut client, &id, "long").await;
    client.recv_type("project_state").await;

    client.send(json!({ "type": "agent_new_session", "project_id": id })).await;
    client.expect_error("PROCESS_ACTIVE").await;

    client.send(json!({ "type": "agent_kill", "project_id": id })).await;
    client.recv_type("project_state").await;
}

#[tokio::test]
async fn kill_without_execution_is_process_not_found() {
    let daemon = TestDaemon::start().await;
    let workdir = daemon.workdir("proj");
    let mut client = daemon.connect().await;

    let id = create_project(&mut client, &workdir).await;
    client.send(json!({ "type": "agent_kill", "project_id": id })).await;
    client.expect_error("PROCESS_NOT_FOUND").await;
}

#[tokio::test]
async fn session_id_is_reused_for_continuation() {
    let daemon = TestDaemon::start().await;
    let workdir = daemon.workdir("proj");
    let mut client = daemon.connect().await;

    let id = create_project(&mut client, &workdir).await;
    join_project(&mut client, &id).await;

    execute(&mut client, &id, "first").await;
    client
        .collect_until(|f| f["type"] == "project_state" && f["data"]["state"] == "IDLE")
        .await;

    // Second run continues from the captured session id.
    execute(&mut client, &id, "second").await;
    let frames = client
        .collect_until(|f| f["type"] == "project_state" && f["data"]["state"] == "IDLE")
        .await;
    assert_eq!(frames.last().unwrap()["data"]["session_id"], "S1");
}
