// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Project lifecycle specs: creation, nesting, limits, join/leave, delete.

use super::prelude::*;
use serde_json::json;

#[tokio::test]
async fn create_then_list_shows_canonical_path() {
    let daemon = TestDaemon::start().await;
    let workdir = daemon.workdir("proj");
    let mut client = daemon.connect().await;

    // Un-normalized input path
    let raw = format!("{}/./proj", daemon.dir.path().display());
    client.send(json!({ "type": "project_create", "data": { "path": raw } })).await;
    let state = client.recv_type("project_state").await;
    assert_eq!(state["data"]["state"], "IDLE");

    client.send(json!({ "type": "project_list" })).await;
    let list = client.recv_type("project_list_response").await;
    let projects = list["data"]["projects"].as_array().unwrap();
    assert_eq!(projects.len(), 1);
    assert_eq!(
        projects[0]["path"].as_str().unwrap(),
        workdir.canonicalize().unwrap().to_string_lossy()
    );
    assert_eq!(projects[0]["subscriber_count"], 0);
}

#[tokio::test]
async fn invalid_paths_are_rejected() {
    let daemon = TestDaemon::start().await;
    let mut client = daemon.connect().await;

    client.send(json!({ "type": "project_create", "data": { "path": "" } })).await;
    client.expect_error("INVALID_PATH").await;

    client
        .send(json!({ "type": "project_create", "data": { "path": "relative/path" } }))
        .await;
    client.expect_error("INVALID_PATH").await;

    client
        .send(json!({ "type": "project_create", "data": { "path": "/does/not/exist" } }))
        .await;
    client.expect_error("INVALID_PATH").await;

    // The connection stays usable after typed errors.
    client.send(json!({ "type": "project_list" })).await;
    client.recv_type("project_list_response").await;
}

#[tokio::test]
async fn nesting_is_rejected_but_siblings_are_fine() {
    let daemon = TestDaemon::start().await;
    let proj_a = daemon.workdir("srv/projA");
    let sub = daemon.workdir("srv/projA/sub");
    let proj_b = daemon.workdir("srv/projB");
    let mut client = daemon.connect().await;

    create_project(&mut client, &proj_a).await;

    client
        .send(json!({ "type": "project_create", "data": { "path": sub.to_string_lossy() } }))
        .await;
    client.expect_error("PROJECT_NESTING").await;

    // Sibling still works
    create_project(&mut client, &proj_b).await;
}

#[tokio::test]
async fn project_limit_frees_after_delete() {
    let daemon = TestDaemon::start_with(DEFAULT_CLI, |c| c.max_projects = 2).await;
    let mut client = daemon.connect().await;

    let _a = create_project(&mut client, &daemon.workdir("a")).await;
    let b = create_project(&mut client, &daemon.workdir("b")).await;

    let c_dir = daemon.workdir("c");
    client
        .send(json!({ "type": "project_create", "data": { "path": c_dir.to_string_lossy() } }))
        .await;
    client.expect_error("PROJECT_LIMIT").await;

    client.send(json!({ "type": "project_delete", "project_id": b })).await;
    client.recv_type("project_deleted").await;

    create_project(&mut client, &c_dir).await;
}

#[tokio::test]
async fn join_and_leave_maintain_subscriber_count() {
    let daemon = TestDaemon::start().await;
    let workdir = daemon.workdir("proj");
    let mut a = daemon.connect().await;
    let mut b = daemon.connect().await;

    let id = create_project(&mut a, &workdir).await;
    join_project(&mut a, &id).await;
    join_project(&mut b, &id).await;

    a.send(json!({ "type": "project_list" })).await;
    let list = a.recv_type("project_list_response").await;
    assert_eq!(list["data"]["projects"][0]["subscriber_count"], 2);

    b.send(json!({ "type": "project_leave", "project_id": id })).await;
    b.recv_type("project_left").await;

    a.send(json!({ "type": "project_list" })).await;
    let list = a.recv_type("project_list_response").await;
    assert_eq!(list["data"]["projects"][0]["subscriber_count"], 1);
}

#[tokio::test]
async fn closing_a_connection_removes_its_subscription() {
    let daemon = TestDaemon::start().await;
    let workdir = daemon.workdir("proj");
    let mut a = daemon.connect().await;

    let id = create_project(&mut a, &workdir).await;
    {
        let mut b = daemon.connect().await;
        join_project(&mut b, &id).await;
        drop(b);
    }

    // The dropped session disappears from the subscriber set.
    let project_id = tether_core::ProjectId::from_string(&id);
    let deadline = tokio::time::Instant::now() + RECV_TIMEOUT;
    loop {
        let count = daemon.ctx.registry.get(&project_id).unwrap().subscriber_count();
        if count == 0 {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "subscriber never removed");
        tokio::time::sleep(std::time::Duration::from_millis(25)).await;
    }
}

#[tokio::test]
async fn delete_notifies_subscribers_and_clears_them() {
    let daemon = TestDaemon::start().await;
    let workdir = daemon.workdir("proj");
    let mut a = daemon.connect().await;
    let mut b = daemon.connect().await;

    let id = create_project(&mut a, &workdir).await;
    join_project(&mut a, &id).await;

    b.send(json!({ "type": "project_delete", "project_id": id })).await;

    // Subscriber and (unsubscribed) caller both see the terminal event.
    let deleted = a.recv_type("project_deleted").await;
    assert_eq!(deleted["project_id"].as_str().unwrap(), id);
    b.recv_type("project_deleted").await;

    b.send(json!({ "type": "project_list" })).await;
    let list = b.recv_type("project_list_response").await;
    assert_eq!(list["data"]["projects"].as_array().unwrap().len(), 0);

    // Metadata directory is gone
    assert!(!daemon.ctx.store.root().join(&id).exists());
}

#[tokio::test]
async fn operations_on_unknown_projects_fail() {
    let daemon = TestDaemon::start().await;
    let mut client = daemon.connect().await;

    for op in ["project_join", "project_delete", "agent_kill", "get_messages"] {
        client
            .send(json!({ "type": op, "project_id": "prj-missing", "data": { "since": 0 } }))
            .await;
        client.expect_error("PROJECT_NOT_FOUND").await;
    }
}

#[tokio::test]
async fn unknown_message_type_is_reported_without_closing() {
    let daemon = TestDaemon::start().await;
    let mut client = daemon.connect().await;

    client.send(json!({ "type": "reboot_universe" })).await;
    client.expect_error("INVALID_MESSAGE").await;

    client.send_text("{definitely not json".to_string()).await;
    client.expect_error("INVALID_MESSAGE").await;

    client.send(json!({ "type": "project_list" })).await;
    client.recv_type("project_list_response").await;
}

#[tokio::test]
async fn joining_a_second_project_leaves_the_first() {
    let daemon = TestDaemon::start().await;
    let mut client = daemon.connect().await;

    let a = create_project(&mut client, &daemon.workdir("a")).await;
    let b = create_project(&mut client, &daemon.workdir("b")).await;

    join_project(&mut client, &a).await;
    join_project(&mut client, &b).await;

    client.send(json!({ "type": "project_list" })).await;
    let list = client.recv_type("project_list_response").await;
    let projects = list["data"]["projects"].as_array().unwrap();
    let count_of = |id: &str| {
        projects
            .iter()
            .find(|p| p["id"] == id)
            .map(|p| p["subscriber_count"].as_u64().unwrap())
            .unwrap()
    };
    assert_eq!(count_of(&a), 0);
    assert_eq!(count_of(&b), 1);
}
