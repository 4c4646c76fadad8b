// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message-history specs: replay, pagination, rotation.

use super::prelude::*;
use serde_json::json;

/// Stub CLI emitting six agent events, for rotation tests.
const CHATTY_CLI: &str = r#"cat > /dev/null
echo '{"type":"system","subtype":"init","session_id":"S1"}'
for i in 1 2 3 4 5 6; do
  echo "{\"type\":\"assistant\",\"message\":{\"content\":\"msg $i\"}}"
done
"#;

async fn run_one_execution(daemon: &TestDaemon, client: &mut Client) -> String {
    let workdir = daemon.workdir("proj");
    let id = create_project(client, &workdir).await;
    join_project(client, &id).await;
    execute(client, &id, "collect me").await;
    client
        .collect_until(|f| {
            f["type"] == "project_state"
                && (f["data"]["state"] == "IDLE" || f["data"]["state"] == "ERROR")
        })
        .await;
    id
}

#[tokio::test]
async fn reconnect_and_replay_returns_the_streamed_messages() {
    let daemon = TestDaemon::start().await;

    let (id, streamed) = {
        let mut client = daemon.connect().await;
        let workdir = daemon.workdir("proj");
        let id = create_project(&mut client, &workdir).await;
        join_project(&mut client, &id).await;
        execute(&mut client, &id, "remember this").await;
        let frames = client
            .collect_until(|f| f["type"] == "project_state" && f["data"]["state"] == "IDLE")
            .await;
        let streamed: Vec<_> = frames
            .into_iter()
            .filter(|f| f["type"] == "agent_message")
            .map(|f| f["data"].clone())
            .collect();
        (id, streamed)
        // client dropped: disconnect
    };
    assert!(!streamed.is_empty());

    // A fresh connection replays the same events from the log.
    let mut reconnected = daemon.connect().await;
    reconnected
        .send(json!({ "type": "get_messages", "project_id": id, "data": { "since": 0 } }))
        .await;
    let response = reconnected.recv_type("messages_response").await;
    let messages = response["data"]["messages"].as_array().unwrap();

    // First entry is the client prompt, then the agent events in order.
    assert_eq!(messages[0]["direction"], "client");
    assert_eq!(messages[0]["message"]["prompt"], "remember this");
    let replayed: Vec<_> = messages
        .iter()
        .filter(|m| m["direction"] == "agent")
        .map(|m| m["message"].clone())
        .collect();
    assert_eq!(replayed, streamed);
}

#[tokio::test]
async fn timestamps_are_nondecreasing_and_limit_is_honored() {
    let daemon = TestDaemon::start_with(CHATTY_CLI, |_| {}).await;
    let mut client = daemon.connect().await;
    let id = run_one_execution(&daemon, &mut client).await;

    client
        .send(json!({ "type": "get_messages", "project_id": id, "data": { "since": 0 } }))
        .await;
    let response = client.recv_type("messages_response").await;
    let messages = response["data"]["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 7); // prompt + 6 events

    let stamps: Vec<u64> =
        messages.iter().map(|m| m["timestamp"].as_u64().unwrap()).collect();
    assert!(stamps.windows(2).all(|w| w[0] <= w[1]), "stamps regressed: {stamps:?}");

    client
        .send(json!({
            "type": "get_messages",
            "project_id": id,
            "data": { "since": 0, "limit": 3 }
        }))
        .await;
    let limited = client.recv_type("messages_response").await;
    assert_eq!(limited["data"]["messages"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn since_filters_out_older_entries() {
    let daemon = TestDaemon::start_with(CHATTY_CLI, |_| {}).await;
    let mut client = daemon.connect().await;
    let id = run_one_execution(&daemon, &mut client).await;

    client
        .send(json!({ "type": "get_messages", "project_id": id, "data": { "since": 0 } }))
        .await;
    let all = client.recv_type("messages_response").await;
    let messages = all["data"]["messages"].as_array().unwrap().clone();
    let last_ts = messages.last().unwrap()["timestamp"].as_u64().unwrap();

    // Everything before the very last timestamp is filtered out.
    client
        .send(json!({
            "type": "get_messages",
            "project_id": id,
            "data": { "since": last_ts }
        }))
        .await;
    let tail = client.recv_type("messages_response").await;
    let tail_messages = tail["data"]["messages"].as_array().unwrap();
    assert!(!tail_messages.is_empty());
    assert!(tail_messages
        .iter()
        .all(|m| m["timestamp"].as_u64().unwrap() >= last_ts));

    // And a future cutoff returns nothing.
    client
        .send(json!({
            "type": "get_messages",
            "project_id": id,
            "data": { "since": last_ts + 60_000 }
        }))
        .await;
    let empty = client.recv_type("messages_response").await;
    assert_eq!(empty["data"]["messages"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn rotation_preserves_order_across_segments() {
    let daemon = TestDaemon::start_with(CHATTY_CLI, |c| c.rotation_entries = 3).await;
    let mut client = daemon.connect().await;
    let id = run_one_execution(&daemon, &mut client).await;

    // 7 entries with a 3-entry threshold: at least three segments.
    assert!(daemon.segment_count(&id) >= 3, "segments: {}", daemon.segment_count(&id));

    client
        .send(json!({ "type": "get_messages", "project_id": id, "data": { "since": 0 } }))
        .await;
    let response = client.recv_type("messages_response").await;
    let messages = response["data"]["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 7);

    // Agent events come back in emission order across the segment break.
    let contents: Vec<String> = messages
        .iter()
        .filter(|m| m["direction"] == "agent" && m["message"]["type"] == "assistant")
        .map(|m| m["message"]["message"]["content"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(contents, vec!["msg 1", "msg 2", "msg 3", "msg 4", "msg 5", "msg 6"]);
}
