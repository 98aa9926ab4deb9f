//! Integration tests for `AppServerClient`
//!
//! Every test drives the client against a scripted in-memory agent.

#[path = "../common/mod.rs"]
mod common;

use std::time::Duration;

use common::{
    FakeAgent, ScriptedLauncher, client_with, connected, connected_with, fake_pair, init_logging,
    wait_until,
};
use futures::StreamExt;
use kodegen_codex_bridge::{
    AppServerClient, BridgeError, ClientOptions, ConnectionPhase, DynamicToolResponse,
    DynamicToolSpec, ThreadOptions, ToolKind, TurnEvent, TurnStream, dynamic_tool_executor,
};
use serde_json::json;
use tokio_test::assert_ok;

async fn drain(mut stream: TurnStream) -> Vec<kodegen_codex_bridge::Result<TurnEvent>> {
    let mut items = Vec::new();
    while let Some(item) = stream.next().await {
        items.push(item);
    }
    items
}

fn notification_methods(items: &[kodegen_codex_bridge::Result<TurnEvent>]) -> Vec<String> {
    items
        .iter()
        .filter_map(|item| match item {
            Ok(TurnEvent::Notification { method, .. }) => Some(method.clone()),
            _ => None,
        })
        .collect()
}

async fn complete_turn(agent: &mut FakeAgent, turn_id: &str) {
    agent
        .notify(
            "turn/completed",
            json!({ "threadId": "thr_1", "turn": { "id": turn_id, "status": "completed" } }),
        )
        .await;
}

// ============================================================================
// Thread lifecycle
// ============================================================================

#[tokio::test]
async fn test_start_thread_handshake() {
    init_logging();
    let options = ClientOptions::builder()
        .model("gpt-5-codex")
        .approval_policy("on-request")
        .client_info("bridge-tests", "9.9.9")
        .build();
    let (client, mut agent, launcher) = client_with(options);
    assert_eq!(client.connection_phase(), ConnectionPhase::Disconnected);

    let start = tokio::spawn({
        let client = client.clone();
        async move { client.start_or_resume_thread(ThreadOptions::default()).await }
    });

    let (id, params) = agent.expect_request("initialize").await;
    assert_eq!(params["clientInfo"]["name"], "bridge-tests");
    assert_eq!(params["clientInfo"]["version"], "9.9.9");
    assert_eq!(params["capabilities"]["experimentalApi"], false);
    agent.respond(&id, json!({})).await;
    agent.expect_notification("initialized").await;

    let (id, params) = agent.expect_request("thread/start").await;
    assert_eq!(params["model"], "gpt-5-codex");
    assert_eq!(params["approvalPolicy"], "on-request");
    assert!(params.get("threadId").is_none());
    agent.respond(&id, json!({ "thread": { "id": "thr_new" } })).await;

    let thread_id = start.await.unwrap().unwrap();
    assert_eq!(thread_id, "thr_new");
    assert_eq!(client.thread_id().as_deref(), Some("thr_new"));
    assert_eq!(client.connection_phase(), ConnectionPhase::ThreadReady);
    assert!(client.is_connected());
    assert_eq!(launcher.launches(), 1);
}

#[tokio::test]
async fn test_resume_thread_falls_back_to_supplied_id() {
    init_logging();
    let (client, mut agent, _launcher) = client_with(ClientOptions::default());

    let start = tokio::spawn({
        let client = client.clone();
        async move {
            client
                .start_or_resume_thread(ThreadOptions::resume("thr_old").with_cwd("/work"))
                .await
        }
    });

    let params = agent.handshake("thread/resume", json!({})).await;
    assert_eq!(params["threadId"], "thr_old");
    assert_eq!(params["cwd"], "/work");

    assert_eq!(start.await.unwrap().unwrap(), "thr_old");
}

#[tokio::test]
async fn test_resume_thread_prefers_response_id() {
    init_logging();
    let (client, mut agent, _launcher) = client_with(ClientOptions::default());

    let start = tokio::spawn({
        let client = client.clone();
        async move {
            client
                .start_or_resume_thread(ThreadOptions::resume("thr_old"))
                .await
        }
    });

    let params = agent
        .handshake("thread/resume", json!({ "thread": { "id": "thr_resumed" } }))
        .await;
    assert_eq!(params["threadId"], "thr_old");

    assert_eq!(start.await.unwrap().unwrap(), "thr_resumed");
    assert_eq!(client.thread_id().as_deref(), Some("thr_resumed"));
}

#[tokio::test(start_paused = true)]
async fn test_startup_timeout_bounds_whole_connect() {
    init_logging();
    let options = ClientOptions::builder()
        .startup_timeout(Duration::from_secs(1))
        .request_timeout(Duration::from_secs(30))
        .build();
    let (client, _agent, _launcher) = client_with(options);

    let err = client
        .start_or_resume_thread(ThreadOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Timeout(_)), "{err}");
    assert_eq!(client.connection_phase(), ConnectionPhase::Disconnected);
}

#[tokio::test]
async fn test_start_advertises_dynamic_tools() {
    init_logging();
    let options = ClientOptions::builder()
        .add_dynamic_tool(DynamicToolSpec::new(
            "lookup",
            "Look up a record",
            json!({ "type": "object" }),
        ))
        .build();
    let (client, mut agent, _launcher) = client_with(options);
    let start = tokio::spawn({
        let client = client.clone();
        async move { client.start_or_resume_thread(ThreadOptions::default()).await }
    });

    let (id, params) = agent.expect_request("initialize").await;
    assert_eq!(params["capabilities"]["experimentalApi"], true);
    agent.respond(&id, json!({})).await;
    let (id, params) = agent.expect_request("thread/start").await;
    assert_eq!(params["dynamicTools"][0]["name"], "lookup");
    agent.respond(&id, json!({ "threadId": "thr_dyn" })).await;

    assert_eq!(start.await.unwrap().unwrap(), "thr_dyn");
}

#[tokio::test]
async fn test_second_start_reuses_connection() {
    init_logging();
    let (client, mut agent, launcher) = client_with(ClientOptions::default());
    let start = tokio::spawn({
        let client = client.clone();
        async move { client.start_or_resume_thread(ThreadOptions::default()).await }
    });
    agent
        .handshake("thread/start", json!({ "thread": { "id": "thr_1" } }))
        .await;
    assert_ok!(start.await.unwrap());

    let again = client
        .start_or_resume_thread(ThreadOptions::resume("thr_other"))
        .await
        .unwrap();
    assert_eq!(again, "thr_1");
    assert_eq!(launcher.launches(), 1);
}

#[tokio::test]
async fn test_launch_failure_leaves_client_disconnected() {
    init_logging();
    let client = AppServerClient::with_launcher(ClientOptions::default(), ScriptedLauncher::default());

    let err = client
        .start_or_resume_thread(ThreadOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Launch(_)), "got {err:?}");
    assert_eq!(client.connection_phase(), ConnectionPhase::Disconnected);
}

#[tokio::test]
async fn test_initialize_error_is_returned() {
    init_logging();
    let (client, mut agent, _launcher) = client_with(ClientOptions::default());
    let start = tokio::spawn({
        let client = client.clone();
        async move { client.start_or_resume_thread(ThreadOptions::default()).await }
    });

    let (id, _) = agent.expect_request("initialize").await;
    agent.respond_error(&id, -32000, "not authenticated").await;
    drop(agent);

    let err = start.await.unwrap().unwrap_err();
    match err {
        BridgeError::Rpc { code, message, .. } => {
            assert_eq!(code, -32000);
            assert_eq!(message, "not authenticated");
        }
        other => panic!("expected an rpc error, got {other:?}"),
    }
    assert_eq!(client.connection_phase(), ConnectionPhase::Disconnected);
    assert!(client.thread_id().is_none());
}

#[tokio::test]
async fn test_thread_started_updates_thread_id() {
    let (client, mut agent) = connected(ClientOptions::default()).await;
    agent
        .notify("thread/started", json!({ "thread": { "id": "thr_2" } }))
        .await;
    wait_until(|| client.thread_id().as_deref() == Some("thr_2")).await;
}

// ============================================================================
// Run admission
// ============================================================================

#[tokio::test]
async fn test_run_requires_connection() {
    init_logging();
    let (client, _agent, _launcher) = client_with(ClientOptions::default());
    let err = client.run_streaming("hello").err().unwrap();
    assert!(matches!(err, BridgeError::NotConnected(_)), "got {err:?}");
}

#[tokio::test]
async fn test_at_most_one_active_run() {
    let (client, mut agent) = connected(ClientOptions::default()).await;

    let first = client.run_streaming("first").unwrap();
    assert_eq!(client.connection_phase(), ConnectionPhase::TurnActive);
    let err = client.run_streaming("second").err().unwrap();
    assert!(matches!(err, BridgeError::TurnInProgress), "got {err:?}");

    let params = agent.accept_turn("turn_1").await;
    assert_eq!(params["threadId"], "thr_1");
    assert_eq!(params["input"][0], json!({ "type": "text", "text": "first" }));
    complete_turn(&mut agent, "turn_1").await;

    let items = drain(first).await;
    assert!(matches!(items.last(), Some(Ok(TurnEvent::TurnCompleted(_)))));
    assert_eq!(client.connection_phase(), ConnectionPhase::ThreadReady);

    let second = client.run_streaming("second").unwrap();
    agent.accept_turn("turn_2").await;
    complete_turn(&mut agent, "turn_2").await;
    let items = drain(second).await;
    match items.last() {
        Some(Ok(TurnEvent::TurnCompleted(summary))) => {
            assert_eq!(summary.turn_id.as_deref(), Some("turn_2"));
        }
        other => panic!("expected completion, got {other:?}"),
    }
}

#[tokio::test]
async fn test_dropping_stream_frees_the_slot() {
    let (client, mut agent) = connected(ClientOptions::default()).await;

    let stream = client.run_streaming("first").unwrap();
    drop(stream);
    assert_eq!(client.connection_phase(), ConnectionPhase::ThreadReady);

    // The abandoned turn still reaches the agent; the next one is admitted
    agent.expect_request("turn/start").await;
    assert_ok!(client.run_streaming("second").map(drop));
}

// ============================================================================
// Notification dispatch
// ============================================================================

#[tokio::test]
async fn test_mismatched_turn_id_is_dropped() {
    let (client, mut agent) = connected(ClientOptions::default()).await;
    let stream = client.run_streaming("hello").unwrap();

    let (id, _) = agent.expect_request("turn/start").await;
    agent
        .notify("turn/started", json!({ "turn": { "id": "turn_1", "status": "inProgress" } }))
        .await;
    agent
        .respond(&id, json!({ "turn": { "id": "turn_1", "status": "inProgress" } }))
        .await;
    agent
        .notify(
            "item/completed",
            json!({ "turnId": "turn_stale", "item": { "type": "agentMessage", "text": "old" } }),
        )
        .await;
    agent
        .notify(
            "item/completed",
            json!({ "turnId": "turn_1", "item": { "type": "agentMessage", "text": "new" } }),
        )
        .await;
    complete_turn(&mut agent, "turn_1").await;

    let items = drain(stream).await;
    assert_eq!(
        notification_methods(&items),
        vec!["turn/started", "item/completed", "turn/completed"]
    );
    let texts: Vec<_> = items
        .iter()
        .filter_map(|item| match item {
            Ok(TurnEvent::Notification { params, .. }) => params["item"]["text"].as_str(),
            _ => None,
        })
        .collect();
    assert_eq!(texts, vec!["new"]);
}

#[tokio::test]
async fn test_turn_start_response_overrides_stale_turn_started() {
    let (client, mut agent) = connected(ClientOptions::default()).await;
    let stream = client.run_streaming("hello").unwrap();

    let (id, _) = agent.expect_request("turn/start").await;
    agent
        .notify("turn/started", json!({ "turn": { "id": "turn_old" } }))
        .await;
    wait_until(|| client.turn_id().as_deref() == Some("turn_old")).await;

    agent
        .respond(&id, json!({ "turn": { "id": "turn_new", "status": "inProgress" } }))
        .await;
    wait_until(|| client.turn_id().as_deref() == Some("turn_new")).await;

    complete_turn(&mut agent, "turn_old").await;
    complete_turn(&mut agent, "turn_new").await;

    let items = drain(stream).await;
    assert_eq!(notification_methods(&items), vec!["turn/started", "turn/completed"]);
    match items.last() {
        Some(Ok(TurnEvent::TurnCompleted(summary))) => {
            assert_eq!(summary.turn_id.as_deref(), Some("turn_new"));
        }
        other => panic!("expected completion, got {other:?}"),
    }
}

#[tokio::test]
async fn test_completion_from_turn_start_response() {
    let (client, mut agent) = connected(ClientOptions::default()).await;
    let stream = client.run_streaming("hello").unwrap();

    let (id, _) = agent.expect_request("turn/start").await;
    agent
        .respond(&id, json!({ "turn": { "id": "turn_1", "status": "completed" } }))
        .await;

    let items = drain(stream).await;
    assert_eq!(items.len(), 1);
    match &items[0] {
        Ok(TurnEvent::TurnCompleted(summary)) => {
            assert_eq!(summary.status, "completed");
            assert_eq!(summary.thread_id, "thr_1");
            assert_eq!(summary.turn_id.as_deref(), Some("turn_1"));
        }
        other => panic!("expected completion, got {other:?}"),
    }
}

#[tokio::test]
async fn test_completion_from_turn_completed() {
    let (client, mut agent) = connected(ClientOptions::default()).await;
    let stream = client.run_streaming("hello").unwrap();

    agent.accept_turn("turn_1").await;
    complete_turn(&mut agent, "turn_1").await;

    let items = drain(stream).await;
    assert_eq!(notification_methods(&items), vec!["turn/completed"]);
    assert!(matches!(items.last(), Some(Ok(TurnEvent::TurnCompleted(_)))));
}

#[tokio::test]
async fn test_completion_from_terminal_turn_updated() {
    let (client, mut agent) = connected(ClientOptions::default()).await;
    let stream = client.run_streaming("hello").unwrap();

    agent.accept_turn("turn_1").await;
    agent
        .notify("turn.updated", json!({ "turn": { "id": "turn_1", "status": "in_progress" } }))
        .await;
    agent
        .notify("turn.updated", json!({ "turn": { "id": "turn_1", "status": "completed" } }))
        .await;

    let items = drain(stream).await;
    assert_eq!(notification_methods(&items), vec!["turn.updated", "turn.updated"]);
    match items.last() {
        Some(Ok(TurnEvent::TurnCompleted(summary))) => assert_eq!(summary.status, "completed"),
        other => panic!("expected completion, got {other:?}"),
    }
}

#[tokio::test]
async fn test_first_completion_signal_wins() {
    let (client, mut agent) = connected(ClientOptions::default()).await;
    let stream = client.run_streaming("hello").unwrap();

    agent.accept_turn("turn_1").await;
    agent
        .notify("turn/updated", json!({ "turn": { "id": "turn_1", "status": "completed" } }))
        .await;
    agent
        .notify("turn/failed", json!({ "turn": { "id": "turn_1", "status": "failed" } }))
        .await;

    let items = drain(stream).await;
    assert!(items.iter().all(Result::is_ok), "{items:?}");
    match items.last() {
        Some(Ok(TurnEvent::TurnCompleted(summary))) => assert_eq!(summary.status, "completed"),
        other => panic!("expected completion, got {other:?}"),
    }

    // A terminal turn/start response followed by turn/completed
    let mut stream = client.run_streaming("again").unwrap();
    let (id, _) = agent.expect_request("turn/start").await;
    agent
        .respond(&id, json!({ "turn": { "id": "turn_2", "status": "completed" } }))
        .await;
    assert!(matches!(
        stream.next().await,
        Some(Ok(TurnEvent::TurnCompleted(_)))
    ));
    agent
        .notify(
            "turn/completed",
            json!({ "turn": { "id": "turn_2", "status": "interrupted" } }),
        )
        .await;
    assert!(stream.next().await.is_none());
    assert_eq!(client.connection_phase(), ConnectionPhase::ThreadReady);
}

#[tokio::test]
async fn test_failed_turn_surfaces_error() {
    let (client, mut agent) = connected(ClientOptions::default()).await;
    let stream = client.run_streaming("hello").unwrap();

    agent.accept_turn("turn_1").await;
    agent
        .notify(
            "turn/completed",
            json!({ "turn": { "id": "turn_1", "status": "failed", "error": { "message": "boom" } } }),
        )
        .await;

    let items = drain(stream).await;
    assert!(matches!(items.first(), Some(Ok(TurnEvent::Notification { .. }))));
    match items.last() {
        Some(Err(BridgeError::TurnFailed { status, message })) => {
            assert_eq!(status, "failed");
            assert_eq!(message.as_deref(), Some("boom"));
        }
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_turn_start_error_fails_run() {
    let (client, mut agent) = connected(ClientOptions::default()).await;
    let stream = client.run_streaming("hello").unwrap();

    let (id, _) = agent.expect_request("turn/start").await;
    agent.respond_error(&id, -32602, "bad input").await;

    let items = drain(stream).await;
    assert_eq!(items.len(), 1);
    assert!(matches!(items[0], Err(BridgeError::Rpc { code: -32602, .. })));
    assert_eq!(client.connection_phase(), ConnectionPhase::ThreadReady);
}

#[tokio::test]
async fn test_builtin_tool_spans() {
    let options = ClientOptions::builder().surface_builtin_tools(true).build();
    let (client, mut agent) = connected(options).await;
    let stream = client.run_streaming("list files").unwrap();

    agent.accept_turn("turn_1").await;
    let started = json!({
        "turnId": "turn_1",
        "item": { "type": "commandExecution", "id": "call_1", "command": "ls", "cwd": "/work" }
    });
    agent.notify("item/started", started.clone()).await;
    agent.notify("item/started", started).await;
    agent
        .notify(
            "item/completed",
            json!({
                "turnId": "turn_1",
                "item": { "type": "commandExecution", "id": "call_1", "command": "ls",
                          "exitCode": 0, "aggregatedOutput": "README.md\n" }
            }),
        )
        .await;
    agent
        .notify(
            "item/completed",
            json!({
                "turnId": "turn_1",
                "item": { "type": "commandExecution", "id": "call_2", "command": "false", "exitCode": 1 }
            }),
        )
        .await;
    complete_turn(&mut agent, "turn_1").await;

    let items = drain(stream).await;
    let lifecycle: Vec<(String, &'static str, bool)> = items
        .iter()
        .filter_map(|item| match item {
            Ok(TurnEvent::ToolCallStarted(call)) => Some((call.call_id.clone(), "start", call.is_error)),
            Ok(TurnEvent::ToolCallCompleted(call)) => Some((call.call_id.clone(), "end", call.is_error)),
            _ => None,
        })
        .collect();
    assert_eq!(
        lifecycle,
        vec![
            ("call_1".to_string(), "start", false),
            ("call_1".to_string(), "end", false),
            ("call_2".to_string(), "start", false),
            ("call_2".to_string(), "end", true),
        ]
    );

    // Tool notifications are replaced by lifecycle events
    assert_eq!(notification_methods(&items), vec!["turn/completed"]);

    let completed = items.iter().find_map(|item| match item {
        Ok(TurnEvent::ToolCallCompleted(call)) if call.call_id == "call_1" => Some(call.clone()),
        _ => None,
    });
    let call = completed.unwrap();
    assert_eq!(call.kind, ToolKind::CommandExecution);
    assert_eq!(call.tool_name, "command_execution");
    assert_eq!(call.arguments["command"], "ls");
    assert_eq!(call.result.as_ref().unwrap()["aggregatedOutput"], "README.md\n");
}

#[tokio::test]
async fn test_builtin_tools_forwarded_raw_by_default() {
    let (client, mut agent) = connected(ClientOptions::default()).await;
    let stream = client.run_streaming("list files").unwrap();

    agent.accept_turn("turn_1").await;
    agent
        .notify(
            "item/started",
            json!({ "turnId": "turn_1", "item": { "type": "commandExecution", "id": "call_1" } }),
        )
        .await;
    complete_turn(&mut agent, "turn_1").await;

    let items = drain(stream).await;
    assert_eq!(notification_methods(&items), vec!["item/started", "turn/completed"]);
    assert!(
        !items
            .iter()
            .any(|item| matches!(item, Ok(TurnEvent::ToolCallStarted(_))))
    );
}

// ============================================================================
// Inbound requests
// ============================================================================

#[tokio::test]
async fn test_approvals_follow_policy() {
    let (_client, mut agent) = connected(ClientOptions::default()).await;

    agent
        .request(json!(10), "item/commandExecution/requestApproval", json!({ "itemId": "c1" }))
        .await;
    let answer = agent.expect_response(&json!(10)).await;
    assert_eq!(answer["result"]["decision"], "acceptForSession");

    agent.request(json!("legacy-1"), "execCommandApproval", json!({})).await;
    let answer = agent.expect_response(&json!("legacy-1")).await;
    assert_eq!(answer["result"]["decision"], "approved_for_session");
}

#[tokio::test]
async fn test_never_policy_declines() {
    let thread = ThreadOptions::default().with_approval_policy("Never");
    let (_client, mut agent) = connected_with(ClientOptions::default(), thread).await;

    agent
        .request(json!(11), "item/fileChange/requestApproval", json!({}))
        .await;
    let answer = agent.expect_response(&json!(11)).await;
    assert_eq!(answer["result"]["decision"], "decline");

    agent.request(json!(12), "applyPatchApproval", json!({})).await;
    let answer = agent.expect_response(&json!(12)).await;
    assert_eq!(answer["result"]["decision"], "denied");
}

#[tokio::test]
async fn test_user_input_and_auth_refresh() {
    let (_client, mut agent) = connected(ClientOptions::default()).await;

    agent.request(json!(20), "item/tool/requestUserInput", json!({})).await;
    let answer = agent.expect_response(&json!(20)).await;
    assert_eq!(answer["result"], json!({ "answers": {} }));

    agent
        .request(json!(21), "account/chatgptAuthTokens/refresh", json!({}))
        .await;
    let answer = agent.expect_response(&json!(21)).await;
    assert_eq!(answer["result"], json!({}));
}

#[tokio::test]
async fn test_unknown_request_is_method_not_found() {
    let (_client, mut agent) = connected(ClientOptions::default()).await;

    agent.request(json!(30), "item/unknown/thing", json!({})).await;
    let answer = agent.expect_response(&json!(30)).await;
    assert_eq!(answer["error"]["code"], -32601);
    assert!(answer.get("result").is_none());
}

#[tokio::test]
async fn test_dynamic_tool_without_executor() {
    let (_client, mut agent) = connected(ClientOptions::default()).await;

    agent
        .request(
            json!(40),
            "item/tool/call",
            json!({ "threadId": "thr_1", "callId": "dyn_1", "tool": "lookup", "arguments": {} }),
        )
        .await;
    let answer = agent.expect_response(&json!(40)).await;
    assert_eq!(answer["result"]["success"], false);
    let items = answer["result"]["contentItems"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["type"], "inputText");
    assert!(
        items[0]["text"]
            .as_str()
            .unwrap()
            .contains("no dynamic tool executor")
    );
}

#[tokio::test]
async fn test_dynamic_tool_without_executor_still_emits_lifecycle() {
    let (client, mut agent) = connected(ClientOptions::default()).await;
    let stream = client.run_streaming("look it up").unwrap();
    agent.accept_turn("turn_1").await;

    agent
        .request(
            json!(43),
            "item/tool/call",
            json!({ "threadId": "thr_1", "turnId": "turn_1", "callId": "dyn_1",
                    "tool": "lookup", "arguments": {} }),
        )
        .await;
    let answer = agent.expect_response(&json!(43)).await;
    assert_eq!(answer["result"]["success"], false);
    complete_turn(&mut agent, "turn_1").await;

    let items = drain(stream).await;
    let lifecycle: Vec<(&'static str, bool)> = items
        .iter()
        .filter_map(|item| match item {
            Ok(TurnEvent::ToolCallStarted(call)) => Some(("start", call.is_error)),
            Ok(TurnEvent::ToolCallCompleted(call)) => Some(("end", call.is_error)),
            _ => None,
        })
        .collect();
    assert_eq!(lifecycle, vec![("start", false), ("end", true)]);
    assert!(matches!(items.last(), Some(Ok(TurnEvent::TurnCompleted(_)))));
}

#[tokio::test]
async fn test_dynamic_tool_error_is_reported_to_agent() {
    let (client, mut agent) = connected(ClientOptions::default()).await;
    client.set_dynamic_tool_executor(dynamic_tool_executor(|_call| async move {
        Err(BridgeError::protocol("backend down"))
    }));

    agent
        .request(
            json!(44),
            "item/tool/call",
            json!({ "callId": "dyn_3", "tool": "lookup", "arguments": {} }),
        )
        .await;
    let answer = agent.expect_response(&json!(44)).await;
    assert_eq!(answer["result"]["success"], false);
    let text = answer["result"]["contentItems"][0]["text"].as_str().unwrap();
    assert!(text.starts_with("Tool execution error"), "{text}");
    assert!(text.contains("backend down"), "{text}");
}

#[tokio::test]
async fn test_dynamic_tool_with_executor_emits_lifecycle() {
    let (client, mut agent) = connected(ClientOptions::default()).await;
    client.set_dynamic_tool_executor(dynamic_tool_executor(|call| async move {
        let key = call.arguments["key"].as_str().unwrap_or_default().to_string();
        Ok(DynamicToolResponse::text(format!("value of {key}")))
    }));

    let stream = client.run_streaming("look it up").unwrap();
    agent.accept_turn("turn_1").await;
    agent
        .request(
            json!(41),
            "item/tool/call",
            json!({ "threadId": "thr_1", "turnId": "turn_1", "callId": "dyn_1",
                    "tool": "lookup", "arguments": { "key": "answer" } }),
        )
        .await;
    let answer = agent.expect_response(&json!(41)).await;
    assert_eq!(answer["result"]["success"], true);
    assert_eq!(answer["result"]["contentItems"][0]["text"], "value of answer");
    complete_turn(&mut agent, "turn_1").await;

    let items = drain(stream).await;
    let calls: Vec<_> = items
        .iter()
        .filter_map(|item| match item {
            Ok(TurnEvent::ToolCallStarted(call) | TurnEvent::ToolCallCompleted(call)) => {
                Some(call.clone())
            }
            _ => None,
        })
        .collect();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].kind, ToolKind::Dynamic);
    assert_eq!(calls[0].tool_name, "lookup");
    assert!(calls[0].result.is_none());
    assert!(!calls[1].is_error);
    assert!(calls[1].result.is_some());

    client.clear_dynamic_tool_executor();
    agent
        .request(
            json!(42),
            "item/tool/call",
            json!({ "callId": "dyn_2", "tool": "lookup", "arguments": {} }),
        )
        .await;
    let answer = agent.expect_response(&json!(42)).await;
    assert_eq!(answer["result"]["success"], false);
}

// ============================================================================
// Interrupts, cancellation and timeouts
// ============================================================================

#[tokio::test]
async fn test_interrupt_turn_sends_interrupt() {
    let (client, mut agent) = connected(ClientOptions::default()).await;
    // No run: nothing to interrupt
    assert_ok!(client.interrupt_turn().await);

    let mut stream = client.run_streaming("long task").unwrap();
    let (id, _) = agent.expect_request("turn/start").await;
    agent
        .notify("turn/started", json!({ "turn": { "id": "turn_1" } }))
        .await;
    agent
        .respond(&id, json!({ "turn": { "id": "turn_1", "status": "inProgress" } }))
        .await;
    assert!(matches!(
        stream.next().await,
        Some(Ok(TurnEvent::Notification { .. }))
    ));
    assert_eq!(client.turn_id().as_deref(), Some("turn_1"));

    let script = tokio::spawn(async move {
        let (id, params) = agent.expect_request("turn/interrupt").await;
        assert_eq!(params, json!({ "threadId": "thr_1", "turnId": "turn_1" }));
        agent.respond(&id, json!({})).await;
        agent
            .notify("turn/completed", json!({ "turn": { "id": "turn_1", "status": "interrupted" } }))
            .await;
        agent
    });
    assert_ok!(client.interrupt_turn().await);
    let _agent = script.await.unwrap();

    let items = drain(stream).await;
    match items.last() {
        Some(Err(BridgeError::TurnFailed { status, .. })) => assert_eq!(status, "interrupted"),
        other => panic!("expected an interrupted turn, got {other:?}"),
    }
}

#[tokio::test]
async fn test_cancel_before_turn_id_interrupts_once_known() {
    let (client, mut agent) = connected(ClientOptions::default()).await;
    let cancel = tokio_util::sync::CancellationToken::new();
    let mut stream = client
        .run_streaming_with_cancel("long task", cancel.clone())
        .unwrap();

    let (id, _) = agent.expect_request("turn/start").await;
    cancel.cancel();
    assert!(matches!(stream.next().await, Some(Err(BridgeError::Cancelled))));
    assert!(stream.next().await.is_none());

    agent
        .respond(&id, json!({ "turn": { "id": "turn_9", "status": "inProgress" } }))
        .await;
    let (_, params) = agent.expect_request("turn/interrupt").await;
    assert_eq!(params["turnId"], "turn_9");
    assert_eq!(params["threadId"], "thr_1");
}

#[tokio::test(start_paused = true)]
async fn test_turn_timeout_escalates_to_interrupt() {
    init_logging();
    let options = ClientOptions::builder()
        .turn_timeout(Duration::from_secs(60))
        .interrupt_grace(Duration::from_secs(5))
        .build();
    let (client, agent, _launcher) = client_with(options);
    let mut agent = agent.with_patience(Duration::from_secs(3600));

    let start = tokio::spawn({
        let client = client.clone();
        async move { client.start_or_resume_thread(ThreadOptions::default()).await }
    });
    agent
        .handshake("thread/start", json!({ "thread": { "id": "thr_1" } }))
        .await;
    assert_ok!(start.await.unwrap());

    let stream = client.run_streaming("never finishes").unwrap();
    let script = tokio::spawn(async move {
        agent.accept_turn("turn_1").await;
        let (id, params) = agent.expect_request("turn/interrupt").await;
        assert_eq!(params["turnId"], "turn_1");
        agent.respond(&id, json!({})).await;
        agent
    });

    let begun = tokio::time::Instant::now();
    let items = drain(stream).await;
    assert_eq!(items.len(), 1);
    assert!(matches!(items[0], Err(BridgeError::Timeout(_))), "got {:?}", items[0]);
    assert!(begun.elapsed() >= Duration::from_secs(65));
    let _agent = script.await.unwrap();
}

// ============================================================================
// Shutdown and connection loss
// ============================================================================

#[tokio::test]
async fn test_shutdown_during_active_run() {
    let (client, mut agent) = connected(ClientOptions::default()).await;
    let stream = client.run_streaming("long task").unwrap();
    agent.accept_turn("turn_1").await;
    agent
        .notify("turn/started", json!({ "turn": { "id": "turn_1" } }))
        .await;
    wait_until(|| client.turn_id().is_some()).await;

    let script = tokio::spawn(async move {
        let (id, _) = agent.expect_request("turn/interrupt").await;
        agent.respond(&id, json!({})).await;
        agent.expect_eof().await;
    });
    assert_ok!(client.shutdown().await);
    script.await.unwrap();

    let items = drain(stream).await;
    assert!(matches!(items.last(), Some(Err(BridgeError::ShutDown))));
    assert_eq!(client.connection_phase(), ConnectionPhase::Disconnected);
    assert!(client.thread_id().is_none());
    assert!(client.turn_id().is_none());

    let err = client.run_streaming("after shutdown").err().unwrap();
    assert!(matches!(err, BridgeError::NotConnected(_)));
}

#[tokio::test]
async fn test_shutdown_without_connection_is_noop() {
    init_logging();
    let (client, _agent, _launcher) = client_with(ClientOptions::default());
    assert_ok!(client.shutdown().await);
    assert_eq!(client.connection_phase(), ConnectionPhase::Disconnected);
}

#[tokio::test]
async fn test_unexpected_close_fails_run_and_records_fault() {
    let (client, mut agent) = connected(ClientOptions::default()).await;
    let stream = client.run_streaming("hello").unwrap();
    agent.expect_request("turn/start").await;
    drop(agent);

    let items = drain(stream).await;
    assert!(
        matches!(items.last(), Some(Err(BridgeError::ConnectionClosed(_)))),
        "got {items:?}"
    );
    wait_until(|| client.connection_phase() == ConnectionPhase::Disconnected).await;
    assert!(client.last_fault().is_some());

    let err = client.run_streaming("again").err().unwrap();
    match err {
        BridgeError::NotConnected(reason) => assert!(reason.contains("closed")),
        other => panic!("expected NotConnected, got {other:?}"),
    }
}

#[tokio::test]
async fn test_reconnect_after_connection_loss() {
    init_logging();
    let (client, mut agent, launcher) = client_with(ClientOptions::default());
    let start = tokio::spawn({
        let client = client.clone();
        async move { client.start_or_resume_thread(ThreadOptions::default()).await }
    });
    agent
        .handshake("thread/start", json!({ "thread": { "id": "thr_1" } }))
        .await;
    assert_ok!(start.await.unwrap());

    drop(agent);
    wait_until(|| client.connection_phase() == ConnectionPhase::Disconnected).await;

    let (io, mut second) = fake_pair();
    launcher.push(io);
    let start = tokio::spawn({
        let client = client.clone();
        async move { client.start_or_resume_thread(ThreadOptions::resume("thr_1")).await }
    });
    second.handshake("thread/resume", json!({ "thread": { "id": "thr_1" } })).await;
    assert_eq!(start.await.unwrap().unwrap(), "thr_1");
    assert!(client.last_fault().is_none());
    assert_eq!(launcher.launches(), 2);

    let stream = client.run_streaming("hello again").unwrap();
    second.accept_turn("turn_1").await;
    complete_turn(&mut second, "turn_1").await;
    let items = drain(stream).await;
    assert!(matches!(items.last(), Some(Ok(TurnEvent::TurnCompleted(_)))));
}

#[tokio::test]
async fn test_scope_shuts_down_after_body() {
    init_logging();
    let (client, mut agent, _launcher) = client_with(ClientOptions::default());
    let script = tokio::spawn(async move {
        agent
            .handshake("thread/start", json!({ "thread": { "id": "thr_scoped" } }))
            .await;
        agent.expect_eof().await;
    });

    let seen = client
        .scope(ThreadOptions::default(), |inner| async move { Ok(inner.thread_id()) })
        .await
        .unwrap();
    assert_eq!(seen.as_deref(), Some("thr_scoped"));
    script.await.unwrap();
    assert_eq!(client.connection_phase(), ConnectionPhase::Disconnected);
}
