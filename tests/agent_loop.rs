// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! End-to-end scenarios driving the facade with scripted providers: the
//! happy path, tool rounds, malformed arguments, cancellation, history
//! compression, and the shell input mode.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use wave_agent::{
    Agent, AgentOptions, ApiToolCall, ApiUsage, Block, ChatCompletion, CoreConfig, CoreEvent,
    MessageRecord, Role, ScriptedProvider,
};

fn text_reply(text: &str, tokens: u64) -> ChatCompletion {
    ChatCompletion {
        content: Some(text.into()),
        tool_calls: vec![],
        usage: Some(ApiUsage {
            total_tokens: tokens,
            ..Default::default()
        }),
    }
}

fn tool_reply(id: &str, name: &str, args: &str) -> ChatCompletion {
    ChatCompletion {
        content: None,
        tool_calls: vec![ApiToolCall::function(id, name, args)],
        usage: None,
    }
}

async fn agent_with(
    dir: &tempfile::TempDir,
    scripts: Vec<ChatCompletion>,
) -> (Agent, Arc<ScriptedProvider>) {
    let provider = Arc::new(ScriptedProvider::new(scripts));
    let mut config = CoreConfig::new(dir.path());
    config.session_dir = Some(dir.path().join("sessions"));
    let mut opts = AgentOptions::new(config, Arc::clone(&provider) as _);
    opts.connect_mcp = false;
    (Agent::new(opts).await.unwrap(), provider)
}

// ── S1: happy path ────────────────────────────────────────────────────────────

#[tokio::test]
async fn happy_path_single_answer() {
    let dir = tempfile::tempdir().unwrap();
    let (agent, provider) = agent_with(&dir, vec![text_reply("hi", 10)]).await;

    agent.send_message("hello", vec![]).await;

    assert_eq!(provider.calls(), 1);
    let messages = agent.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(
        messages[0].blocks[0],
        Block::Text { content: "hello".into() }
    );
    assert_eq!(messages[1].answer_text(), "hi");
    assert_eq!(agent.latest_total_tokens(), 10);
    assert!(!agent.is_loading());
}

// ── S2: single tool round ─────────────────────────────────────────────────────

#[tokio::test]
async fn single_tool_round_uses_builtin_list_dir() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), "").unwrap();
    std::fs::write(dir.path().join("b.txt"), "").unwrap();
    let (agent, provider) = agent_with(
        &dir,
        vec![tool_reply("t1", "list_dir", "{}"), text_reply("ok", 20)],
    )
    .await;

    agent.send_message("list files", vec![]).await;

    assert_eq!(provider.calls(), 2);
    let messages = agent.messages();
    // One user message, one assistant message holding both rounds:
    // [Answer(""), Tool, Answer("ok")].
    assert_eq!(messages.len(), 2);
    let turn = &messages[1];
    match &turn.blocks[1] {
        Block::Tool {
            id,
            name,
            is_running,
            success,
            result,
            ..
        } => {
            assert_eq!(id, "t1");
            assert_eq!(name, "list_dir");
            assert!(!is_running);
            assert_eq!(*success, Some(true));
            let listing = result.as_deref().unwrap();
            assert!(listing.contains("a.txt") && listing.contains("b.txt"));
        }
        other => panic!("unexpected block {other:?}"),
    }
    assert_eq!(turn.answer_text(), "ok");

    // The second request carried the tool reply for t1.
    let last = provider.last_request().unwrap();
    assert!(last
        .messages
        .iter()
        .any(|m| m.tool_call_id.as_deref() == Some("t1")));
}

#[tokio::test]
async fn tool_ids_stay_unique_across_rounds() {
    let dir = tempfile::tempdir().unwrap();
    let (agent, _provider) = agent_with(
        &dir,
        vec![
            tool_reply("t1", "list_dir", "{}"),
            tool_reply("t2", "list_dir", "{}"),
            text_reply("done", 1),
        ],
    )
    .await;

    agent.send_message("go", vec![]).await;

    let mut ids = Vec::new();
    for message in agent.messages() {
        for block in &message.blocks {
            if let Block::Tool { id, .. } = block {
                ids.push(id.clone());
            }
        }
    }
    let mut deduped = ids.clone();
    deduped.sort();
    deduped.dedup();
    assert_eq!(ids.len(), deduped.len(), "tool ids must be unique: {ids:?}");
}

// ── S3: malformed tool arguments ──────────────────────────────────────────────

#[tokio::test]
async fn malformed_args_append_error_block_and_stop() {
    let dir = tempfile::tempdir().unwrap();
    let (agent, provider) =
        agent_with(&dir, vec![tool_reply("t1", "list_dir", "{not-json")]).await;

    agent.send_message("go", vec![]).await;

    assert_eq!(provider.calls(), 1, "no recursion after a parse failure");
    let messages = agent.messages();
    let blocks = &messages[1].blocks;
    assert!(blocks.iter().any(|b| matches!(b, Block::Tool { .. })));
    let errors: Vec<_> = blocks
        .iter()
        .filter(|b| matches!(b, Block::Error { .. }))
        .collect();
    assert_eq!(errors.len(), 1);
    assert!(!agent.is_loading());
}

// ── S4: abort mid-tool ────────────────────────────────────────────────────────

#[tokio::test]
async fn abort_mid_tool_is_silent() {
    let dir = tempfile::tempdir().unwrap();
    let (agent, provider) = agent_with(
        &dir,
        vec![tool_reply("t1", "bash", r#"{"command":"sleep 60"}"#)],
    )
    .await;
    let agent = Arc::new(agent);

    let runner = Arc::clone(&agent);
    let task = tokio::spawn(async move { runner.send_message("wait", vec![]).await });
    tokio::time::sleep(Duration::from_millis(200)).await;
    agent.abort_message();
    task.await.unwrap();

    assert_eq!(provider.calls(), 1, "no recursion after abort");
    let messages = agent.messages();
    match &messages[1].blocks[1] {
        Block::Tool {
            is_running,
            success,
            error,
            ..
        } => {
            assert!(!is_running);
            assert_eq!(*success, Some(false));
            assert_eq!(error.as_deref(), Some("aborted"));
        }
        other => panic!("unexpected block {other:?}"),
    }
    let has_error_block = messages
        .iter()
        .any(|m| m.blocks.iter().any(|b| matches!(b, Block::Error { .. })));
    assert!(!has_error_block, "cancellation leaves no Error block");
    assert!(!agent.is_loading());
}

#[tokio::test]
async fn repeated_aborts_equal_one_abort() {
    let dir = tempfile::tempdir().unwrap();
    let (agent, _provider) = agent_with(
        &dir,
        vec![
            tool_reply("t1", "bash", r#"{"command":"sleep 60"}"#),
            text_reply("after", 1),
        ],
    )
    .await;
    let agent = Arc::new(agent);

    let runner = Arc::clone(&agent);
    let task = tokio::spawn(async move { runner.send_message("wait", vec![]).await });
    tokio::time::sleep(Duration::from_millis(200)).await;
    for _ in 0..5 {
        agent.abort_message();
    }
    task.await.unwrap();
    let after_once = agent.messages();

    // A fresh turn still works and consumes the next script.
    agent.send_message("again", vec![]).await;
    assert_eq!(agent.messages().len(), after_once.len() + 2);
}

// ── S5: compression ───────────────────────────────────────────────────────────

#[tokio::test]
async fn compression_inserts_summary_and_suppresses_prefix() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::new(vec![
        text_reply("big answer", 200_000),
        text_reply("summary of the early conversation", 0),
        text_reply("follow-up", 50),
    ]));

    let mut history = Vec::new();
    for i in 0..10 {
        if i % 2 == 0 {
            history.push(MessageRecord::user(format!("q{i}")));
        } else {
            let mut m = MessageRecord::assistant();
            m.blocks.push(Block::Answer {
                content: format!("a{i}"),
            });
            history.push(m);
        }
    }

    let mut config = CoreConfig::new(dir.path());
    config.session_dir = Some(dir.path().join("sessions"));
    let mut opts = AgentOptions::new(config, Arc::clone(&provider) as _);
    opts.connect_mcp = false;
    opts.seed_messages = Some(history);
    let agent = Agent::new(opts).await.unwrap();

    agent.send_message("overflow now", vec![]).await;

    let messages = agent.messages();
    assert!(messages[7].has_compress(), "Compress block at index 7");

    // Next turn: payload starts with the compress-derived user part.
    agent.send_message("continue", vec![]).await;
    let last = provider.last_request().unwrap();
    let first_text = last.messages[0]
        .content
        .as_ref()
        .and_then(|c| c.as_text())
        .unwrap();
    assert!(first_text.starts_with("[COMPRESSED HISTORY]"));
    assert!(first_text.contains("summary of the early conversation"));
}

// ── S6: bash input mode ───────────────────────────────────────────────────────

#[tokio::test]
async fn bang_command_streams_without_model_calls() {
    let dir = tempfile::tempdir().unwrap();
    let (agent, provider) = agent_with(&dir, vec![text_reply("unused", 1)]).await;

    agent
        .send_message("!sleep 0.1 && echo done", vec![])
        .await;

    assert_eq!(provider.calls(), 0, "no AI calls for a ! command");
    let messages = agent.messages();
    assert_eq!(messages.len(), 1);
    match &messages[0].blocks[0] {
        Block::CommandOutput {
            command,
            output,
            is_running,
            exit_code,
        } => {
            assert_eq!(command, "sleep 0.1 && echo done");
            assert!(output.contains("done"));
            assert!(!is_running);
            assert_eq!(*exit_code, Some(0));
        }
        other => panic!("unexpected block {other:?}"),
    }

    // Recorded in bash history (stored next to the session dir).
    let history =
        std::fs::read_to_string(dir.path().join("sessions").join("bash_history")).unwrap();
    assert!(history.contains("echo done"));
}

// ── Events ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn loading_change_fires_around_the_turn() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::always_text("hi", 1));
    let mut config = CoreConfig::new(dir.path());
    config.session_dir = Some(dir.path().join("sessions"));
    let seen: Arc<Mutex<Vec<bool>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let mut opts = AgentOptions::new(config, Arc::clone(&provider) as _);
    opts.connect_mcp = false;
    opts.on_event = Some(Arc::new(move |ev| {
        if let CoreEvent::LoadingChange(loading) = ev {
            sink.lock().unwrap().push(*loading);
        }
    }));
    let agent = Agent::new(opts).await.unwrap();

    agent.send_message("hello", vec![]).await;
    assert_eq!(*seen.lock().unwrap(), vec![true, false]);
}

#[tokio::test]
async fn unknown_tool_lets_the_model_react() {
    let dir = tempfile::tempdir().unwrap();
    let (agent, provider) = agent_with(
        &dir,
        vec![
            tool_reply("t1", "definitely_not_a_tool", "{}"),
            text_reply("I'll try something else", 1),
        ],
    )
    .await;

    agent.send_message("go", vec![]).await;

    assert_eq!(provider.calls(), 2, "recursion continues after unknown tool");
    match &agent.messages()[1].blocks[1] {
        Block::Tool { success, error, .. } => {
            assert_eq!(*success, Some(false));
            assert_eq!(
                error.as_deref(),
                Some("Tool 'definitely_not_a_tool' not found")
            );
        }
        other => panic!("unexpected block {other:?}"),
    }
}

#[tokio::test]
async fn tool_with_empty_args_receives_empty_object() {
    let dir = tempfile::tempdir().unwrap();
    let (agent, _provider) = agent_with(
        &dir,
        vec![tool_reply("t1", "list_dir", ""), text_reply("ok", 1)],
    )
    .await;

    agent.send_message("go", vec![]).await;

    match &agent.messages()[1].blocks[1] {
        Block::Tool { args, success, .. } => {
            assert_eq!(args, "{}");
            assert_eq!(*success, Some(true));
        }
        other => panic!("unexpected block {other:?}"),
    }
}

#[tokio::test]
async fn file_edit_tool_produces_diff_block() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("code.rs"), "fn old() {}\n").unwrap();
    let args = json!({
        "path": "code.rs",
        "old_string": "old",
        "new_string": "new"
    })
    .to_string();
    let (agent, _provider) = agent_with(
        &dir,
        vec![tool_reply("t1", "edit_file", &args), text_reply("edited", 1)],
    )
    .await;

    agent.send_message("rename it", vec![]).await;

    let messages = agent.messages();
    let blocks = &messages[1].blocks;
    let tool_pos = blocks
        .iter()
        .position(|b| matches!(b, Block::Tool { .. }))
        .unwrap();
    match &blocks[tool_pos + 1] {
        Block::Diff {
            file_path, hunks, ..
        } => {
            assert!(file_path.ends_with("code.rs"));
            assert!(hunks.iter().any(|h| h.added));
            assert!(hunks.iter().any(|h| h.removed));
        }
        other => panic!("expected Diff right after Tool, got {other:?}"),
    }
    assert_eq!(
        std::fs::read_to_string(dir.path().join("code.rs")).unwrap(),
        "fn new() {}\n"
    );
}
