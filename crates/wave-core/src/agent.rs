// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! The agent loop: model call → tool call(s) → model call, until the model
//! stops requesting tools, the user aborts, or a hard error surfaces.
//!
//! Two cancel tokens exist per round: `api_abort` covers the model and
//! summarizer calls, `tool_abort` covers tool executions.  Fresh tokens are
//! installed for every round; [`AgentLoop::abort`] raises whichever pair is
//! currently installed.  Errors never escape: they become Error blocks, and
//! cancellations are consumed silently.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use serde_json::{json, Value};
use tracing::{debug, warn};

use wave_config::CoreConfig;
use wave_model::{CancelToken, ChatProvider, ChatRequest};
use wave_tools::{ToolContext, ToolRegistry};

use crate::api::build_api_messages;
use crate::compress::select_window;
use crate::events::{CoreEvent, EventBus};
use crate::message::ToolBlockPatch;
use crate::store::MessageStore;

pub struct AgentLoop {
    store: Arc<Mutex<MessageStore>>,
    tools: Arc<ToolRegistry>,
    provider: Arc<dyn ChatProvider>,
    config: Arc<CoreConfig>,
    /// Currently-installed cancel tokens; replaced fresh every round so a
    /// raise from outside always reaches the in-flight work.
    api_abort: Mutex<CancelToken>,
    tool_abort: Mutex<CancelToken>,
    is_loading: AtomicBool,
    bus: EventBus,
}

impl AgentLoop {
    pub fn new(
        store: Arc<Mutex<MessageStore>>,
        tools: Arc<ToolRegistry>,
        provider: Arc<dyn ChatProvider>,
        config: Arc<CoreConfig>,
        bus: EventBus,
    ) -> Self {
        Self {
            store,
            tools,
            provider,
            config,
            api_abort: Mutex::new(CancelToken::new()),
            tool_abort: Mutex::new(CancelToken::new()),
            is_loading: AtomicBool::new(false),
            bus,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading.load(Ordering::SeqCst)
    }

    /// Raise both currently-installed tokens.  Safe at any time; calling it
    /// repeatedly is equivalent to calling it once.
    pub fn abort(&self) {
        self.api_abort.lock().unwrap().raise();
        self.tool_abort.lock().unwrap().raise();
    }

    /// Drive the conversation forward after a user message was appended.
    ///
    /// Admission-controlled: a call while a previous run is still loading
    /// returns silently.  On return there is no in-flight work, the abort
    /// tokens are cleared, and `isLoading` is false again.
    pub async fn run(&self, memory: Option<String>) {
        if self.is_loading.swap(true, Ordering::SeqCst) {
            debug!("agent loop already running; ignoring submission");
            return;
        }
        self.bus.emit(&CoreEvent::LoadingChange(true));

        if let Err(e) = self.drive(memory).await {
            if self.tokens_raised() || is_abort_error(&e) {
                debug!("agent loop aborted");
            } else {
                let msg = error_message(&e);
                self.store.lock().unwrap().append_error_block(&msg);
            }
        }

        // Clear abort state for the next submission.
        self.fresh_tokens();
        self.is_loading.store(false, Ordering::SeqCst);
        self.bus.emit(&CoreEvent::LoadingChange(false));
    }

    async fn drive(&self, memory: Option<String>) -> anyhow::Result<()> {
        let mut rounds: u32 = 0;
        loop {
            let (api_abort, tool_abort) = self.fresh_tokens();

            {
                // One assistant message per user turn: the first round
                // creates it, every recursion opens a fresh Answer block in
                // the same message (prior answers are sealed by the Tool
                // blocks between them).
                let mut store = self.store.lock().unwrap();
                if rounds == 0 {
                    store.append_assistant_message();
                }
                store.append_answer_block();
            }

            let tools_config = self.tools.get_tools_config().await;
            let req = {
                let store = self.store.lock().unwrap();
                ChatRequest {
                    messages: build_api_messages(store.messages()),
                    tools: tools_config,
                    memory: memory.clone(),
                    workdir: self.config.workdir.to_string_lossy().into_owned(),
                    session_id: store.session_id().to_string(),
                }
            };

            let reply = self
                .provider
                .complete(req, &api_abort)
                .await
                .context("model completion failed")?;

            if let Some(content) = reply.content.as_deref().filter(|c| !c.is_empty()) {
                self.store.lock().unwrap().update_answer_block(content);
            }
            if let Some(usage) = reply.usage {
                self.store
                    .lock()
                    .unwrap()
                    .set_latest_total_tokens(usage.total_tokens);
                if usage.total_tokens > self.config.token_limit {
                    self.compress_history(&api_abort).await;
                }
            }

            let mut has_tool_ops = false;
            for tc in &reply.tool_calls {
                if tc.kind != "function" {
                    continue;
                }
                has_tool_ops = true;
                self.store
                    .lock()
                    .unwrap()
                    .append_tool_block(&tc.id, &tc.function.name);

                // User cancellation between tool calls: stop here, leave
                // the just-added block as-is.
                if api_abort.is_raised() || tool_abort.is_raised() {
                    return Ok(());
                }

                let args = parse_tool_args(&tc.function.arguments)?;
                let compact_args = self.tools.format_compact_args(&tc.function.name, &args);
                let pretty =
                    serde_json::to_string_pretty(&args).unwrap_or_else(|_| args.to_string());
                self.store.lock().unwrap().update_tool_block(
                    &tc.id,
                    ToolBlockPatch {
                        name: Some(tc.function.name.clone()),
                        args: Some(pretty),
                        compact_args: compact_args.clone(),
                        is_running: Some(true),
                        ..Default::default()
                    },
                );

                let ctx = ToolContext {
                    abort: tool_abort.clone(),
                    workdir: self.config.workdir.clone(),
                };
                let output = self.tools.execute(&tc.function.name, args, &ctx).await;

                let patch = if output.success {
                    ToolBlockPatch {
                        result: Some(output.content.clone()),
                        success: Some(true),
                        is_running: Some(false),
                        short_result: output.short_result.clone(),
                        compact_args,
                        ..Default::default()
                    }
                } else {
                    let msg = output
                        .error
                        .clone()
                        .unwrap_or_else(|| output.content.clone());
                    ToolBlockPatch {
                        result: Some(format!("Tool execution failed: {msg}")),
                        success: Some(false),
                        error: Some(msg),
                        is_running: Some(false),
                        short_result: output.short_result.clone(),
                        compact_args,
                        ..Default::default()
                    }
                };
                {
                    let mut store = self.store.lock().unwrap();
                    store.update_tool_block(&tc.id, patch);
                    if output.success {
                        if let Some(diff) = output.file_diff {
                            store.append_diff_block(diff);
                        }
                    }
                }
            }

            if has_tool_ops && !api_abort.is_raised() && !tool_abort.is_raised() {
                rounds += 1;
                if rounds >= self.config.max_tool_rounds {
                    warn!(rounds, "maximum tool rounds reached");
                    self.store.lock().unwrap().append_error_block(&format!(
                        "Maximum tool rounds ({}) reached; stopping this turn.",
                        self.config.max_tool_rounds
                    ));
                    return Ok(());
                }
                continue;
            }
            return Ok(());
        }
    }

    /// Summarize the oldest uncompressed window and insert a Compress
    /// block.  Failures are logged and the turn continues uncompressed.
    async fn compress_history(&self, api_abort: &CancelToken) {
        let window = {
            let store = self.store.lock().unwrap();
            select_window(store.messages(), self.config.compression_window)
        };
        let Some(window) = window else {
            return;
        };
        let api_form = build_api_messages(&window.messages);
        match self.provider.summarize(api_form, api_abort).await {
            Ok(summary) => {
                debug!(insert_index = window.insert_index, "history compressed");
                self.store
                    .lock()
                    .unwrap()
                    .append_compress_block(window.insert_index, &summary);
            }
            Err(e) => {
                warn!(error = %e, "history compression failed; continuing uncompressed");
            }
        }
    }

    fn fresh_tokens(&self) -> (CancelToken, CancelToken) {
        let api = CancelToken::new();
        let tool = CancelToken::new();
        *self.api_abort.lock().unwrap() = api.clone();
        *self.tool_abort.lock().unwrap() = tool.clone();
        (api, tool)
    }

    fn tokens_raised(&self) -> bool {
        self.api_abort.lock().unwrap().is_raised() || self.tool_abort.lock().unwrap().is_raised()
    }
}

/// Empty or whitespace-only arguments mean `{}`; anything else must be
/// valid JSON.
fn parse_tool_args(raw: &str) -> anyhow::Result<Value> {
    if raw.trim().is_empty() {
        return Ok(json!({}));
    }
    serde_json::from_str(raw).map_err(|_| anyhow::anyhow!("Failed to parse tool arguments"))
}

fn is_abort_error(e: &anyhow::Error) -> bool {
    let msg = format!("{e:#}");
    msg.contains("aborted") || msg.contains("AbortError")
}

fn error_message(e: &anyhow::Error) -> String {
    let msg = format!("{e:#}");
    if msg.is_empty() {
        "Unknown error occurred".to_string()
    } else {
        msg
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
