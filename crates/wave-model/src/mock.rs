// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::{
    cancel::CancelToken,
    provider::ChatProvider,
    types::{ApiRole, ApiToolCall, ApiUsage, ChatCompletion, ChatRequest},
};

/// Deterministic mock provider.  Echoes the last user message back as the
/// assistant reply.
#[derive(Default)]
pub struct MockProvider;

#[async_trait]
impl ChatProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(
        &self,
        req: ChatRequest,
        _cancel: &CancelToken,
    ) -> anyhow::Result<ChatCompletion> {
        let reply = req
            .messages
            .iter()
            .rev()
            .find(|m| m.role == ApiRole::User)
            .and_then(|m| m.content.as_ref())
            .and_then(|c| c.as_text())
            .unwrap_or("[no input]");
        Ok(ChatCompletion {
            content: Some(format!("MOCK: {reply}")),
            tool_calls: Vec::new(),
            usage: Some(ApiUsage {
                prompt_tokens: 10,
                completion_tokens: 10,
                total_tokens: 20,
            }),
        })
    }
}

/// A pre-scripted provider.  Each `complete` call pops the next reply from
/// the front of the queue, so tests can specify exact multi-round sequences
/// — including tool calls — without network access.  Every request seen is
/// recorded for payload assertions.
pub struct ScriptedProvider {
    scripts: Mutex<Vec<ChatCompletion>>,
    /// All requests this provider has received, in call order.
    pub requests: Arc<Mutex<Vec<ChatRequest>>>,
}

impl ScriptedProvider {
    pub fn new(scripts: Vec<ChatCompletion>) -> Self {
        Self {
            scripts: Mutex::new(scripts),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Provider that always returns a single text reply with the given usage.
    pub fn always_text(reply: impl Into<String>, total_tokens: u64) -> Self {
        Self::new(vec![ChatCompletion {
            content: Some(reply.into()),
            tool_calls: Vec::new(),
            usage: Some(ApiUsage {
                total_tokens,
                ..Default::default()
            }),
        }])
    }

    /// Provider that returns one tool call, then a text reply.
    pub fn tool_then_text(
        tool_id: impl Into<String>,
        tool_name: impl Into<String>,
        args_json: impl Into<String>,
        final_text: impl Into<String>,
    ) -> Self {
        Self::new(vec![
            ChatCompletion {
                content: None,
                tool_calls: vec![ApiToolCall::function(tool_id, tool_name, args_json)],
                usage: None,
            },
            ChatCompletion {
                content: Some(final_text.into()),
                tool_calls: Vec::new(),
                usage: None,
            },
        ])
    }

    /// Number of `complete` calls made so far.
    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Clone of the most recent request, if any.
    pub fn last_request(&self) -> Option<ChatRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ChatProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted-mock"
    }

    async fn complete(
        &self,
        req: ChatRequest,
        cancel: &CancelToken,
    ) -> anyhow::Result<ChatCompletion> {
        if cancel.is_raised() {
            anyhow::bail!("aborted");
        }
        self.requests.lock().unwrap().push(req);
        let mut scripts = self.scripts.lock().unwrap();
        if scripts.is_empty() {
            // Fallback when all scripts are consumed.
            return Ok(ChatCompletion {
                content: Some("[no more scripts]".into()),
                tool_calls: Vec::new(),
                usage: None,
            });
        }
        Ok(scripts.remove(0))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ApiMessage;

    fn req(text: &str) -> ChatRequest {
        ChatRequest {
            messages: vec![ApiMessage::user(text)],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn mock_echoes_last_user_message() {
        let p = MockProvider;
        let reply = p.complete(req("hi"), &CancelToken::new()).await.unwrap();
        assert_eq!(reply.content.as_deref(), Some("MOCK: hi"));
    }

    #[tokio::test]
    async fn scripted_pops_in_order() {
        let p = ScriptedProvider::new(vec![
            ChatCompletion {
                content: Some("first".into()),
                ..Default::default()
            },
            ChatCompletion {
                content: Some("second".into()),
                ..Default::default()
            },
        ]);
        let c = CancelToken::new();
        assert_eq!(
            p.complete(req("a"), &c).await.unwrap().content.as_deref(),
            Some("first")
        );
        assert_eq!(
            p.complete(req("b"), &c).await.unwrap().content.as_deref(),
            Some("second")
        );
        assert_eq!(p.calls(), 2);
    }

    #[tokio::test]
    async fn scripted_fallback_when_exhausted() {
        let p = ScriptedProvider::new(vec![]);
        let reply = p.complete(req("x"), &CancelToken::new()).await.unwrap();
        assert_eq!(reply.content.as_deref(), Some("[no more scripts]"));
    }

    #[tokio::test]
    async fn scripted_records_requests() {
        let p = ScriptedProvider::always_text("ok", 1);
        p.complete(req("payload"), &CancelToken::new())
            .await
            .unwrap();
        let last = p.last_request().unwrap();
        assert_eq!(
            last.messages[0].content.as_ref().and_then(|c| c.as_text()),
            Some("payload")
        );
    }

    #[tokio::test]
    async fn scripted_errors_when_cancelled() {
        let p = ScriptedProvider::always_text("ok", 1);
        let c = CancelToken::new();
        c.raise();
        let err = p.complete(req("x"), &c).await.unwrap_err();
        assert!(err.to_string().contains("aborted"));
        // The aborted call is not recorded.
        assert_eq!(p.calls(), 0);
    }

    #[tokio::test]
    async fn tool_then_text_scripts_two_rounds() {
        let p = ScriptedProvider::tool_then_text("t1", "ls", r#"{"path":"."}"#, "done");
        let c = CancelToken::new();
        let first = p.complete(req("go"), &c).await.unwrap();
        assert_eq!(first.tool_calls.len(), 1);
        assert_eq!(first.tool_calls[0].function.name, "ls");
        let second = p.complete(req("go"), &c).await.unwrap();
        assert_eq!(second.content.as_deref(), Some("done"));
    }
}
