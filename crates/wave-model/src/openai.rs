// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! OpenAI-compatible chat-completion provider.
//!
//! Works against any server speaking the `/chat/completions` wire format
//! (OpenAI, OpenRouter, llama.cpp, vLLM, ...).  Non-streaming: the agent
//! core absorbs one reply per round, so a single response object is all it
//! needs.

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::{
    cancel::CancelToken,
    provider::ChatProvider,
    types::{ApiMessage, ApiToolCall, ApiUsage, ChatCompletion, ChatRequest, ToolSchema},
};

pub struct OpenAiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiProvider {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    /// Provider configured from `WAVE_BASE_URL`, `WAVE_API_KEY` and
    /// `WAVE_MODEL`.  Fails when the key is missing; the other two have
    /// OpenAI defaults.
    pub fn from_env() -> anyhow::Result<Self> {
        let api_key = std::env::var("WAVE_API_KEY").context("WAVE_API_KEY is not set")?;
        let base_url = std::env::var("WAVE_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let model = std::env::var("WAVE_MODEL").unwrap_or_else(|_| "gpt-4o".to_string());
        Ok(Self::new(base_url, api_key, model))
    }

    /// The single place the forwarded host context is interpreted: it
    /// becomes the leading system message of every request.
    fn system_message(req: &ChatRequest) -> ApiMessage {
        let mut text = String::from(
            "You are Wave, a coding agent operating in the user's terminal. \
             Use the provided tools to inspect and modify the project.",
        );
        if !req.workdir.is_empty() {
            text.push_str("\n\nWorking directory: ");
            text.push_str(&req.workdir);
        }
        if let Some(memory) = req.memory.as_deref() {
            if !memory.is_empty() {
                text.push_str("\n\nProject memory:\n");
                text.push_str(memory);
            }
        }
        ApiMessage::system(text)
    }
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai-compat"
    }

    async fn complete(
        &self,
        req: ChatRequest,
        cancel: &CancelToken,
    ) -> anyhow::Result<ChatCompletion> {
        let mut messages = Vec::with_capacity(req.messages.len() + 1);
        messages.push(Self::system_message(&req));
        messages.extend(req.messages);

        let body = WireRequest {
            model: &self.model,
            messages: &messages,
            tools: req.tools.iter().map(WireTool::from).collect(),
            stream: false,
        };

        debug!(
            model = %self.model,
            messages = messages.len(),
            tools = body.tools.len(),
            "chat completion request"
        );

        let url = format!("{}/chat/completions", self.base_url);
        let send = async {
            let resp = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await
                .context("model request failed")?;
            let status = resp.status();
            let text = resp.text().await.context("model response read failed")?;
            if !status.is_success() {
                anyhow::bail!("model error {status}: {text}");
            }
            serde_json::from_str::<WireResponse>(&text)
                .with_context(|| format!("malformed model response: {text}"))
        };

        let wire = cancel.observe(send).await??;
        let choice = wire
            .choices
            .into_iter()
            .next()
            .context("model response had no choices")?;

        Ok(ChatCompletion {
            content: choice.message.content,
            tool_calls: choice.message.tool_calls,
            usage: wire.usage,
        })
    }
}

// ─── Wire structs ─────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: &'a [ApiMessage],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    stream: bool,
}

#[derive(Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunction<'a>,
}

#[derive(Serialize)]
struct WireFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

impl<'a> From<&'a ToolSchema> for WireTool<'a> {
    fn from(s: &'a ToolSchema) -> Self {
        Self {
            kind: "function",
            function: WireFunction {
                name: &s.name,
                description: &s.description,
                parameters: &s.parameters,
            },
        }
    }
}

#[derive(Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireMessage,
}

#[derive(Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ApiToolCall>,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
