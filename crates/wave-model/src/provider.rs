// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;

use crate::{
    cancel::CancelToken,
    types::{ApiMessage, ChatCompletion, ChatRequest},
};

/// Prompt appended to a history window when asking the model to compress it.
const SUMMARIZE_INSTRUCTION: &str = "Summarize the conversation above into a compact note that \
     preserves: user goals and constraints, decisions made, file paths and \
     code entities touched, tool results that still matter, and open work. \
     Reply with the summary only.";

/// A chat-completion backend.
///
/// `complete` must return promptly with an error when `cancel` is raised;
/// implementations wrap their transport future in [`CancelToken::observe`].
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Human-readable provider name for diagnostics.
    fn name(&self) -> &str;

    /// One chat completion for the given request.
    async fn complete(
        &self,
        req: ChatRequest,
        cancel: &CancelToken,
    ) -> anyhow::Result<ChatCompletion>;

    /// Compress a window of history into a short text.
    ///
    /// The default implementation drives [`complete`] with a tool-free
    /// request: the window plus one summarization instruction.  Providers
    /// with a dedicated summarization endpoint can override.
    ///
    /// [`complete`]: ChatProvider::complete
    async fn summarize(
        &self,
        mut messages: Vec<ApiMessage>,
        cancel: &CancelToken,
    ) -> anyhow::Result<String> {
        messages.push(ApiMessage::user(SUMMARIZE_INSTRUCTION));
        let req = ChatRequest {
            messages,
            ..Default::default()
        };
        let reply = self.complete(req, cancel).await?;
        match reply.content {
            Some(text) if !text.trim().is_empty() => Ok(text),
            _ => anyhow::bail!("summarizer returned empty content"),
        }
    }
}
