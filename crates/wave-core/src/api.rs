// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! API-message synthesis: the pure mapping from the structured message log
//! to the chat-completion wire shape.
//!
//! The mapping is deterministic — the same message list always produces the
//! same payload — and it is the only place tool-role messages exist: each
//! completed Tool block materializes one `tool` reply directly after its
//! enclosing assistant message.

use wave_model::{ApiContentPart, ApiMessage, ApiToolCall};

use crate::message::{Block, MessageRecord, Role};

/// Prefix marking injected history summaries in the payload.
pub const COMPRESS_TAG: &str = "[COMPRESSED HISTORY]";

/// Build the chat payload from the message log.
///
/// Rules:
/// - Messages before the *last* Compress block are suppressed; the Compress
///   content is emitted as a tagged text part in its place.
/// - `subAgent` messages are skipped entirely (UI-only groupings).
/// - User text blocks become text parts; attached images become image parts.
/// - Assistant Answer blocks concatenate into `content`; Tool blocks become
///   `tool_calls`, each followed by one `tool`-role reply message.
/// - Diff, Error, Memory and CommandOutput blocks never cross into the API.
pub fn build_api_messages(messages: &[MessageRecord]) -> Vec<ApiMessage> {
    let start = messages
        .iter()
        .rposition(|m| m.role == Role::User && m.has_compress())
        .unwrap_or(0);

    let mut out = Vec::new();
    for message in &messages[start..] {
        match message.role {
            Role::SubAgent => continue,
            Role::User => {
                if let Some(api) = user_message(message) {
                    out.push(api);
                }
            }
            Role::Assistant => assistant_messages(message, &mut out),
            // Tool-role records never live in the store; they are
            // materialized below from Tool blocks.  Skip any that a seeded
            // history might carry.
            Role::Tool => continue,
        }
    }
    out
}

fn user_message(message: &MessageRecord) -> Option<ApiMessage> {
    let mut parts: Vec<ApiContentPart> = Vec::new();
    for block in &message.blocks {
        match block {
            Block::Text { content } => parts.push(ApiContentPart::text(content.clone())),
            Block::Compress { content } => {
                parts.push(ApiContentPart::text(format!("{COMPRESS_TAG}\n{content}")))
            }
            _ => {}
        }
    }
    for image in &message.images {
        parts.push(ApiContentPart::image(image.clone()));
    }
    if parts.is_empty() {
        return None;
    }
    Some(ApiMessage::user_with_parts(parts))
}

fn assistant_messages(message: &MessageRecord, out: &mut Vec<ApiMessage>) {
    let text = message.answer_text();
    let mut tool_calls = Vec::new();
    let mut replies = Vec::new();

    for block in &message.blocks {
        if let Block::Tool {
            id,
            name,
            args,
            is_running,
            result,
            error,
            ..
        } = block
        {
            let arguments = if args.trim().is_empty() { "{}" } else { args };
            tool_calls.push(ApiToolCall::function(id.clone(), name.clone(), arguments));
            replies.push(ApiMessage::tool_reply(id.clone(), reply_content(
                *is_running,
                result.as_deref(),
                error.as_deref(),
            )));
        }
    }

    if text.is_empty() && tool_calls.is_empty() {
        // Nothing API-visible (e.g. a CommandOutput-only message).
        return;
    }
    out.push(ApiMessage::assistant(text, tool_calls));
    out.extend(replies);
}

fn reply_content(is_running: bool, result: Option<&str>, error: Option<&str>) -> String {
    if is_running {
        // Possible after a crash restore: the block never completed, but
        // the assistant tool_call must not be left without a reply.
        return "Error: tool execution was interrupted".to_string();
    }
    match result {
        Some(r) if !r.is_empty() => r.to_string(),
        _ => format!("Error: {}", error.unwrap_or("unknown")),
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
