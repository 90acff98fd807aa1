// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Wire types for the chat-completion boundary.
//!
//! These mirror the OpenAI chat shape: the conversation is a list of
//! [`ApiMessage`]s, assistant messages may carry `tool_calls`, and each
//! completed call is answered by one `tool`-role message.  Serialization is
//! field-order deterministic, which the core relies on for payload equality.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ApiRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A single part of a multi-part user message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ApiContentPart {
    Text { text: String },
    Image {
        /// Data URL (`data:image/png;base64,...`) or HTTPS URL.
        image_url: String,
    },
}

impl ApiContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn image(image_url: impl Into<String>) -> Self {
        Self::Image { image_url: image_url.into() }
    }
}

/// Message content: plain string for the common case, parts when a user
/// turn mixes text with images.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ApiContent {
    Text(String),
    Parts(Vec<ApiContentPart>),
}

impl ApiContent {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(t) => Some(t),
            Self::Parts(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiFunctionCall {
    pub name: String,
    /// JSON-encoded argument object, forwarded verbatim.
    pub arguments: String,
}

/// One tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiToolCall {
    pub id: String,
    /// Wire discriminator; anything other than `"function"` is skipped by
    /// the agent loop.
    #[serde(rename = "type")]
    pub kind: String,
    pub function: ApiFunctionCall,
}

impl ApiToolCall {
    pub fn function(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: "function".into(),
            function: ApiFunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

/// One message in the API payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiMessage {
    pub role: ApiRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<ApiContent>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ApiToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ApiMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: ApiRole::System,
            content: Some(ApiContent::Text(text.into())),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ApiRole::User,
            content: Some(ApiContent::Text(text.into())),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn user_with_parts(parts: Vec<ApiContentPart>) -> Self {
        // Collapse a lone text part for cleaner serialization.
        let content = match parts.as_slice() {
            [ApiContentPart::Text { text }] => ApiContent::Text(text.clone()),
            _ => ApiContent::Parts(parts),
        };
        Self {
            role: ApiRole::User,
            content: Some(content),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn assistant(text: impl Into<String>, tool_calls: Vec<ApiToolCall>) -> Self {
        Self {
            role: ApiRole::Assistant,
            content: Some(ApiContent::Text(text.into())),
            tool_calls,
            tool_call_id: None,
        }
    }

    pub fn tool_reply(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: ApiRole::Tool,
            content: Some(ApiContent::Text(content.into())),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

/// A tool schema provided to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema of the parameters object.
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// One absorbed model reply: optional text, requested tool calls, usage.
#[derive(Debug, Clone, Default)]
pub struct ChatCompletion {
    pub content: Option<String>,
    pub tool_calls: Vec<ApiToolCall>,
    pub usage: Option<ApiUsage>,
}

/// Request handed to a [`crate::ChatProvider`].
///
/// `memory`, `workdir` and `session_id` are forwarded host context; the core
/// never inspects them.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<ApiMessage>,
    pub tools: Vec<ToolSchema>,
    pub memory: Option<String>,
    pub workdir: String,
    pub session_id: String,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── Construction ──────────────────────────────────────────────────────────

    #[test]
    fn user_message_has_text_content() {
        let m = ApiMessage::user("hello");
        assert_eq!(m.role, ApiRole::User);
        assert_eq!(m.content.as_ref().and_then(|c| c.as_text()), Some("hello"));
        assert!(m.tool_calls.is_empty());
    }

    #[test]
    fn tool_reply_carries_call_id() {
        let m = ApiMessage::tool_reply("t1", "result");
        assert_eq!(m.role, ApiRole::Tool);
        assert_eq!(m.tool_call_id.as_deref(), Some("t1"));
    }

    #[test]
    fn user_with_single_text_part_collapses_to_string() {
        let m = ApiMessage::user_with_parts(vec![ApiContentPart::text("only")]);
        assert_eq!(m.content.as_ref().and_then(|c| c.as_text()), Some("only"));
    }

    #[test]
    fn user_with_mixed_parts_stays_parts() {
        let m = ApiMessage::user_with_parts(vec![
            ApiContentPart::text("look"),
            ApiContentPart::image("data:image/png;base64,AA"),
        ]);
        assert!(matches!(m.content, Some(ApiContent::Parts(ref p)) if p.len() == 2));
    }

    #[test]
    fn function_call_constructor_sets_kind() {
        let tc = ApiToolCall::function("t1", "grep", "{}");
        assert_eq!(tc.kind, "function");
        assert_eq!(tc.function.name, "grep");
    }

    // ── Serialization ─────────────────────────────────────────────────────────

    #[test]
    fn assistant_without_tool_calls_omits_field() {
        let m = ApiMessage::assistant("hi", vec![]);
        let json = serde_json::to_string(&m).unwrap();
        assert!(!json.contains("tool_calls"), "{json}");
    }

    #[test]
    fn tool_call_serializes_wire_discriminator() {
        let m = ApiMessage::assistant("", vec![ApiToolCall::function("t1", "ls", "{}")]);
        let json = serde_json::to_string(&m).unwrap();
        assert!(json.contains(r#""type":"function""#), "{json}");
    }

    #[test]
    fn serialization_is_deterministic() {
        let m = ApiMessage::assistant(
            "text",
            vec![ApiToolCall::function("a", "f", r#"{"x":1}"#)],
        );
        let a = serde_json::to_string(&m).unwrap();
        let b = serde_json::to_string(&m).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn message_round_trip() {
        let m = ApiMessage::user_with_parts(vec![
            ApiContentPart::text("a"),
            ApiContentPart::image("data:image/png;base64,Q"),
        ]);
        let json = serde_json::to_string(&m).unwrap();
        let back: ApiMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn usage_deserializes_with_missing_fields() {
        let u: ApiUsage = serde_json::from_str(r#"{"total_tokens": 42}"#).unwrap();
        assert_eq!(u.total_tokens, 42);
        assert_eq!(u.prompt_tokens, 0);
    }
}
