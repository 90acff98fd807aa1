// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! The conversation data model: messages tagged by role, each carrying an
//! ordered list of typed blocks.  Assistant messages grow in place while
//! the model streams; everything else is append-only.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use wave_tools::DiffHunk;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    User,
    Assistant,
    Tool,
    SubAgent,
}

/// Destination of a captured memory note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryKind {
    Project,
    User,
}

/// Typed leaf of a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    /// User/assistant free-form text.
    Text { content: String },
    /// The currently-growing assistant answer.
    Answer { content: String },
    /// One tool invocation and its lifecycle.
    Tool {
        id: String,
        name: String,
        /// JSON argument string as shown to the user (pretty-printed once
        /// parsed).
        args: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        compact_args: Option<String>,
        is_running: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        success: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        short_result: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Structured file edit shown to the UI.
    Diff {
        file_path: PathBuf,
        original_content: String,
        new_content: String,
        hunks: Vec<DiffHunk>,
    },
    /// Streaming `!command` shell output.
    CommandOutput {
        command: String,
        output: String,
        is_running: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        exit_code: Option<i32>,
    },
    Error { content: String },
    /// Synthetic summary replacing omitted history at API-build time.
    Compress { content: String },
    Memory {
        content: String,
        success: bool,
        kind: MemoryKind,
        storage_path: PathBuf,
    },
}

/// One record in the session log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub role: Role,
    pub blocks: Vec<Block>,
    /// User-attached images (data URLs), surfaced as image parts at
    /// API-build time.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

impl MessageRecord {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            blocks: vec![Block::Text { content: text.into() }],
            images: Vec::new(),
        }
    }

    pub fn user_with_images(text: impl Into<String>, images: Vec<String>) -> Self {
        Self {
            role: Role::User,
            blocks: vec![Block::Text { content: text.into() }],
            images,
        }
    }

    /// Fresh assistant message; blocks are appended as the turn progresses.
    pub fn assistant() -> Self {
        Self {
            role: Role::Assistant,
            blocks: Vec::new(),
            images: Vec::new(),
        }
    }

    pub fn compress(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            blocks: vec![Block::Compress { content: content.into() }],
            images: Vec::new(),
        }
    }

    /// Concatenation of all Answer blocks.
    pub fn answer_text(&self) -> String {
        self.blocks
            .iter()
            .filter_map(|b| match b {
                Block::Answer { content } => Some(content.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Whether any block is a Compress annotation.
    pub fn has_compress(&self) -> bool {
        self.blocks.iter().any(|b| matches!(b, Block::Compress { .. }))
    }

    pub fn find_tool_block_mut(&mut self, tool_id: &str) -> Option<&mut Block> {
        self.blocks
            .iter_mut()
            .find(|b| matches!(&**b, Block::Tool { id, .. } if id == tool_id))
    }
}

/// Field-wise update for a Tool block; `None` leaves the field unchanged.
#[derive(Debug, Clone, Default)]
pub struct ToolBlockPatch {
    pub name: Option<String>,
    pub args: Option<String>,
    pub compact_args: Option<String>,
    pub is_running: Option<bool>,
    pub success: Option<bool>,
    pub result: Option<String>,
    pub short_result: Option<String>,
    pub error: Option<String>,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
