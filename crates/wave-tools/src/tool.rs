// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use similar::{ChangeTag, TextDiff};

use wave_model::CancelToken;

/// Execution context handed to every tool invocation.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Raised by the agent loop on user abort.  Tools must observe it and
    /// return promptly with an `"aborted"` error.
    pub abort: CancelToken,
    /// Project working directory; relative tool paths resolve against it.
    pub workdir: PathBuf,
}

impl ToolContext {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            abort: CancelToken::new(),
            workdir: workdir.into(),
        }
    }

    /// Resolve a user/model-supplied path against the working directory.
    pub fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.workdir.join(p)
        }
    }
}

/// One contiguous run of equal/added/removed lines in a file edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffHunk {
    /// Raw line run including trailing newlines; concatenating all hunk
    /// values on one side reconstructs that side of the file.
    pub value: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub added: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub removed: bool,
}

/// Structured description of a file edit, produced by the mutating file
/// tools and surfaced to the UI as a Diff block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDiff {
    pub file_path: PathBuf,
    pub original_content: String,
    pub new_content: String,
    pub hunks: Vec<DiffHunk>,
}

/// Line-level diff of `old` → `new`, grouped into runs of one kind.
pub fn compute_hunks(old: &str, new: &str) -> Vec<DiffHunk> {
    let diff = TextDiff::from_lines(old, new);
    let mut hunks: Vec<DiffHunk> = Vec::new();
    for change in diff.iter_all_changes() {
        let (added, removed) = match change.tag() {
            ChangeTag::Insert => (true, false),
            ChangeTag::Delete => (false, true),
            ChangeTag::Equal => (false, false),
        };
        match hunks.last_mut() {
            Some(h) if h.added == added && h.removed == removed => {
                h.value.push_str(change.value());
            }
            _ => hunks.push(DiffHunk {
                value: change.value().to_string(),
                added,
                removed,
            }),
        }
    }
    hunks
}

/// The result of executing a tool.  Never an exception: failures are
/// carried in-band via `success`/`error`.
#[derive(Debug, Clone, Default)]
pub struct ToolResult {
    pub success: bool,
    /// Plain-text result forwarded to the model.
    pub content: String,
    pub error: Option<String>,
    /// One-line summary for compact UI rendering.
    pub short_result: Option<String>,
    /// Present when the tool edited a file; the agent loop turns it into a
    /// Diff block.
    pub file_diff: Option<FileDiff>,
}

impl ToolResult {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            success: true,
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        Self {
            success: false,
            content: msg.clone(),
            error: Some(msg),
            ..Default::default()
        }
    }

    /// Canonical result for an invocation interrupted by the abort token.
    pub fn aborted() -> Self {
        Self::error("aborted")
    }

    pub fn with_short(mut self, short: impl Into<String>) -> Self {
        self.short_result = Some(short.into());
        self
    }

    pub fn with_diff(mut self, diff: FileDiff) -> Self {
        self.file_diff = Some(diff);
        self
    }
}

/// Trait implemented by every built-in tool and by the MCP adapter.
#[async_trait]
pub trait ToolPlugin: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema for the parameters object.
    fn parameters_schema(&self) -> Value;
    /// Compact one-line rendering of the arguments for the UI.  Returning
    /// `None` means "no compact form"; this method cannot fail.
    fn format_compact_args(&self, _args: &Value) -> Option<String> {
        None
    }
    /// Execute the tool.  Failures are wrapped in [`ToolResult::error`].
    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolResult;
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
