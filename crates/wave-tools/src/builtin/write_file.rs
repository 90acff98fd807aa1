// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::builtin::require_str;
use crate::tool::{compute_hunks, FileDiff, ToolContext, ToolPlugin, ToolResult};

/// Create or overwrite a file.  Returns a [`FileDiff`] against the previous
/// content (empty for a new file) so the UI can render the change.
pub struct WriteFileTool;

#[async_trait]
impl ToolPlugin for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Create or overwrite a file with the given content.\n\
         'path' and 'content' are required. Parent directories are created.\n\
         Prefer edit_file for small changes to existing files."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "File to write" },
                "content": { "type": "string", "description": "Full new file content" }
            },
            "required": ["path", "content"],
            "additionalProperties": false
        })
    }

    fn format_compact_args(&self, args: &Value) -> Option<String> {
        args.get("path").and_then(|v| v.as_str()).map(str::to_string)
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolResult {
        if ctx.abort.is_raised() {
            return ToolResult::aborted();
        }
        let path = match require_str(&args, "path") {
            Ok(p) => ctx.resolve(p),
            Err(e) => return ToolResult::error(e),
        };
        let content = match require_str(&args, "content") {
            Ok(c) => c.to_string(),
            Err(e) => return ToolResult::error(e),
        };

        debug!(path = %path.display(), bytes = content.len(), "write_file tool");

        let original = tokio::fs::read_to_string(&path).await.unwrap_or_default();
        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return ToolResult::error(format!("cannot create {}: {e}", parent.display()));
            }
        }
        if let Err(e) = tokio::fs::write(&path, &content).await {
            return ToolResult::error(format!("cannot write {}: {e}", path.display()));
        }

        let hunks = compute_hunks(&original, &content);
        let bytes = content.len();
        ToolResult::ok(format!("Wrote {} ({bytes} bytes)", path.display()))
            .with_short(format!("{bytes} bytes"))
            .with_diff(FileDiff {
                file_path: path,
                original_content: original,
                new_content: content,
                hunks,
            })
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
