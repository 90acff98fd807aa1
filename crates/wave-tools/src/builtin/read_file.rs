// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::builtin::require_str;
use crate::tool::{ToolContext, ToolPlugin, ToolResult};

/// Hard byte ceiling for file content returned to the model.
const READ_LIMIT_BYTES: usize = 48_000;

pub struct ReadFileTool;

#[async_trait]
impl ToolPlugin for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a text file and return its content.\n\
         'path' is required (absolute or relative to the working directory).\n\
         Optional 'offset' (1-based first line) and 'limit' (line count) select a window.\n\
         Oversized content is truncated with an omission marker."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "File to read" },
                "offset": { "type": "integer", "description": "1-based first line (optional)" },
                "limit": { "type": "integer", "description": "Number of lines to read (optional)" }
            },
            "required": ["path"],
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
        let offset = args.get("offset").and_then(|v| v.as_u64()).map(|v| v as usize);
        let limit = args.get("limit").and_then(|v| v.as_u64()).map(|v| v as usize);

        debug!(path = %path.display(), "read_file tool");

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) => return ToolResult::error(format!("cannot read {}: {e}", path.display())),
        };

        let total_lines = content.lines().count();
        let windowed = match (offset, limit) {
            (None, None) => content,
            (offset, limit) => {
                let start = offset.unwrap_or(1).saturating_sub(1);
                let take = limit.unwrap_or(usize::MAX);
                content
                    .lines()
                    .skip(start)
                    .take(take)
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        };

        let out = if windowed.len() > READ_LIMIT_BYTES {
            let head = &windowed[..READ_LIMIT_BYTES];
            format!(
                "{head}\n...[{} bytes omitted]...",
                windowed.len() - READ_LIMIT_BYTES
            )
        } else {
            windowed
        };

        ToolResult::ok(out).with_short(format!("{total_lines} lines"))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(content: &str) -> (tempfile::TempDir, ToolContext) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), content).unwrap();
        let ctx = ToolContext::new(dir.path());
        (dir, ctx)
    }

    #[tokio::test]
    async fn reads_whole_file() {
        let (_dir, ctx) = fixture("one\ntwo\nthree\n");
        let out = ReadFileTool
            .execute(json!({"path": "f.txt"}), &ctx)
            .await;
        assert!(out.success, "{}", out.content);
        assert_eq!(out.content, "one\ntwo\nthree\n");
        assert_eq!(out.short_result.as_deref(), Some("3 lines"));
    }

    #[tokio::test]
    async fn offset_and_limit_select_window() {
        let (_dir, ctx) = fixture("a\nb\nc\nd\n");
        let out = ReadFileTool
            .execute(json!({"path": "f.txt", "offset": 2, "limit": 2}), &ctx)
            .await;
        assert_eq!(out.content, "b\nc");
    }

    #[tokio::test]
    async fn missing_file_is_error() {
        let (_dir, ctx) = fixture("");
        let out = ReadFileTool
            .execute(json!({"path": "nope.txt"}), &ctx)
            .await;
        assert!(!out.success);
        assert!(out.content.contains("cannot read"));
    }

    #[tokio::test]
    async fn missing_path_argument_is_error() {
        let (_dir, ctx) = fixture("");
        let out = ReadFileTool.execute(json!({}), &ctx).await;
        assert!(!out.success);
        assert!(out.content.contains("'path'"));
    }

    #[tokio::test]
    async fn raised_abort_short_circuits() {
        let (_dir, ctx) = fixture("x");
        ctx.abort.raise();
        let out = ReadFileTool.execute(json!({"path": "f.txt"}), &ctx).await;
        assert_eq!(out.error.as_deref(), Some("aborted"));
    }

    #[test]
    fn compact_args_is_the_path() {
        assert_eq!(
            ReadFileTool.format_compact_args(&json!({"path": "src/lib.rs"})),
            Some("src/lib.rs".to_string())
        );
    }
}
