// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::tool::{ToolContext, ToolPlugin, ToolResult};

pub struct ListDirTool;

#[async_trait]
impl ToolPlugin for ListDirTool {
    fn name(&self) -> &str {
        "list_dir"
    }

    fn description(&self) -> &str {
        "List the entries of a directory, sorted by name. Directories carry a trailing '/'.\n\
         'path' is optional and defaults to the working directory."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Directory to list (default: workdir)" }
            },
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
        let path = args
            .get("path")
            .and_then(|v| v.as_str())
            .map(|p| ctx.resolve(p))
            .unwrap_or_else(|| ctx.workdir.clone());

        debug!(path = %path.display(), "list_dir tool");

        let mut rd = match tokio::fs::read_dir(&path).await {
            Ok(rd) => rd,
            Err(e) => return ToolResult::error(format!("cannot list {}: {e}", path.display())),
        };
        let mut entries: Vec<String> = Vec::new();
        while let Ok(Some(entry)) = rd.next_entry().await {
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            entries.push(if is_dir { format!("{name}/") } else { name });
        }
        entries.sort();

        let count = entries.len();
        let content = if entries.is_empty() {
            "(empty)".to_string()
        } else {
            entries.join("\n")
        };
        ToolResult::ok(content).with_short(format!("{count} entries"))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lists_sorted_entries_with_dir_suffix() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "").unwrap();
        std::fs::create_dir(dir.path().join("a")).unwrap();
        let ctx = ToolContext::new(dir.path());
        let out = ListDirTool.execute(json!({}), &ctx).await;
        assert!(out.success);
        assert_eq!(out.content, "a/\nb.txt");
        assert_eq!(out.short_result.as_deref(), Some("2 entries"));
    }

    #[tokio::test]
    async fn empty_directory_reports_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ToolContext::new(dir.path());
        let out = ListDirTool.execute(json!({}), &ctx).await;
        assert_eq!(out.content, "(empty)");
    }

    #[tokio::test]
    async fn missing_directory_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ToolContext::new(dir.path());
        let out = ListDirTool.execute(json!({"path": "nope"}), &ctx).await;
        assert!(!out.success);
    }
}
