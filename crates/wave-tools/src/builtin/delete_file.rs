// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::builtin::require_str;
use crate::tool::{ToolContext, ToolPlugin, ToolResult};

pub struct DeleteFileTool;

#[async_trait]
impl ToolPlugin for DeleteFileTool {
    fn name(&self) -> &str {
        "delete_file"
    }

    fn description(&self) -> &str {
        "Delete a single file. 'path' is required. Directories are refused."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "File to delete" }
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

        debug!(path = %path.display(), "delete_file tool");

        if path.is_dir() {
            return ToolResult::error(format!("{} is a directory", path.display()));
        }
        match tokio::fs::remove_file(&path).await {
            Ok(()) => ToolResult::ok(format!("Deleted {}", path.display())),
            Err(e) => ToolResult::error(format!("cannot delete {}: {e}", path.display())),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deletes_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("gone.txt");
        std::fs::write(&file, "x").unwrap();
        let ctx = ToolContext::new(dir.path());
        let out = DeleteFileTool
            .execute(json!({"path": "gone.txt"}), &ctx)
            .await;
        assert!(out.success, "{}", out.content);
        assert!(!file.exists());
    }

    #[tokio::test]
    async fn missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ToolContext::new(dir.path());
        let out = DeleteFileTool
            .execute(json!({"path": "absent.txt"}), &ctx)
            .await;
        assert!(!out.success);
    }

    #[tokio::test]
    async fn directory_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let ctx = ToolContext::new(dir.path());
        let out = DeleteFileTool.execute(json!({"path": "sub"}), &ctx).await;
        assert!(!out.success);
        assert!(out.content.contains("directory"));
    }
}
