// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::builtin::edit_file::apply_edit;
use crate::builtin::require_str;
use crate::tool::{compute_hunks, FileDiff, ToolContext, ToolPlugin, ToolResult};

/// Several exact-string edits applied to one file as a unit.
///
/// Edits run in order against the in-memory content; the file is written
/// once, only when every edit applied.  A failing edit aborts the whole
/// call and the file is left untouched.
pub struct MultiEditTool;

#[async_trait]
impl ToolPlugin for MultiEditTool {
    fn name(&self) -> &str {
        "multi_edit"
    }

    fn description(&self) -> &str {
        "Apply several exact-string edits to one file atomically.\n\
         'path' and 'edits' (array of {old_string, new_string, replace_all?}) are required.\n\
         Edits are applied in order; if any edit fails the file is not modified."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "File to edit" },
                "edits": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "old_string": { "type": "string" },
                            "new_string": { "type": "string" },
                            "replace_all": { "type": "boolean" }
                        },
                        "required": ["old_string", "new_string"]
                    },
                    "description": "Edits applied in order"
                }
            },
            "required": ["path", "edits"],
            "additionalProperties": false
        })
    }

    fn format_compact_args(&self, args: &Value) -> Option<String> {
        let path = args.get("path").and_then(|v| v.as_str())?;
        let count = args.get("edits").and_then(|v| v.as_array()).map(|a| a.len());
        match count {
            Some(n) => Some(format!("{path} ({n} edits)")),
            None => Some(path.to_string()),
        }
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolResult {
        if ctx.abort.is_raised() {
            return ToolResult::aborted();
        }
        let path = match require_str(&args, "path") {
            Ok(p) => ctx.resolve(p),
            Err(e) => return ToolResult::error(e),
        };
        let edits = match args.get("edits").and_then(|v| v.as_array()) {
            Some(e) if !e.is_empty() => e.clone(),
            _ => return ToolResult::error("missing required parameter 'edits'"),
        };

        debug!(path = %path.display(), edits = edits.len(), "multi_edit tool");

        let original = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) => return ToolResult::error(format!("cannot read {}: {e}", path.display())),
        };

        let mut updated = original.clone();
        for (i, edit) in edits.iter().enumerate() {
            let old_string = match require_str(edit, "old_string") {
                Ok(s) => s,
                Err(e) => return ToolResult::error(format!("edit #{}: {e}", i + 1)),
            };
            let new_string = match require_str(edit, "new_string") {
                Ok(s) => s,
                Err(e) => return ToolResult::error(format!("edit #{}: {e}", i + 1)),
            };
            let replace_all = edit
                .get("replace_all")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            updated = match apply_edit(&updated, old_string, new_string, replace_all) {
                Ok(u) => u,
                Err(e) => {
                    return ToolResult::error(format!(
                        "edit #{} failed: {e} ({})",
                        i + 1,
                        path.display()
                    ))
                }
            };
        }

        if let Err(e) = tokio::fs::write(&path, &updated).await {
            return ToolResult::error(format!("cannot write {}: {e}", path.display()));
        }

        let hunks = compute_hunks(&original, &updated);
        ToolResult::ok(format!("Applied {} edits to {}", edits.len(), path.display()))
            .with_short(format!("{} edits", edits.len()))
            .with_diff(FileDiff {
                file_path: path,
                original_content: original,
                new_content: updated,
                hunks,
            })
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
    async fn applies_edits_in_order() {
        let (dir, ctx) = fixture("alpha beta\n");
        let out = MultiEditTool
            .execute(
                json!({
                    "path": "f.txt",
                    "edits": [
                        {"old_string": "alpha", "new_string": "gamma"},
                        {"old_string": "gamma beta", "new_string": "done"}
                    ]
                }),
                &ctx,
            )
            .await;
        assert!(out.success, "{}", out.content);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("f.txt")).unwrap(),
            "done\n"
        );
    }

    #[tokio::test]
    async fn failing_edit_leaves_file_untouched() {
        let (dir, ctx) = fixture("original\n");
        let out = MultiEditTool
            .execute(
                json!({
                    "path": "f.txt",
                    "edits": [
                        {"old_string": "original", "new_string": "changed"},
                        {"old_string": "not-present", "new_string": "x"}
                    ]
                }),
                &ctx,
            )
            .await;
        assert!(!out.success);
        assert!(out.content.contains("edit #2"));
        assert_eq!(
            std::fs::read_to_string(dir.path().join("f.txt")).unwrap(),
            "original\n"
        );
    }

    #[tokio::test]
    async fn empty_edits_array_is_error() {
        let (_dir, ctx) = fixture("x\n");
        let out = MultiEditTool
            .execute(json!({"path": "f.txt", "edits": []}), &ctx)
            .await;
        assert!(!out.success);
    }

    #[test]
    fn compact_args_include_edit_count() {
        let args = json!({"path": "f.txt", "edits": [{"old_string": "a", "new_string": "b"}]});
        assert_eq!(
            MultiEditTool.format_compact_args(&args),
            Some("f.txt (1 edits)".to_string())
        );
    }
}
