// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::builtin::require_str;
use crate::tool::{compute_hunks, FileDiff, ToolContext, ToolPlugin, ToolResult};

/// Exact-string replacement edit.
///
/// The replacement must be unique unless `replace_all` is set; an ambiguous
/// or missing `old_string` is reported back to the model so it can re-read
/// the file and retry with more context.
pub struct EditFileTool;

/// Apply one exact-string edit to `content`.  Shared with `multi_edit`.
pub(crate) fn apply_edit(
    content: &str,
    old_string: &str,
    new_string: &str,
    replace_all: bool,
) -> Result<String, String> {
    if old_string.is_empty() {
        return Err("old_string must not be empty".to_string());
    }
    let occurrences = content.matches(old_string).count();
    if occurrences == 0 {
        return Err("old_string not found in file".to_string());
    }
    if occurrences > 1 && !replace_all {
        return Err(format!(
            "old_string occurs {occurrences} times; add surrounding context to make it \
             unique or pass replace_all"
        ));
    }
    if replace_all {
        Ok(content.replace(old_string, new_string))
    } else {
        Ok(content.replacen(old_string, new_string, 1))
    }
}

#[async_trait]
impl ToolPlugin for EditFileTool {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn description(&self) -> &str {
        "Replace an exact string in a file.\n\
         'path', 'old_string' and 'new_string' are required.\n\
         old_string must match the file exactly (including whitespace) and must be \
         unique unless 'replace_all' is true.\n\
         Read the file first; copy old_string verbatim from it."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "File to edit" },
                "old_string": { "type": "string", "description": "Exact text to replace" },
                "new_string": { "type": "string", "description": "Replacement text" },
                "replace_all": { "type": "boolean", "description": "Replace every occurrence (default false)" }
            },
            "required": ["path", "old_string", "new_string"],
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
        let old_string = match require_str(&args, "old_string") {
            Ok(s) => s.to_string(),
            Err(e) => return ToolResult::error(e),
        };
        let new_string = match require_str(&args, "new_string") {
            Ok(s) => s.to_string(),
            Err(e) => return ToolResult::error(e),
        };
        let replace_all = args
            .get("replace_all")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        debug!(path = %path.display(), replace_all, "edit_file tool");

        let original = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) => return ToolResult::error(format!("cannot read {}: {e}", path.display())),
        };
        let updated = match apply_edit(&original, &old_string, &new_string, replace_all) {
            Ok(u) => u,
            Err(e) => return ToolResult::error(format!("{e} ({})", path.display())),
        };
        if let Err(e) = tokio::fs::write(&path, &updated).await {
            return ToolResult::error(format!("cannot write {}: {e}", path.display()));
        }

        let hunks = compute_hunks(&original, &updated);
        ToolResult::ok(format!("Edited {}", path.display()))
            .with_short("1 edit".to_string())
            .with_diff(FileDiff {
                file_path: path,
                original_content: original,
                new_content: updated,
                hunks,
            })
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
