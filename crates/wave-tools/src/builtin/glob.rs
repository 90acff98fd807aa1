// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::builtin::require_str;
use crate::tool::{ToolContext, ToolPlugin, ToolResult};

/// Recursive file search by name pattern, delegated to `find`.
pub struct GlobTool;

#[async_trait]
impl ToolPlugin for GlobTool {
    fn name(&self) -> &str {
        "glob"
    }

    fn description(&self) -> &str {
        "Find files matching a glob pattern. Excludes .git/, target/ and node_modules/ \
         automatically. max_results: 200 by default.\n\
         Patterns starting with **/ are normalized (find is recursive by default).\n\
         Examples: *.rs | **/*.rs | Cargo.toml\n\
         For content search use grep; for directory structure use list_dir."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Shell glob pattern, e.g. '*.rs'"
                },
                "root": {
                    "type": "string",
                    "description": "Root directory to search from (default: workdir)"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Maximum number of results (default 200)"
                }
            },
            "required": ["pattern"],
            "additionalProperties": false
        })
    }

    fn format_compact_args(&self, args: &Value) -> Option<String> {
        args.get("pattern").and_then(|v| v.as_str()).map(str::to_string)
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolResult {
        if ctx.abort.is_raised() {
            return ToolResult::aborted();
        }
        let pattern = match require_str(&args, "pattern") {
            Ok(p) => p.to_string(),
            Err(e) => return ToolResult::error(e),
        };
        let root = args
            .get("root")
            .and_then(|v| v.as_str())
            .map(|p| ctx.resolve(p))
            .unwrap_or_else(|| ctx.workdir.clone());
        let max = args
            .get("max_results")
            .and_then(|v| v.as_u64())
            .unwrap_or(200);

        debug!(pattern = %pattern, root = %root.display(), "glob tool");

        // find is recursive by default; a leading **/ is redundant.
        let normalized = pattern.strip_prefix("**/").unwrap_or(&pattern);
        let cmd = format!(
            "find {} -name '{}' -not -path '*/target/*' -not -path '*/.git/*' \
             -not -path '*/node_modules/*' | head -{max}",
            shell_quote(&root.to_string_lossy()),
            normalized.replace('\'', ""),
        );

        let run = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&cmd)
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true)
            .output();

        match ctx.abort.observe(run).await {
            Err(_) => ToolResult::aborted(),
            Ok(Err(e)) => ToolResult::error(format!("glob error: {e}")),
            Ok(Ok(out)) => {
                let text = String::from_utf8_lossy(&out.stdout);
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    ToolResult::ok("(no matches)").with_short("0 matches".to_string())
                } else {
                    let count = trimmed.lines().count();
                    ToolResult::ok(trimmed.to_string())
                        .with_short(format!("{count} matches"))
                }
            }
        }
    }
}

/// Wrap a path in single quotes for `sh -c`, escaping embedded quotes.
pub(crate) fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
