// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::builtin::glob::shell_quote;
use crate::builtin::require_str;
use crate::tool::{ToolContext, ToolPlugin, ToolResult};

/// Content search delegated to `grep -rn`.
pub struct GrepTool;

#[async_trait]
impl ToolPlugin for GrepTool {
    fn name(&self) -> &str {
        "grep"
    }

    fn description(&self) -> &str {
        "Search file contents with a regular expression.\n\
         pattern: POSIX extended regex. path: file or directory (default: workdir).\n\
         include: filename glob filter, e.g. '*.rs'. case_sensitive: true by default.\n\
         limit: maximum matches returned (default 100).\n\
         Output is file:line:text. Binary files are skipped."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Regular expression pattern to search for"
                },
                "path": {
                    "type": "string",
                    "description": "File or directory to search in (default: workdir)"
                },
                "include": {
                    "type": "string",
                    "description": "Glob pattern to filter files, e.g. '*.rs'"
                },
                "case_sensitive": {
                    "type": "boolean",
                    "description": "Case-sensitive search (default true)"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of matches to return (default 100)"
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
        let path = args
            .get("path")
            .and_then(|v| v.as_str())
            .map(|p| ctx.resolve(p))
            .unwrap_or_else(|| ctx.workdir.clone());
        let include = args.get("include").and_then(|v| v.as_str());
        let case_sensitive = args
            .get("case_sensitive")
            .and_then(|v| v.as_bool())
            .unwrap_or(true);
        let limit = args.get("limit").and_then(|v| v.as_u64()).unwrap_or(100);

        debug!(pattern = %pattern, path = %path.display(), "grep tool");

        let mut cmd = String::from("grep -rnIE ");
        if !case_sensitive {
            cmd.push_str("-i ");
        }
        if let Some(glob) = include {
            cmd.push_str(&format!("--include={} ", shell_quote(glob)));
        }
        cmd.push_str("--exclude-dir=.git --exclude-dir=target --exclude-dir=node_modules ");
        cmd.push_str(&format!(
            "-e {} {} | head -{limit}",
            shell_quote(&pattern),
            shell_quote(&path.to_string_lossy()),
        ));

        let run = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&cmd)
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true)
            .output();

        match ctx.abort.observe(run).await {
            Err(_) => ToolResult::aborted(),
            Ok(Err(e)) => ToolResult::error(format!("grep error: {e}")),
            Ok(Ok(out)) => {
                let text = String::from_utf8_lossy(&out.stdout);
                let trimmed = text.trim_end();
                // grep exits 1 on "no matches"; that is an empty result, not
                // a failure.
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

// ─── Unit tests ──────────────────────────────────────────────────────────────
