// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::{json, Value};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use crate::builtin::require_str;
use crate::tool::{ToolContext, ToolPlugin, ToolResult};

/// Hard byte ceiling for combined stdout + stderr returned to the model.
const OUTPUT_LIMIT_BYTES: usize = 20_000;

/// Lines kept from the head of oversized output.
const HEAD_LINES: usize = 100;

/// Lines kept from the tail of oversized output.  Errors and summaries
/// almost always appear at the end of build/test output, so the tail is at
/// least as important as the head.
const TAIL_LINES: usize = 100;

/// Model-driven one-shot shell command.
///
/// Distinct from the interactive `!command` shell manager: this tool runs
/// to completion (or timeout/abort) and returns the captured output as a
/// plain string.
pub struct BashTool {
    pub timeout_secs: u64,
}

impl Default for BashTool {
    fn default() -> Self {
        Self { timeout_secs: 120 }
    }
}

#[async_trait]
impl ToolPlugin for BashTool {
    fn name(&self) -> &str {
        "bash"
    }

    fn description(&self) -> &str {
        "Execute a shell command and return stdout + stderr.\n\
         'command' is required and can be any bash one-liner.\n\
         Output is capped at ~20 KB; when larger, the first 100 and last 100 lines are \
         preserved with an omission marker in the middle.\n\
         Prefer non-interactive commands. Avoid commands that require a TTY.\n\
         Do NOT use bash for file operations:\n\
         - Read files  → read_file  (not cat / head / tail)\n\
         - Search text → grep tool  (not grep / rg)\n\
         - Find files  → glob tool  (not find / ls -R)\n\
         - Edit files  → edit_file  (not sed / awk / patch)"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The complete bash one-liner to execute."
                },
                "timeout_secs": {
                    "type": "integer",
                    "description": "Execution timeout in seconds (optional)"
                }
            },
            "required": ["command"],
            "additionalProperties": false
        })
    }

    fn format_compact_args(&self, args: &Value) -> Option<String> {
        args.get("command").and_then(|v| v.as_str()).map(str::to_string)
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolResult {
        if ctx.abort.is_raised() {
            return ToolResult::aborted();
        }
        let command = match require_str(&args, "command") {
            Ok(c) => c.to_string(),
            Err(e) => return ToolResult::error(e),
        };
        let timeout = args
            .get("timeout_secs")
            .and_then(|v| v.as_u64())
            .unwrap_or(self.timeout_secs);

        debug!(cmd = %command, "bash tool");

        let mut cmd = Command::new("bash");
        cmd.arg("-c").arg(&command);
        cmd.current_dir(&ctx.workdir);
        // `stdin(null)` keeps the subprocess away from the controlling
        // terminal; `kill_on_drop` guarantees the child dies when the
        // timeout or the abort token cancels this future.
        cmd.stdin(Stdio::null());
        cmd.kill_on_drop(true);
        // setsid() detaches the child from the controlling terminal so it
        // cannot open /dev/tty behind the host UI's back.
        #[cfg(unix)]
        unsafe {
            cmd.pre_exec(|| {
                libc::setsid();
                Ok(())
            });
        }

        let run = tokio::time::timeout(std::time::Duration::from_secs(timeout), cmd.output());
        let result = match ctx.abort.observe(run).await {
            Err(_) => return ToolResult::aborted(),
            Ok(r) => r,
        };

        match result {
            Ok(Ok(output)) => {
                let mut content = String::new();
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);

                if !stdout.is_empty() {
                    content.push_str(&head_tail_truncate(&stdout));
                }
                if !stderr.is_empty() {
                    if !content.is_empty() {
                        content.push('\n');
                    }
                    content.push_str("[stderr]\n");
                    content.push_str(&head_tail_truncate(&stderr));
                }

                let code = output.status.code().unwrap_or(-1);
                if content.is_empty() {
                    content = format!("[exit {code}]");
                }
                if code == 0 {
                    ToolResult::ok(content)
                } else if code == 1 {
                    // Exit code 1 is the Unix convention for "no matches"
                    // (grep) and "condition false" (test); not a hard error.
                    ToolResult::ok(format!("[exit 1]\n{content}"))
                } else {
                    ToolResult::error(format!("[exit {code}]\n{content}"))
                }
            }
            Ok(Err(e)) => ToolResult::error(format!("spawn error: {e}")),
            Err(_) => ToolResult::error(format!("timeout after {timeout}s")),
        }
    }
}

/// Truncate `s` to fit within `OUTPUT_LIMIT_BYTES`, keeping the first
/// `HEAD_LINES` and last `TAIL_LINES` with an omission marker in between.
fn head_tail_truncate(s: &str) -> String {
    if s.len() <= OUTPUT_LIMIT_BYTES {
        return s.to_string();
    }

    let lines: Vec<&str> = s.lines().collect();
    let total = lines.len();

    if total <= HEAD_LINES + TAIL_LINES {
        // Byte budget exceeded by very long lines; fall back to byte-level
        // head + tail windows.
        let head = &s[..(OUTPUT_LIMIT_BYTES / 2).min(s.len())];
        let tail = &s[s.len().saturating_sub(OUTPUT_LIMIT_BYTES / 2)..];
        let omitted = s.len() - head.len() - tail.len();
        return format!("{head}\n...[{omitted} bytes omitted]...\n{tail}");
    }

    let head = lines[..HEAD_LINES].join("\n");
    let tail = lines[total - TAIL_LINES..].join("\n");
    let omitted_lines = total - HEAD_LINES - TAIL_LINES;
    let omitted_bytes = s.len().saturating_sub(head.len() + tail.len());
    format!("{head}\n...[{omitted_lines} lines / ~{omitted_bytes} bytes omitted]...\n{tail}")
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
