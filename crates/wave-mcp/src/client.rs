// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Stdio JSON-RPC 2.0 transport to one MCP server.
//!
//! The server process is spawned with piped stdin/stdout; messages are
//! newline-delimited JSON.  A background task reads the stdout stream and
//! routes responses to their waiting requests by id.  Server-initiated
//! requests the client can answer trivially (`ping`, `roots/list`) are
//! answered inline; everything else from the server is ignored.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::McpServerDef;

/// Protocol version offered in the initialize handshake.
const PROTOCOL_VERSION: &str = "2025-06-18";

/// Per-request reply timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("spawn failed: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("server closed the connection")]
    Closed,
    #[error("request timed out")]
    Timeout,
    #[error("server error {code}: {message}")]
    Rpc { code: i64, message: String },
}

/// One tool advertised by a connected server.
#[derive(Debug, Clone, Deserialize)]
pub struct McpToolInfo {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_schema", rename = "inputSchema")]
    pub input_schema: Value,
}

fn default_schema() -> Value {
    json!({ "type": "object" })
}

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, McpError>>>>>;

/// A live connection to one MCP server process.
pub struct McpConnection {
    child: AsyncMutex<Child>,
    stdin: AsyncMutex<ChildStdin>,
    pending: Pending,
    next_id: AtomicU64,
    reader: JoinHandle<()>,
}

impl McpConnection {
    /// Spawn the server process and complete the MCP handshake
    /// (`initialize` request followed by the `notifications/initialized`
    /// notification).  Returns the connection and the server's tool list.
    pub async fn connect(def: &McpServerDef) -> Result<(Self, Vec<McpToolInfo>), McpError> {
        let mut child = Command::new(&def.command)
            .args(&def.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child.stdin.take().expect("piped stdin");
        let stdout = child.stdout.take().expect("piped stdout");

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let reader = tokio::spawn(read_loop(stdout, Arc::clone(&pending)));

        let conn = Self {
            child: AsyncMutex::new(child),
            stdin: AsyncMutex::new(stdin),
            pending,
            next_id: AtomicU64::new(1),
            reader,
        };

        conn.request(
            "initialize",
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "clientInfo": {
                    "name": "wave-agent",
                    "version": env!("CARGO_PKG_VERSION"),
                },
            }),
        )
        .await?;
        conn.notify("notifications/initialized", json!({})).await?;

        let tools = conn.list_tools().await?;
        Ok((conn, tools))
    }

    /// `tools/list` — the server's current tool set.
    pub async fn list_tools(&self) -> Result<Vec<McpToolInfo>, McpError> {
        let result = self.request("tools/list", json!({})).await?;
        let tools = result
            .get("tools")
            .cloned()
            .unwrap_or_else(|| json!([]));
        Ok(serde_json::from_value(tools).unwrap_or_default())
    }

    /// `tools/call` — returns the concatenated text content and the
    /// server's `isError` flag.
    pub async fn call_tool(&self, name: &str, args: Value) -> Result<(String, bool), McpError> {
        debug!(tool = name, "mcp tools/call");
        let result = self
            .request("tools/call", json!({ "name": name, "arguments": args }))
            .await?;
        let is_error = result
            .get("isError")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let text = result
            .get("content")
            .and_then(|v| v.as_array())
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| {
                        (p.get("type").and_then(|t| t.as_str()) == Some("text"))
                            .then(|| p.get("text").and_then(|t| t.as_str()))
                            .flatten()
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default();
        Ok((text, is_error))
    }

    /// Send a request and wait for the id-matched response.
    async fn request(&self, method: &str, params: Value) -> Result<Value, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(id, tx);

        let line = serde_json::to_string(&json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        }))
        .expect("request serializes");

        if let Err(e) = self.write_line(&line).await {
            self.pending.lock().unwrap().remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(McpError::Closed),
            Err(_) => {
                self.pending.lock().unwrap().remove(&id);
                Err(McpError::Timeout)
            }
        }
    }

    async fn notify(&self, method: &str, params: Value) -> Result<(), McpError> {
        let line = serde_json::to_string(&json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
        }))
        .expect("notification serializes");
        self.write_line(&line).await
    }

    async fn write_line(&self, line: &str) -> Result<(), McpError> {
        let mut stdin = self.stdin.lock().await;
        stdin.write_all(line.as_bytes()).await.map_err(|_| McpError::Closed)?;
        stdin.write_all(b"\n").await.map_err(|_| McpError::Closed)?;
        stdin.flush().await.map_err(|_| McpError::Closed)
    }

    /// Kill the server process and stop the reader task.  Idempotent.
    pub async fn shutdown(&self) {
        self.reader.abort();
        let mut child = self.child.lock().await;
        let _ = child.start_kill();
        let _ = child.wait().await;
        // Fail any requests still waiting for a reply.
        self.pending.lock().unwrap().clear();
    }
}

/// Background stdout reader: routes responses to waiters, answers trivial
/// server requests, drops everything else.
async fn read_loop(stdout: tokio::process::ChildStdout, pending: Pending) {
    let mut lines = BufReader::new(stdout).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let msg: Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "ignoring malformed MCP message");
                continue;
            }
        };
        let id = msg.get("id").and_then(|v| v.as_u64());
        let method = msg.get("method").and_then(|v| v.as_str());
        match (id, method) {
            // Response to one of our requests.
            (Some(id), None) => {
                let Some(tx) = pending.lock().unwrap().remove(&id) else {
                    continue;
                };
                let outcome = if let Some(err) = msg.get("error") {
                    Err(McpError::Rpc {
                        code: err.get("code").and_then(|c| c.as_i64()).unwrap_or(0),
                        message: err
                            .get("message")
                            .and_then(|m| m.as_str())
                            .unwrap_or("unknown")
                            .to_string(),
                    })
                } else {
                    Ok(msg.get("result").cloned().unwrap_or(Value::Null))
                };
                let _ = tx.send(outcome);
            }
            // Server-initiated request; nothing to answer with here, and
            // responding would require the stdin handle.  The servers we
            // target only send notifications after initialize.
            (Some(_), Some(m)) => {
                debug!(method = m, "ignoring server-initiated MCP request");
            }
            // Notification.
            _ => {}
        }
    }
    // Stream ended: the server is gone; fail all waiters.
    pending.lock().unwrap().clear();
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
