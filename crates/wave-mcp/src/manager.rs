// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Per-server connection lifecycle and the dynamic tool source.
//!
//! Each configured server walks `disconnected → connecting → connected`;
//! failures land back in `disconnected` with `last_error` set.  Every
//! transition emits the full status list through the registered handler.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use wave_model::ToolSchema;
use wave_tools::{DynamicToolSource, ToolContext, ToolResult};

use crate::client::{McpConnection, McpToolInfo};
use crate::config::{load_config, McpServerDef};

/// Separator-free server/tool name mangling: `mcp__<server>__<tool>`.
const TOOL_PREFIX: &str = "mcp__";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum McpServerState {
    Disconnected,
    Connecting,
    Connected,
}

impl std::fmt::Display for McpServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        };
        f.write_str(s)
    }
}

/// Snapshot of one server for status events and the facade getters.
#[derive(Debug, Clone)]
pub struct McpServerStatus {
    pub name: String,
    pub status: McpServerState,
    pub last_error: Option<String>,
    pub tool_count: usize,
}

type StatusHandler = Arc<dyn Fn(Vec<McpServerStatus>) + Send + Sync>;

struct ServerEntry {
    def: McpServerDef,
    state: McpServerState,
    last_error: Option<String>,
    conn: Option<Arc<McpConnection>>,
    tools: Vec<McpToolInfo>,
}

impl ServerEntry {
    fn status(&self, name: &str) -> McpServerStatus {
        McpServerStatus {
            name: name.to_string(),
            status: self.state,
            last_error: self.last_error.clone(),
            tool_count: self.tools.len(),
        }
    }

    fn drop_connection(&mut self) -> Option<Arc<McpConnection>> {
        self.state = McpServerState::Disconnected;
        self.tools.clear();
        self.conn.take()
    }
}

/// Owns every MCP server connection for one session.
pub struct McpManager {
    servers: tokio::sync::Mutex<BTreeMap<String, ServerEntry>>,
    on_change: Mutex<Option<StatusHandler>>,
}

impl McpManager {
    pub fn new() -> Self {
        Self {
            servers: tokio::sync::Mutex::new(BTreeMap::new()),
            on_change: Mutex::new(None),
        }
    }

    pub fn set_status_handler(&self, handler: StatusHandler) {
        *self.on_change.lock().unwrap() = Some(handler);
    }

    /// Read server definitions for `workdir` and optionally connect each.
    ///
    /// Individual connection failures do not abort initialization: the
    /// failing server stays `disconnected` with `last_error` populated and
    /// the rest proceed.
    pub async fn initialize(&self, workdir: &Path, auto_connect: bool) {
        let config = load_config(workdir);
        {
            let mut servers = self.servers.lock().await;
            for (name, def) in config.mcp_servers {
                servers.insert(
                    name,
                    ServerEntry {
                        def,
                        state: McpServerState::Disconnected,
                        last_error: None,
                        conn: None,
                        tools: Vec::new(),
                    },
                );
            }
        }
        self.emit().await;

        if auto_connect {
            let names: Vec<String> = self.servers.lock().await.keys().cloned().collect();
            for name in names {
                if let Err(e) = self.connect(&name).await {
                    warn!(server = %name, error = %e, "MCP auto-connect failed");
                }
            }
        }
    }

    /// Connect one server.  Idempotent: an already-connected server is left
    /// alone (the change event still fires).
    pub async fn connect(&self, name: &str) -> anyhow::Result<()> {
        let def = {
            let mut servers = self.servers.lock().await;
            let entry = servers
                .get_mut(name)
                .ok_or_else(|| anyhow::anyhow!("unknown MCP server '{name}'"))?;
            if entry.state == McpServerState::Connected {
                drop(servers);
                self.emit().await;
                return Ok(());
            }
            entry.state = McpServerState::Connecting;
            entry.last_error = None;
            entry.def.clone()
        };
        self.emit().await;

        debug!(server = name, command = %def.command, "connecting MCP server");
        let outcome = McpConnection::connect(&def).await;

        let result = {
            let mut servers = self.servers.lock().await;
            // The entry cannot vanish: servers are only removed on rebuild.
            let entry = servers
                .get_mut(name)
                .ok_or_else(|| anyhow::anyhow!("unknown MCP server '{name}'"))?;
            match outcome {
                Ok((conn, tools)) => {
                    entry.state = McpServerState::Connected;
                    entry.conn = Some(Arc::new(conn));
                    entry.tools = tools;
                    Ok(())
                }
                Err(e) => {
                    entry.state = McpServerState::Disconnected;
                    entry.last_error = Some(e.to_string());
                    Err(anyhow::Error::new(e).context(format!("connect '{name}' failed")))
                }
            }
        };
        self.emit().await;
        result
    }

    /// Disconnect one server.  No-op (besides the event) when it is not
    /// connected.
    pub async fn disconnect(&self, name: &str) -> anyhow::Result<()> {
        let conn = {
            let mut servers = self.servers.lock().await;
            let entry = servers
                .get_mut(name)
                .ok_or_else(|| anyhow::anyhow!("unknown MCP server '{name}'"))?;
            entry.drop_connection()
        };
        if let Some(conn) = conn {
            conn.shutdown().await;
        }
        self.emit().await;
        Ok(())
    }

    pub async fn reconnect(&self, name: &str) -> anyhow::Result<()> {
        self.disconnect(name).await?;
        self.connect(name).await
    }

    /// Full status list, in server-name order.
    pub async fn statuses(&self) -> Vec<McpServerStatus> {
        self.servers
            .lock()
            .await
            .iter()
            .map(|(name, entry)| entry.status(name))
            .collect()
    }

    /// Disconnect everything and release all server processes.
    pub async fn cleanup(&self) {
        let conns: Vec<Arc<McpConnection>> = {
            let mut servers = self.servers.lock().await;
            servers
                .values_mut()
                .filter_map(ServerEntry::drop_connection)
                .collect()
        };
        for conn in conns {
            conn.shutdown().await;
        }
        self.emit().await;
    }

    async fn emit(&self) {
        let statuses = self.statuses().await;
        let handler = self.on_change.lock().unwrap().clone();
        if let Some(handler) = handler {
            handler(statuses);
        }
    }
}

impl Default for McpManager {
    fn default() -> Self {
        Self::new()
    }
}

/// `mcp__<server>__<tool>` → `(server, tool)`.
fn parse_tool_name(name: &str) -> Option<(&str, &str)> {
    name.strip_prefix(TOOL_PREFIX)?.split_once("__")
}

fn mangle_tool_name(server: &str, tool: &str) -> String {
    format!("{TOOL_PREFIX}{server}__{tool}")
}

#[async_trait]
impl DynamicToolSource for McpManager {
    async fn schemas(&self) -> Vec<ToolSchema> {
        self.servers
            .lock()
            .await
            .iter()
            .filter(|(_, e)| e.state == McpServerState::Connected)
            .flat_map(|(name, e)| {
                e.tools.iter().map(move |t| ToolSchema {
                    name: mangle_tool_name(name, &t.name),
                    description: t.description.clone(),
                    parameters: t.input_schema.clone(),
                })
            })
            .collect()
    }

    async fn owns(&self, name: &str) -> bool {
        let Some((server, _)) = parse_tool_name(name) else {
            return false;
        };
        self.servers
            .lock()
            .await
            .get(server)
            .map(|e| e.state == McpServerState::Connected)
            .unwrap_or(false)
    }

    async fn execute(&self, name: &str, args: Value, ctx: &ToolContext) -> ToolResult {
        let Some((server, tool)) = parse_tool_name(name) else {
            return ToolResult::error(format!("Tool '{name}' not found"));
        };
        let conn = {
            let servers = self.servers.lock().await;
            match servers.get(server).and_then(|e| e.conn.clone()) {
                Some(c) => c,
                None => {
                    return ToolResult::error(format!("MCP server '{server}' is not connected"))
                }
            }
        };
        match ctx.abort.observe(conn.call_tool(tool, args)).await {
            Err(_) => ToolResult::aborted(),
            Ok(Err(e)) => ToolResult::error(format!("MCP call failed: {e}")),
            Ok(Ok((text, true))) => ToolResult::error(if text.is_empty() {
                "MCP tool reported an error".to_string()
            } else {
                text
            }),
            Ok(Ok((text, false))) => ToolResult::ok(text),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn seed(manager: &McpManager, name: &str, command: &str) {
        let mut servers = manager.servers.try_lock().unwrap();
        servers.insert(
            name.to_string(),
            ServerEntry {
                def: McpServerDef {
                    command: command.to_string(),
                    args: vec![],
                },
                state: McpServerState::Disconnected,
                last_error: None,
                conn: None,
                tools: Vec::new(),
            },
        );
    }

    #[test]
    fn tool_name_mangling_round_trips() {
        let mangled = mangle_tool_name("files", "read");
        assert_eq!(mangled, "mcp__files__read");
        assert_eq!(parse_tool_name(&mangled), Some(("files", "read")));
    }

    #[test]
    fn parse_rejects_foreign_names() {
        assert_eq!(parse_tool_name("grep"), None);
        assert_eq!(parse_tool_name("mcp__broken"), None);
    }

    #[tokio::test]
    async fn connect_failure_sets_last_error_and_state() {
        let m = McpManager::new();
        seed(&m, "bad", "wave-no-such-mcp-server-xyz");
        let err = m.connect("bad").await.err().expect("must fail");
        assert!(err.to_string().contains("bad"));
        let statuses = m.statuses().await;
        assert_eq!(statuses[0].status, McpServerState::Disconnected);
        assert!(statuses[0].last_error.is_some());
    }

    #[tokio::test]
    async fn connect_unknown_server_is_an_error() {
        let m = McpManager::new();
        assert!(m.connect("ghost").await.is_err());
    }

    #[tokio::test]
    async fn transitions_emit_status_events() {
        let m = McpManager::new();
        seed(&m, "bad", "wave-no-such-mcp-server-xyz");
        let seen: Arc<Mutex<Vec<Vec<McpServerStatus>>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        m.set_status_handler(Arc::new(move |s| sink.lock().unwrap().push(s)));

        let _ = m.connect("bad").await;

        let events = seen.lock().unwrap();
        // connecting, then back to disconnected.
        assert!(events.len() >= 2);
        assert_eq!(events[0][0].status, McpServerState::Connecting);
        assert_eq!(
            events.last().unwrap()[0].status,
            McpServerState::Disconnected
        );
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let m = McpManager::new();
        seed(&m, "s", "true");
        assert!(m.disconnect("s").await.is_ok());
        assert!(m.disconnect("s").await.is_ok());
    }

    #[tokio::test]
    async fn initialize_reads_project_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(".mcp.json"),
            r#"{"mcpServers": {"alpha": {"command": "alpha-server"}}}"#,
        )
        .unwrap();
        let m = McpManager::new();
        m.initialize(dir.path(), false).await;
        let statuses = m.statuses().await;
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].name, "alpha");
        assert_eq!(statuses[0].status, McpServerState::Disconnected);
    }

    #[tokio::test]
    async fn dynamic_source_ignores_disconnected_servers() {
        let m = McpManager::new();
        seed(&m, "down", "true");
        assert!(!m.owns("mcp__down__tool").await);
        assert!(m.schemas().await.is_empty());
    }

    #[tokio::test]
    async fn execute_on_disconnected_server_fails_cleanly() {
        let m = McpManager::new();
        seed(&m, "down", "true");
        let ctx = ToolContext::new("/tmp");
        let out = m
            .execute("mcp__down__tool", serde_json::json!({}), &ctx)
            .await;
        assert!(!out.success);
        assert!(out.content.contains("not connected"));
    }
}
