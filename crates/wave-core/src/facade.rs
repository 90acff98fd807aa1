// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! The single public surface of the core.
//!
//! [`Agent`] owns every subsystem — store, session persistence, tool
//! registry, MCP manager, shell manager, agent loop — and wires them
//! together at construction.  Components never hold back-references; all
//! coordination flows through this owner.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use tracing::warn;

use wave_config::CoreConfig;
use wave_mcp::{McpManager, McpServerStatus};
use wave_model::ChatProvider;
use wave_tools::{DynamicToolSource, ToolRegistry};

use crate::agent::AgentLoop;
use crate::events::{CoreEvent, CoreEventHandler, EventBus};
use crate::message::{MemoryKind, MessageRecord};
use crate::session_store::SessionStore;
use crate::shell::ShellManager;
use crate::store::MessageStore;

/// Construction options for [`Agent`].
pub struct AgentOptions {
    pub config: CoreConfig,
    pub provider: Arc<dyn ChatProvider>,
    /// Single fan-out handler for every core event.
    pub on_event: Option<CoreEventHandler>,
    /// Restore this exact session or fail construction.
    pub restore_session_id: Option<String>,
    /// Resume the most recent session recorded for this workdir, falling
    /// back to a fresh one.
    pub continue_last: bool,
    /// Pre-seeded conversation (replaces any restored messages).
    pub seed_messages: Option<Vec<MessageRecord>>,
    /// Concatenated memory string forwarded with every model call.
    pub memory: Option<String>,
    /// Auto-connect configured MCP servers during construction.
    pub connect_mcp: bool,
}

impl AgentOptions {
    pub fn new(config: CoreConfig, provider: Arc<dyn ChatProvider>) -> Self {
        Self {
            config,
            provider,
            on_event: None,
            restore_session_id: None,
            continue_last: false,
            seed_messages: None,
            memory: None,
            connect_mcp: true,
        }
    }
}

/// The agent facade: construct, send user input, abort, save memory,
/// manage MCP servers, destroy.
pub struct Agent {
    config: Arc<CoreConfig>,
    store: Arc<Mutex<MessageStore>>,
    tools: Arc<ToolRegistry>,
    mcp: Arc<McpManager>,
    shell: Arc<ShellManager>,
    agent_loop: Arc<AgentLoop>,
    memory: Mutex<Option<String>>,
}

impl Agent {
    pub async fn new(opts: AgentOptions) -> anyhow::Result<Self> {
        let config = Arc::new(opts.config);
        let bus = EventBus::new();
        if let Some(handler) = opts.on_event {
            bus.subscribe(handler);
        }

        let session_store = SessionStore::new(config.session_dir.clone())?;

        let mut store = MessageStore::new(
            config.workdir.clone(),
            config.input_history_cap,
            bus.clone(),
        );

        // Restore is load-or-fail; continue-last degrades to a fresh session.
        if let Some(id) = &opts.restore_session_id {
            let file = session_store
                .load(id)
                .with_context(|| format!("restoring session '{id}'"))?;
            store.restore_from(file);
        } else if opts.continue_last {
            match session_store.latest(&config.workdir) {
                Ok(Some(file)) => store.restore_from(file),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "continue-last lookup failed; starting fresh"),
            }
        }
        if let Some(seed) = opts.seed_messages {
            store.set_messages(seed);
        }
        // Attach after restore/seed so the initial state replay does not
        // burn the first throttle window on a half-populated snapshot.
        store.attach_session_store(
            session_store.clone(),
            Duration::from_secs(config.snapshot_throttle_secs),
        );
        let store = Arc::new(Mutex::new(store));

        let tools = Arc::new(ToolRegistry::with_builtins(config.shell_timeout_secs));

        let mcp = Arc::new(McpManager::new());
        {
            let bus = bus.clone();
            mcp.set_status_handler(Arc::new(move |statuses| {
                bus.emit(&CoreEvent::McpServersChanged(statuses));
            }));
        }
        mcp.initialize(&config.workdir, opts.connect_mcp).await;
        tools.set_dynamic_source(Arc::clone(&mcp) as Arc<dyn DynamicToolSource>);

        // Keep the bash history next to a custom session dir so embedded
        // hosts (and tests) stay self-contained; default installs share
        // <home>/.wave/bash_history.
        let history_path = match &config.session_dir {
            Some(dir) => Some(dir.join("bash_history")),
            None => dirs::home_dir().map(|h| h.join(".wave").join("bash_history")),
        };
        let shell = Arc::new(
            ShellManager::new(
                Arc::clone(&store),
                config.workdir.clone(),
                config.shell_signal_exit_code,
                bus.clone(),
            )
            .with_history_path(history_path),
        );

        let agent_loop = Arc::new(AgentLoop::new(
            Arc::clone(&store),
            Arc::clone(&tools),
            Arc::clone(&opts.provider),
            Arc::clone(&config),
            bus,
        ));

        Ok(Self {
            config,
            store,
            tools,
            mcp,
            shell,
            agent_loop,
            memory: Mutex::new(opts.memory),
        })
    }

    // ── Read surface ──────────────────────────────────────────────────────────

    pub fn session_id(&self) -> String {
        self.store.lock().unwrap().session_id().to_string()
    }

    pub fn messages(&self) -> Vec<MessageRecord> {
        self.store.lock().unwrap().messages_cloned()
    }

    pub fn latest_total_tokens(&self) -> u64 {
        self.store.lock().unwrap().latest_total_tokens()
    }

    pub fn user_input_history(&self) -> Vec<String> {
        self.store.lock().unwrap().input_history().to_vec()
    }

    pub fn is_command_running(&self) -> bool {
        self.shell.is_running()
    }

    pub fn is_loading(&self) -> bool {
        self.agent_loop.is_loading()
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// Replace the memory string forwarded with future model calls.
    pub fn set_memory(&self, memory: Option<String>) {
        *self.memory.lock().unwrap() = memory;
    }

    // ── Input ─────────────────────────────────────────────────────────────────

    /// Route one piece of user input.
    ///
    /// - empty input with no images: no state change;
    /// - a single line starting with `#`: memory capture request — nothing
    ///   is appended; the host follows up with [`save_memory`];
    /// - a single line starting with `!`: shell command, recorded in input
    ///   history and streamed as command output;
    /// - anything else: appended as a user message, then the agent loop runs.
    ///
    /// [`save_memory`]: Agent::save_memory
    pub async fn send_message(&self, content: &str, images: Vec<String>) {
        if content.trim().is_empty() && images.is_empty() {
            return;
        }
        let single_line = !content.contains('\n');
        if single_line && content.starts_with('#') {
            return;
        }
        if single_line && content.starts_with('!') {
            self.store.lock().unwrap().add_to_input_history(content);
            if let Err(e) = self.shell.execute_command(&content[1..]).await {
                self.store.lock().unwrap().append_error_block(&e.to_string());
            }
            return;
        }

        {
            let mut store = self.store.lock().unwrap();
            if !content.is_empty() {
                store.add_to_input_history(content);
            }
            store.append_user_message(content, images);
        }
        let memory = self.memory.lock().unwrap().clone();
        self.agent_loop.run(memory).await;
    }

    /// Persist a captured memory note and record a Memory block on the most
    /// recent assistant message.
    pub async fn save_memory(&self, content: &str, kind: MemoryKind) -> anyhow::Result<()> {
        let path = match kind {
            MemoryKind::Project => self.config.workdir.join("WAVE.md"),
            MemoryKind::User => dirs::home_dir()
                .context("cannot determine home directory")?
                .join(".wave")
                .join("WAVE.md"),
        };
        let written = append_memory_line(&path, content);
        if let Err(e) = &written {
            warn!(error = %e, path = %path.display(), "memory write failed");
        }
        self.store.lock().unwrap().append_memory_block(
            content,
            written.is_ok(),
            kind,
            path,
        );
        Ok(())
    }

    // ── Abort ─────────────────────────────────────────────────────────────────

    /// Cancel everything: the model call, tool executions, and any running
    /// shell command.  Safe and idempotent at any time.
    pub fn abort_message(&self) {
        self.agent_loop.abort();
        self.shell.abort_command();
    }

    /// Cancel only the AI side (model call + tools).
    pub fn abort_ai_message(&self) {
        self.agent_loop.abort();
    }

    /// Cancel only the running `!command`.
    pub fn abort_bash_command(&self) {
        self.shell.abort_command();
    }

    pub fn clear_messages(&self) {
        self.store.lock().unwrap().clear();
    }

    // ── MCP management ────────────────────────────────────────────────────────

    pub async fn mcp_servers(&self) -> Vec<McpServerStatus> {
        self.mcp.statuses().await
    }

    pub async fn connect_mcp_server(&self, name: &str) -> anyhow::Result<()> {
        self.mcp.connect(name).await
    }

    pub async fn disconnect_mcp_server(&self, name: &str) -> anyhow::Result<()> {
        self.mcp.disconnect(name).await
    }

    pub async fn reconnect_mcp_server(&self, name: &str) -> anyhow::Result<()> {
        self.mcp.reconnect(name).await
    }

    // ── Teardown ──────────────────────────────────────────────────────────────

    /// Abort all in-flight work, tear down MCP connections (bounded wait),
    /// and flush one final session snapshot.  Only these cleanup errors
    /// propagate to the caller.
    pub async fn destroy(&self) -> anyhow::Result<()> {
        self.abort_message();
        if tokio::time::timeout(Duration::from_secs(5), self.mcp.cleanup())
            .await
            .is_err()
        {
            warn!("MCP cleanup timed out");
        }
        self.store.lock().unwrap().flush_snapshot()
    }
}

fn append_memory_line(path: &PathBuf, content: &str) -> anyhow::Result<()> {
    use std::io::Write;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening {}", path.display()))?;
    writeln!(file, "- {content}").with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
