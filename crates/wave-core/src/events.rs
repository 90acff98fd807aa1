// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! Change events emitted by the core.
//!
//! One [`MsgStoreEvent`] variant per store mutator; [`CoreEvent`] is the
//! facade-level sum adding loading/command/MCP status changes.  Handlers
//! are invoked synchronously in registration order and must not call back
//! into the store.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use wave_mcp::McpServerStatus;

use crate::message::{MessageRecord, ToolBlockPatch};

/// Typed change event for every message-store mutator.
#[derive(Debug, Clone)]
pub enum MsgStoreEvent {
    UserMessageAdded { message: MessageRecord },
    AssistantMessageAdded,
    AnswerBlockAdded,
    AnswerBlockUpdated { content: String },
    ToolBlockAdded { id: String, name: String },
    ToolBlockUpdated { id: String, patch: ToolBlockPatch },
    DiffBlockAdded { file_path: PathBuf },
    ErrorBlockAdded { content: String },
    CompressBlockAdded { insert_index: usize },
    MemoryBlockAdded { success: bool, storage_path: PathBuf },
    CommandOutputAdded { command: String },
    CommandOutputUpdated { command: String, output: String },
    CommandOutputCompleted { command: String, exit_code: i32 },
    SessionIdChanged { id: String },
    LatestTotalTokensChanged { tokens: u64 },
    InputHistoryChanged { history: Vec<String> },
    MessagesReplaced,
}

/// Everything a host can observe about a running agent.
#[derive(Debug, Clone)]
pub enum CoreEvent {
    Store(MsgStoreEvent),
    LoadingChange(bool),
    CommandRunningChange(bool),
    McpServersChanged(Vec<McpServerStatus>),
}

pub type CoreEventHandler = Arc<dyn Fn(&CoreEvent) + Send + Sync>;

/// Synchronous fan-out shared by every core component.
///
/// Cloning is cheap; all clones dispatch to the same handler list.
#[derive(Clone, Default)]
pub struct EventBus {
    handlers: Arc<Mutex<Vec<CoreEventHandler>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, handler: CoreEventHandler) {
        self.handlers.lock().unwrap().push(handler);
    }

    pub fn emit(&self, event: &CoreEvent) {
        // Handlers are cloned out so a handler subscribing another handler
        // does not deadlock the bus.
        let handlers: Vec<CoreEventHandler> = self.handlers.lock().unwrap().clone();
        for handler in handlers {
            handler(event);
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
