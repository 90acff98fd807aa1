// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Authoritative in-memory conversation state.
//!
//! Every mutator applies its change, emits exactly one typed event, and
//! schedules a throttled session snapshot.  Mutators never fail; the only
//! fallible side effect (the snapshot write) is logged and swallowed.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use wave_tools::FileDiff;

use crate::events::{CoreEvent, EventBus, MsgStoreEvent};
use crate::message::{Block, MemoryKind, MessageRecord, Role, ToolBlockPatch};
use crate::session_store::{
    SessionFile, SessionMetadata, SessionState, SessionStore, SESSION_FILE_VERSION,
};

struct SnapshotSink {
    store: SessionStore,
    throttle: Duration,
    last_save: Option<Instant>,
    writes: u64,
}

/// The append-and-mutate-in-place structured conversation log.
pub struct MessageStore {
    session_id: String,
    started_at: DateTime<Utc>,
    workdir: PathBuf,
    messages: Vec<MessageRecord>,
    input_history: Vec<String>,
    input_history_cap: usize,
    latest_total_tokens: u64,
    bus: EventBus,
    snapshot: Option<SnapshotSink>,
}

impl MessageStore {
    pub fn new(workdir: PathBuf, input_history_cap: usize, bus: EventBus) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            workdir,
            messages: Vec::new(),
            input_history: Vec::new(),
            input_history_cap,
            latest_total_tokens: 0,
            bus,
            snapshot: None,
        }
    }

    /// Attach the snapshot sink.  From now on every mutator schedules a
    /// throttled save.
    pub fn attach_session_store(&mut self, store: SessionStore, throttle: Duration) {
        self.snapshot = Some(SnapshotSink {
            store,
            throttle,
            last_save: None,
            writes: 0,
        });
    }

    // ── Read surface ──────────────────────────────────────────────────────────

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn messages(&self) -> &[MessageRecord] {
        &self.messages
    }

    pub fn messages_cloned(&self) -> Vec<MessageRecord> {
        self.messages.clone()
    }

    pub fn latest_total_tokens(&self) -> u64 {
        self.latest_total_tokens
    }

    pub fn input_history(&self) -> &[String] {
        &self.input_history
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Number of snapshot files written so far (diagnostics).
    pub fn snapshots_written(&self) -> u64 {
        self.snapshot.as_ref().map(|s| s.writes).unwrap_or(0)
    }

    // ── Mutators ──────────────────────────────────────────────────────────────

    pub fn append_user_message(&mut self, content: &str, images: Vec<String>) {
        let message = MessageRecord::user_with_images(content, images);
        self.messages.push(message.clone());
        self.emit(MsgStoreEvent::UserMessageAdded { message });
    }

    pub fn append_assistant_message(&mut self) {
        self.messages.push(MessageRecord::assistant());
        self.emit(MsgStoreEvent::AssistantMessageAdded);
    }

    pub fn append_answer_block(&mut self) {
        self.last_assistant_mut()
            .blocks
            .push(Block::Answer { content: String::new() });
        self.emit(MsgStoreEvent::AnswerBlockAdded);
    }

    /// Overwrite the content of the active (last) Answer block of the most
    /// recent assistant message.  No-op when there is none.
    pub fn update_answer_block(&mut self, content: &str) {
        let updated = self
            .messages
            .iter_mut()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .and_then(|m| {
                m.blocks.iter_mut().rev().find_map(|b| match b {
                    Block::Answer { content: c } => {
                        *c = content.to_string();
                        Some(())
                    }
                    _ => None,
                })
            });
        if updated.is_some() {
            self.emit(MsgStoreEvent::AnswerBlockUpdated {
                content: content.to_string(),
            });
        }
    }

    /// Append a Tool block in the running state to the latest assistant
    /// message.
    pub fn append_tool_block(&mut self, id: &str, name: &str) {
        self.last_assistant_mut().blocks.push(Block::Tool {
            id: id.to_string(),
            name: name.to_string(),
            args: String::new(),
            compact_args: None,
            is_running: true,
            success: None,
            result: None,
            short_result: None,
            error: None,
        });
        self.emit(MsgStoreEvent::ToolBlockAdded {
            id: id.to_string(),
            name: name.to_string(),
        });
    }

    /// Patch the Tool block with the given id, wherever it lives.  Fails
    /// silently when the id is unknown.  A `false → true` transition of
    /// `is_running` is forbidden and dropped.
    pub fn update_tool_block(&mut self, id: &str, patch: ToolBlockPatch) {
        let mut found = false;
        for message in self.messages.iter_mut() {
            if let Some(Block::Tool {
                name,
                args,
                compact_args,
                is_running,
                success,
                result,
                short_result,
                error,
                ..
            }) = message.find_tool_block_mut(id)
            {
                found = true;
                if let Some(v) = &patch.name {
                    *name = v.clone();
                }
                if let Some(v) = &patch.args {
                    *args = v.clone();
                }
                if let Some(v) = &patch.compact_args {
                    *compact_args = Some(v.clone());
                }
                match patch.is_running {
                    Some(true) if !*is_running => {
                        warn!(tool_id = id, "ignoring forbidden isRunning false→true transition");
                    }
                    Some(v) => *is_running = v,
                    None => {}
                }
                if let Some(v) = patch.success {
                    *success = Some(v);
                }
                if let Some(v) = &patch.result {
                    *result = Some(v.clone());
                }
                if let Some(v) = &patch.short_result {
                    *short_result = Some(v.clone());
                }
                if let Some(v) = &patch.error {
                    *error = Some(v.clone());
                }
                break;
            }
        }
        if found {
            self.emit(MsgStoreEvent::ToolBlockUpdated {
                id: id.to_string(),
                patch,
            });
        }
    }

    pub fn append_diff_block(&mut self, diff: FileDiff) {
        let file_path = diff.file_path.clone();
        self.last_assistant_mut().blocks.push(Block::Diff {
            file_path: diff.file_path,
            original_content: diff.original_content,
            new_content: diff.new_content,
            hunks: diff.hunks,
        });
        self.emit(MsgStoreEvent::DiffBlockAdded { file_path });
    }

    pub fn append_error_block(&mut self, content: &str) {
        self.last_assistant_mut().blocks.push(Block::Error {
            content: content.to_string(),
        });
        self.emit(MsgStoreEvent::ErrorBlockAdded {
            content: content.to_string(),
        });
    }

    /// Insert a user-role message holding one Compress block at
    /// `insert_index`.  Never removes messages; suppression of the history
    /// before the block happens at API-build time.
    pub fn append_compress_block(&mut self, insert_index: usize, content: &str) {
        let index = insert_index.min(self.messages.len());
        self.messages.insert(index, MessageRecord::compress(content));
        self.emit(MsgStoreEvent::CompressBlockAdded { insert_index: index });
    }

    pub fn append_memory_block(
        &mut self,
        content: &str,
        success: bool,
        kind: MemoryKind,
        storage_path: PathBuf,
    ) {
        self.last_assistant_mut().blocks.push(Block::Memory {
            content: content.to_string(),
            success,
            kind,
            storage_path: storage_path.clone(),
        });
        self.emit(MsgStoreEvent::MemoryBlockAdded {
            success,
            storage_path,
        });
    }

    /// Start a streaming shell command: one assistant message with a
    /// running CommandOutput block.
    pub fn add_command_output_message(&mut self, command: &str) {
        self.messages.push(MessageRecord {
            role: Role::Assistant,
            blocks: vec![Block::CommandOutput {
                command: command.to_string(),
                output: String::new(),
                is_running: true,
                exit_code: None,
            }],
            images: Vec::new(),
        });
        self.emit(MsgStoreEvent::CommandOutputAdded {
            command: command.to_string(),
        });
    }

    /// Append a chunk to the running CommandOutput block for `command`.
    pub fn update_command_output_message(&mut self, command: &str, chunk: &str) {
        let mut snapshot = None;
        if let Some(Block::CommandOutput { output, .. }) = self.find_running_command(command) {
            output.push_str(chunk);
            snapshot = Some(output.clone());
        }
        if let Some(output) = snapshot {
            self.emit(MsgStoreEvent::CommandOutputUpdated {
                command: command.to_string(),
                output,
            });
        }
    }

    /// Seal the running CommandOutput block with its exit code.
    pub fn complete_command_message(&mut self, command: &str, code: i32) {
        let mut sealed = false;
        if let Some(Block::CommandOutput {
            is_running,
            exit_code,
            ..
        }) = self.find_running_command(command)
        {
            *is_running = false;
            *exit_code = Some(code);
            sealed = true;
        }
        if sealed {
            self.emit(MsgStoreEvent::CommandOutputCompleted {
                command: command.to_string(),
                exit_code: code,
            });
        }
    }

    pub fn set_messages(&mut self, messages: Vec<MessageRecord>) {
        self.messages = messages;
        self.emit(MsgStoreEvent::MessagesReplaced);
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.emit(MsgStoreEvent::MessagesReplaced);
    }

    /// Monotonically overwrite with the most recent model usage.
    pub fn set_latest_total_tokens(&mut self, tokens: u64) {
        self.latest_total_tokens = tokens;
        self.emit(MsgStoreEvent::LatestTotalTokensChanged { tokens });
    }

    /// Append to the input history, suppressing adjacent duplicates and
    /// trimming from the front to the configured cap.
    pub fn add_to_input_history(&mut self, input: &str) {
        if self.input_history.last().map(String::as_str) == Some(input) {
            return;
        }
        self.input_history.push(input.to_string());
        while self.input_history.len() > self.input_history_cap {
            self.input_history.remove(0);
        }
        self.emit(MsgStoreEvent::InputHistoryChanged {
            history: self.input_history.clone(),
        });
    }

    pub fn set_session_id(&mut self, id: &str) {
        self.session_id = id.to_string();
        self.emit(MsgStoreEvent::SessionIdChanged { id: id.to_string() });
    }

    /// Adopt the full state of a loaded snapshot (restore / continue-last).
    pub fn restore_from(&mut self, file: SessionFile) {
        self.started_at = file.metadata.started_at;
        self.set_session_id(&file.id);
        self.set_messages(file.state.messages);
        self.input_history = file.state.input_history;
        self.emit(MsgStoreEvent::InputHistoryChanged {
            history: self.input_history.clone(),
        });
        self.set_latest_total_tokens(file.metadata.latest_total_tokens);
    }

    // ── Snapshot plumbing ─────────────────────────────────────────────────────

    fn session_file(&self) -> SessionFile {
        let now = Utc::now();
        SessionFile {
            id: self.session_id.clone(),
            timestamp: now,
            version: SESSION_FILE_VERSION.to_string(),
            state: SessionState {
                messages: self.messages.clone(),
                input_history: self.input_history.clone(),
                extra: Default::default(),
            },
            metadata: SessionMetadata {
                workdir: self.workdir.to_string_lossy().into_owned(),
                started_at: self.started_at,
                last_active_at: now,
                latest_total_tokens: self.latest_total_tokens,
                extra: Default::default(),
            },
            extra: Default::default(),
        }
    }

    fn maybe_snapshot(&mut self) {
        let Some(sink) = self.snapshot.as_mut() else {
            return;
        };
        let due = sink
            .last_save
            .map(|t| t.elapsed() >= sink.throttle)
            .unwrap_or(true);
        if !due {
            return;
        }
        sink.last_save = Some(Instant::now());
        let file = self.session_file();
        let sink = self.snapshot.as_mut().expect("sink checked above");
        if let Err(e) = sink.store.save(&file) {
            warn!(error = %e, "session snapshot failed");
        } else {
            sink.writes += 1;
        }
    }

    /// Unthrottled final save, used by `destroy()`.
    pub fn flush_snapshot(&mut self) -> anyhow::Result<()> {
        let file = self.session_file();
        if let Some(sink) = self.snapshot.as_mut() {
            sink.store.save(&file)?;
            sink.writes += 1;
            sink.last_save = Some(Instant::now());
        }
        Ok(())
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    /// Last assistant message, created on demand so mutators never fail.
    fn last_assistant_mut(&mut self) -> &mut MessageRecord {
        let needs_new = !self
            .messages
            .iter()
            .rev()
            .any(|m| m.role == Role::Assistant);
        if needs_new {
            self.messages.push(MessageRecord::assistant());
        }
        self.messages
            .iter_mut()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .expect("assistant message exists")
    }

    fn find_running_command(&mut self, command: &str) -> Option<&mut Block> {
        self.messages.iter_mut().rev().find_map(|m| {
            m.blocks.iter_mut().find(|b| {
                matches!(
                    &**b,
                    Block::CommandOutput {
                        command: c,
                        is_running: true,
                        ..
                    } if c == command
                )
            })
        })
    }

    fn emit(&mut self, event: MsgStoreEvent) {
        self.bus.emit(&CoreEvent::Store(event));
        self.maybe_snapshot();
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
