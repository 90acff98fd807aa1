// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Wave agent — the orchestration core of a terminal coding assistant.
//!
//! This crate re-exports the embeddable surface: construct an
//! [`Agent`] with a [`ChatProvider`], feed it user input, observe
//! [`CoreEvent`]s, and persist/restore sessions across restarts.
//!
//! ```no_run
//! use std::sync::Arc;
//! use wave_agent::{Agent, AgentOptions, CoreConfig, OpenAiProvider};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let provider = Arc::new(OpenAiProvider::from_env()?);
//! let agent = Agent::new(AgentOptions::new(
//!     CoreConfig::from_env(std::env::current_dir()?),
//!     provider,
//! ))
//! .await?;
//! agent.send_message("explain this repository", vec![]).await;
//! agent.destroy().await?;
//! # Ok(())
//! # }
//! ```

pub use wave_config::CoreConfig;
pub use wave_core::{
    Agent, AgentLoop, AgentOptions, Block, CoreEvent, CoreEventHandler, EventBus, MemoryKind,
    MessageRecord, MsgStoreEvent, Role, SessionFile, SessionStore, ShellManager, ToolBlockPatch,
};
pub use wave_mcp::{McpManager, McpServerState, McpServerStatus};
pub use wave_model::{
    ApiMessage, ApiToolCall, ApiUsage, CancelToken, ChatCompletion, ChatProvider, ChatRequest,
    MockProvider, OpenAiProvider, ScriptedProvider, ToolSchema,
};
pub use wave_tools::{ToolContext, ToolPlugin, ToolRegistry, ToolResult};
