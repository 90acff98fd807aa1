// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Core configuration for the Wave agent.
//!
//! The core never reads the environment itself; [`CoreConfig::from_env`] is
//! the thin outer layer hosts call when they want env-var overrides.  All
//! defaults are compile-time constants so embedded uses (tests, servers)
//! get deterministic behavior from `CoreConfig::new(workdir)`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Token total above which history compression is triggered.
pub const DEFAULT_TOKEN_LIMIT: u64 = 100_000;
/// Minimum wall-clock seconds between two session snapshot writes.
pub const DEFAULT_SNAPSHOT_THROTTLE_SECS: u64 = 30;
/// Number of oldest messages summarized per compression pass.
pub const DEFAULT_COMPRESSION_WINDOW: usize = 7;
/// Maximum retained user-input history entries.
pub const DEFAULT_INPUT_HISTORY_CAP: usize = 100;
/// Exit code reported when a shell command dies from a signal.
pub const DEFAULT_SHELL_SIGNAL_EXIT_CODE: i32 = 130;
/// Safety cap on model→tool→model rounds within one user turn.
pub const DEFAULT_MAX_TOOL_ROUNDS: u32 = 64;
/// Default timeout for the model-driven bash tool.
pub const DEFAULT_SHELL_TIMEOUT_SECS: u64 = 120;

/// Recognized configuration of the agent core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Working directory for tools, the shell, and session matching.
    pub workdir: PathBuf,
    /// Session snapshot directory; `None` resolves to `<home>/.wave/sessions`.
    #[serde(default)]
    pub session_dir: Option<PathBuf>,
    #[serde(default = "default_token_limit")]
    pub token_limit: u64,
    #[serde(default = "default_snapshot_throttle_secs")]
    pub snapshot_throttle_secs: u64,
    #[serde(default = "default_compression_window")]
    pub compression_window: usize,
    #[serde(default = "default_input_history_cap")]
    pub input_history_cap: usize,
    #[serde(default = "default_shell_signal_exit_code")]
    pub shell_signal_exit_code: i32,
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: u32,
    #[serde(default = "default_shell_timeout_secs")]
    pub shell_timeout_secs: u64,
}

fn default_token_limit() -> u64 {
    DEFAULT_TOKEN_LIMIT
}
fn default_snapshot_throttle_secs() -> u64 {
    DEFAULT_SNAPSHOT_THROTTLE_SECS
}
fn default_compression_window() -> usize {
    DEFAULT_COMPRESSION_WINDOW
}
fn default_input_history_cap() -> usize {
    DEFAULT_INPUT_HISTORY_CAP
}
fn default_shell_signal_exit_code() -> i32 {
    DEFAULT_SHELL_SIGNAL_EXIT_CODE
}
fn default_max_tool_rounds() -> u32 {
    DEFAULT_MAX_TOOL_ROUNDS
}
fn default_shell_timeout_secs() -> u64 {
    DEFAULT_SHELL_TIMEOUT_SECS
}

impl CoreConfig {
    /// Configuration with all defaults for the given working directory.
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            session_dir: None,
            token_limit: DEFAULT_TOKEN_LIMIT,
            snapshot_throttle_secs: DEFAULT_SNAPSHOT_THROTTLE_SECS,
            compression_window: DEFAULT_COMPRESSION_WINDOW,
            input_history_cap: DEFAULT_INPUT_HISTORY_CAP,
            shell_signal_exit_code: DEFAULT_SHELL_SIGNAL_EXIT_CODE,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            shell_timeout_secs: DEFAULT_SHELL_TIMEOUT_SECS,
        }
    }

    /// Env-var override layer for hosts: `WAVE_TOKEN_LIMIT`,
    /// `WAVE_SNAPSHOT_THROTTLE_SECS`, `WAVE_SESSION_DIR`.  Unparseable
    /// values fall back to the defaults.
    pub fn from_env(workdir: impl Into<PathBuf>) -> Self {
        let mut cfg = Self::new(workdir);
        if let Some(v) = env_parse::<u64>("WAVE_TOKEN_LIMIT") {
            cfg.token_limit = v;
        }
        if let Some(v) = env_parse::<u64>("WAVE_SNAPSHOT_THROTTLE_SECS") {
            cfg.snapshot_throttle_secs = v;
        }
        if let Ok(dir) = std::env::var("WAVE_SESSION_DIR") {
            if !dir.is_empty() {
                cfg.session_dir = Some(PathBuf::from(dir));
            }
        }
        cfg
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
