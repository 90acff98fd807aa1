// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use wave_model::ToolSchema;

use crate::tool::{ToolContext, ToolPlugin, ToolResult};

/// A source of tools whose set can change at runtime (MCP servers connect
/// and disconnect).  The registry re-queries it on every schema listing and
/// routes execution to it for names it owns.
#[async_trait]
pub trait DynamicToolSource: Send + Sync {
    async fn schemas(&self) -> Vec<ToolSchema>;
    async fn owns(&self, name: &str) -> bool;
    async fn execute(&self, name: &str, args: Value, ctx: &ToolContext) -> ToolResult;
}

/// Central registry holding all available tools.
///
/// Built-ins are registered once at construction; the dynamic source is
/// attached later (the MCP manager is created after the registry) and is
/// consulted fresh on every listing and dispatch.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn ToolPlugin>>,
    dynamic: Mutex<Option<Arc<dyn DynamicToolSource>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            dynamic: Mutex::new(None),
        }
    }

    /// Registry pre-populated with the built-in tool set.
    pub fn with_builtins(shell_timeout_secs: u64) -> Self {
        let mut reg = Self::new();
        reg.register(crate::builtin::ReadFileTool);
        reg.register(crate::builtin::WriteFileTool);
        reg.register(crate::builtin::EditFileTool);
        reg.register(crate::builtin::MultiEditTool);
        reg.register(crate::builtin::DeleteFileTool);
        reg.register(crate::builtin::ListDirTool);
        reg.register(crate::builtin::GlobTool);
        reg.register(crate::builtin::GrepTool);
        reg.register(crate::builtin::BashTool {
            timeout_secs: shell_timeout_secs,
        });
        reg
    }

    pub fn register(&mut self, tool: impl ToolPlugin + 'static) {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    pub fn set_dynamic_source(&self, source: Arc<dyn DynamicToolSource>) {
        *self.dynamic.lock().unwrap() = Some(source);
    }

    fn dynamic(&self) -> Option<Arc<dyn DynamicToolSource>> {
        self.dynamic.lock().unwrap().clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolPlugin>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Schemas for every currently-available tool: built-ins sorted by name,
    /// followed by whatever the dynamic source exposes right now.
    pub async fn get_tools_config(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self
            .tools
            .values()
            .map(|t| ToolSchema {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        if let Some(dynamic) = self.dynamic() {
            schemas.extend(dynamic.schemas().await);
        }
        schemas
    }

    /// Compact argument rendering for a named tool; `None` when the tool is
    /// unknown or declines.
    pub fn format_compact_args(&self, name: &str, args: &Value) -> Option<String> {
        self.tools.get(name).and_then(|t| t.format_compact_args(args))
    }

    /// Dispatch a tool call.  Never panics and never returns an error via
    /// `Result` — every failure becomes a `ToolResult { success: false }`.
    pub async fn execute(&self, name: &str, args: Value, ctx: &ToolContext) -> ToolResult {
        if let Some(dynamic) = self.dynamic() {
            if dynamic.owns(name).await {
                return dynamic.execute(name, args, ctx).await;
            }
        }
        match self.tools.get(name) {
            Some(tool) => tool.execute(args, ctx).await,
            None => ToolResult::error(format!("Tool '{name}' not found")),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
