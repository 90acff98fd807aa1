// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Tool runtime of the Wave agent core: the [`ToolPlugin`] trait, the
//! [`ToolRegistry`] that merges built-in and dynamically-provided (MCP)
//! tools, and the built-in file/search/shell tool set.

pub mod builtin;
pub mod registry;
pub mod tool;

pub use builtin::{
    BashTool, DeleteFileTool, EditFileTool, GlobTool, GrepTool, ListDirTool, MultiEditTool,
    ReadFileTool, WriteFileTool,
};
pub use registry::{DynamicToolSource, ToolRegistry};
pub use tool::{compute_hunks, DiffHunk, FileDiff, ToolContext, ToolPlugin, ToolResult};
