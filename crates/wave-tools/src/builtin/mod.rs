// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod bash;
mod delete_file;
mod edit_file;
mod glob;
mod grep;
mod list_dir;
mod multi_edit;
mod read_file;
mod write_file;

pub use bash::BashTool;
pub use delete_file::DeleteFileTool;
pub use edit_file::EditFileTool;
pub use glob::GlobTool;
pub use grep::GrepTool;
pub use list_dir::ListDirTool;
pub use multi_edit::MultiEditTool;
pub use read_file::ReadFileTool;
pub use write_file::WriteFileTool;

use serde_json::Value;

/// Shared helper: extract a required string argument or produce the
/// standard missing-parameter error.
pub(crate) fn require_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, String> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| format!("missing required parameter '{key}'"))
}
