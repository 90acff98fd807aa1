// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

/// One configured MCP server: the command to spawn and its arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpServerDef {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Parsed `.mcp.json` contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct McpConfig {
    #[serde(default, rename = "mcpServers")]
    pub mcp_servers: BTreeMap<String, McpServerDef>,
}

/// User-level config path: `<home>/.wave/mcp.json`.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".wave").join("mcp.json"))
}

/// Load MCP server definitions for a project.
///
/// The user-level file is read first, then the project-local
/// `<workdir>/.mcp.json`; project definitions win on name conflicts.
/// Missing files are not errors; unparseable files are logged and skipped.
pub fn load_config(workdir: &Path) -> McpConfig {
    let mut merged = McpConfig::default();
    if let Some(user) = user_config_path() {
        merge(&mut merged, read_config(&user));
    }
    merge(&mut merged, read_config(&workdir.join(".mcp.json")));
    merged
}

fn merge(into: &mut McpConfig, layer: Option<McpConfig>) {
    if let Some(layer) = layer {
        for (name, def) in layer.mcp_servers {
            into.mcp_servers.insert(name, def);
        }
    }
}

fn read_config(path: &Path) -> Option<McpConfig> {
    let text = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&text) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring malformed MCP config");
            None
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let cfg: McpConfig = serde_json::from_str(
            r#"{"mcpServers": {"fs": {"command": "mcp-fs", "args": ["--root", "/tmp"]}}}"#,
        )
        .unwrap();
        let def = &cfg.mcp_servers["fs"];
        assert_eq!(def.command, "mcp-fs");
        assert_eq!(def.args, vec!["--root", "/tmp"]);
    }

    #[test]
    fn args_default_to_empty() {
        let cfg: McpConfig =
            serde_json::from_str(r#"{"mcpServers": {"x": {"command": "x-server"}}}"#).unwrap();
        assert!(cfg.mcp_servers["x"].args.is_empty());
    }

    #[test]
    fn empty_object_parses_to_no_servers() {
        let cfg: McpConfig = serde_json::from_str("{}").unwrap();
        assert!(cfg.mcp_servers.is_empty());
    }

    #[test]
    fn load_config_reads_project_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(".mcp.json"),
            r#"{"mcpServers": {"proj": {"command": "proj-server"}}}"#,
        )
        .unwrap();
        let cfg = load_config(dir.path());
        assert!(cfg.mcp_servers.contains_key("proj"));
    }

    #[test]
    fn load_config_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config(dir.path());
        assert!(cfg.mcp_servers.is_empty());
    }

    #[test]
    fn load_config_tolerates_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".mcp.json"), "not json at all").unwrap();
        let cfg = load_config(dir.path());
        assert!(cfg.mcp_servers.is_empty());
    }

    #[test]
    fn merge_project_wins_over_user() {
        let mut base = McpConfig::default();
        merge(
            &mut base,
            Some(serde_json::from_str(r#"{"mcpServers": {"s": {"command": "user"}}}"#).unwrap()),
        );
        merge(
            &mut base,
            Some(serde_json::from_str(r#"{"mcpServers": {"s": {"command": "project"}}}"#).unwrap()),
        );
        assert_eq!(base.mcp_servers["s"].command, "project");
    }
}
