// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Session snapshot persistence.
//!
//! One JSON file per session, `session_<first-8-chars-of-id>.json`, written
//! atomically (temp + rename).  Unknown fields in an existing file are
//! preserved across load/save so newer writers can extend the schema.

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::message::MessageRecord;

/// Sessions with no activity for this many days are removed by
/// [`SessionStore::cleanup_expired`].
pub const SESSION_EXPIRE_DAYS: i64 = 30;

/// Schema version written into every snapshot.
pub const SESSION_FILE_VERSION: &str = "1";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionState {
    pub messages: Vec<MessageRecord>,
    #[serde(default, rename = "inputHistory")]
    pub input_history: Vec<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub workdir: String,
    #[serde(rename = "startedAt")]
    pub started_at: DateTime<Utc>,
    #[serde(rename = "lastActiveAt")]
    pub last_active_at: DateTime<Utc>,
    #[serde(rename = "latestTotalTokens")]
    pub latest_total_tokens: u64,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// On-disk layout of one session snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionFile {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub state: SessionState,
    pub metadata: SessionMetadata,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Reads and writes session snapshots in one directory.
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
    expire_days: i64,
}

impl SessionStore {
    /// Open (creating if needed) the session directory.  `None` resolves to
    /// `<home>/.wave/sessions`.  Relative paths are made absolute once.
    pub fn new(dir: Option<PathBuf>) -> anyhow::Result<Self> {
        let dir = match dir {
            Some(d) => d,
            None => dirs::home_dir()
                .context("cannot determine home directory")?
                .join(".wave")
                .join("sessions"),
        };
        let dir = if dir.is_absolute() {
            dir
        } else {
            std::env::current_dir()
                .context("cannot resolve current directory")?
                .join(dir)
        };
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating session dir {}", dir.display()))?;
        Ok(Self {
            dir,
            expire_days: SESSION_EXPIRE_DAYS,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> PathBuf {
        let short: String = id.chars().take(8).collect();
        self.dir.join(format!("session_{short}.json"))
    }

    /// Atomic snapshot write: serialize to a sibling temp file, then rename
    /// over the target.
    pub fn save(&self, file: &SessionFile) -> anyhow::Result<()> {
        let target = self.path_for(&file.id);
        let tmp = target.with_extension("json.tmp");
        let body = serde_json::to_string_pretty(file).context("serializing session")?;
        std::fs::write(&tmp, body)
            .with_context(|| format!("writing {}", tmp.display()))?;
        std::fs::rename(&tmp, &target)
            .with_context(|| format!("renaming into {}", target.display()))?;
        debug!(path = %target.display(), "session snapshot written");
        Ok(())
    }

    pub fn load(&self, id: &str) -> anyhow::Result<SessionFile> {
        let path = self.path_for(id);
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("session '{id}' not found at {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    /// All parseable sessions in the directory.  Corrupt files are skipped
    /// with a warning.
    pub fn list(&self) -> anyhow::Result<Vec<SessionFile>> {
        let mut sessions = Vec::new();
        for entry in std::fs::read_dir(&self.dir)
            .with_context(|| format!("listing {}", self.dir.display()))?
        {
            let path = entry?.path();
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if !name.starts_with("session_") || !name.ends_with(".json") {
                continue;
            }
            match std::fs::read_to_string(&path)
                .map_err(anyhow::Error::from)
                .and_then(|t| serde_json::from_str::<SessionFile>(&t).map_err(Into::into))
            {
                Ok(file) => sessions.push(file),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable session"),
            }
        }
        Ok(sessions)
    }

    /// The most recently active session whose recorded workdir matches.
    pub fn latest(&self, workdir: &Path) -> anyhow::Result<Option<SessionFile>> {
        let workdir = workdir.to_string_lossy();
        let mut sessions: Vec<SessionFile> = self
            .list()?
            .into_iter()
            .filter(|s| s.metadata.workdir == workdir)
            .collect();
        sessions.sort_by_key(|s| s.metadata.last_active_at);
        Ok(sessions.pop())
    }

    pub fn delete(&self, id: &str) -> anyhow::Result<()> {
        let path = self.path_for(id);
        std::fs::remove_file(&path).with_context(|| format!("deleting {}", path.display()))
    }

    /// Remove sessions idle for longer than the expiration window.
    /// Returns the number of files removed.
    pub fn cleanup_expired(&self) -> anyhow::Result<usize> {
        let cutoff = Utc::now() - Duration::days(self.expire_days);
        let mut removed = 0;
        for session in self.list()? {
            if session.metadata.last_active_at < cutoff {
                if self.delete(&session.id).is_ok() {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
