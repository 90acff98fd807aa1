// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! The `!command` shell subsystem.
//!
//! One command is in flight at a time.  Output is streamed into the
//! message store as it arrives — merged stdout + stderr, in wall-clock
//! order — and the executed command is appended to a persistent history
//! file together with its working directory and exit code.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::events::{CoreEvent, EventBus};
use crate::store::MessageStore;

/// Exit code recorded when the shell process could not be spawned.
const SPAWN_FAILURE_EXIT_CODE: i32 = -1;

pub struct ShellManager {
    store: Arc<Mutex<MessageStore>>,
    workdir: PathBuf,
    /// Exit code reported when the process dies from a signal.
    signal_exit_code: i32,
    history_path: Option<PathBuf>,
    running: AtomicBool,
    pgid: Mutex<Option<i32>>,
    bus: EventBus,
}

impl ShellManager {
    pub fn new(
        store: Arc<Mutex<MessageStore>>,
        workdir: PathBuf,
        signal_exit_code: i32,
        bus: EventBus,
    ) -> Self {
        let history_path = dirs::home_dir().map(|h| h.join(".wave").join("bash_history"));
        Self {
            store,
            workdir,
            signal_exit_code,
            history_path,
            running: AtomicBool::new(false),
            pgid: Mutex::new(None),
            bus,
        }
    }

    /// Override the bash-history location (tests, embedded hosts).
    pub fn with_history_path(mut self, path: Option<PathBuf>) -> Self {
        self.history_path = path;
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run one `!command`: stream output into a CommandOutput block and
    /// record the command to the history file.  Refuses while a previous
    /// command is still in flight.
    pub async fn execute_command(&self, command: &str) -> anyhow::Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            anyhow::bail!("a shell command is already running");
        }

        debug!(cmd = command, "shell command starting");
        self.store
            .lock()
            .unwrap()
            .add_command_output_message(command);
        self.bus.emit(&CoreEvent::CommandRunningChange(true));

        let mut cmd = Command::new("bash");
        cmd.arg("-c").arg(command);
        cmd.current_dir(&self.workdir);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);
        // New session: the child owns its process group, so abort can kill
        // the whole group and the child cannot reach the host terminal.
        #[cfg(unix)]
        unsafe {
            cmd.pre_exec(|| {
                libc::setsid();
                Ok(())
            });
        }

        let mut child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "shell spawn failed");
                self.finish(command, SPAWN_FAILURE_EXIT_CODE);
                return Ok(());
            }
        };
        *self.pgid.lock().unwrap() = child.id().map(|pid| pid as i32);

        // Fan both pipes into one channel so chunks land in arrival order.
        let (tx, mut rx) = mpsc::channel::<Vec<u8>>(64);
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(pump(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(pump(stderr, tx.clone()));
        }
        drop(tx);

        while let Some(chunk) = rx.recv().await {
            let text = String::from_utf8_lossy(&chunk);
            self.store
                .lock()
                .unwrap()
                .update_command_output_message(command, &text);
        }

        let exit_code = match child.wait().await {
            // `code()` is None when a signal terminated the process.
            Ok(status) => status.code().unwrap_or(self.signal_exit_code),
            Err(e) => {
                warn!(error = %e, "shell wait failed");
                SPAWN_FAILURE_EXIT_CODE
            }
        };

        self.finish(command, exit_code);
        Ok(())
    }

    /// SIGKILL the whole process group.  No-op when nothing runs; the
    /// completion event still fires from the `execute_command` task once
    /// the process reaps.
    pub fn abort_command(&self) {
        let pgid = *self.pgid.lock().unwrap();
        if let Some(pgid) = pgid {
            debug!(pgid, "killing shell process group");
            #[cfg(unix)]
            unsafe {
                libc::killpg(pgid, libc::SIGKILL);
            }
        }
    }

    fn finish(&self, command: &str, exit_code: i32) {
        self.store
            .lock()
            .unwrap()
            .complete_command_message(command, exit_code);
        self.append_history(command, exit_code);
        *self.pgid.lock().unwrap() = None;
        self.running.store(false, Ordering::SeqCst);
        self.bus.emit(&CoreEvent::CommandRunningChange(false));
    }

    /// One JSON line per executed command; a single atomic append, no
    /// fsync.  Failures only cost the history entry.
    fn append_history(&self, command: &str, exit_code: i32) {
        let Some(path) = self.history_path.as_ref() else {
            return;
        };
        let entry = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "workdir": self.workdir.to_string_lossy(),
            "exit_code": exit_code,
            "command": command,
        });
        let line = format!("{entry}\n");
        let result = path
            .parent()
            .map(std::fs::create_dir_all)
            .transpose()
            .and_then(|_| {
                use std::io::Write;
                std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .and_then(|mut f| f.write_all(line.as_bytes()))
            });
        if let Err(e) = result {
            warn!(error = %e, path = %path.display(), "bash history append failed");
        }
    }
}

/// Forward a child pipe into the merge channel, chunk by chunk.
async fn pump(mut reader: impl AsyncReadExt + Unpin, tx: mpsc::Sender<Vec<u8>>) {
    let mut buf = [0u8; 4096];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if tx.send(buf[..n].to_vec()).await.is_err() {
                    break;
                }
            }
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::events::EventBus;
    use crate::message::Block;

    fn manager() -> (tempfile::TempDir, Arc<ShellManager>, Arc<Mutex<MessageStore>>) {
        let dir = tempfile::tempdir().unwrap();
        let bus = EventBus::new();
        let store = Arc::new(Mutex::new(MessageStore::new(
            dir.path().to_path_buf(),
            100,
            bus.clone(),
        )));
        let shell = ShellManager::new(Arc::clone(&store), dir.path().to_path_buf(), 130, bus)
            .with_history_path(Some(dir.path().join("bash_history")));
        (dir, Arc::new(shell), store)
    }

    fn command_block(store: &Arc<Mutex<MessageStore>>) -> Block {
        store.lock().unwrap().messages()[0].blocks[0].clone()
    }

    #[tokio::test]
    async fn streams_output_and_exit_code_zero() {
        let (_dir, shell, store) = manager();
        shell.execute_command("echo done").await.unwrap();
        match command_block(&store) {
            Block::CommandOutput {
                output,
                is_running,
                exit_code,
                ..
            } => {
                assert!(output.contains("done"));
                assert!(!is_running);
                assert_eq!(exit_code, Some(0));
            }
            other => panic!("unexpected block {other:?}"),
        }
        assert!(!shell.is_running());
    }

    #[tokio::test]
    async fn stderr_is_merged_into_output() {
        let (_dir, shell, store) = manager();
        shell.execute_command("echo oops >&2").await.unwrap();
        match command_block(&store) {
            Block::CommandOutput { output, .. } => assert!(output.contains("oops")),
            other => panic!("unexpected block {other:?}"),
        }
    }

    #[tokio::test]
    async fn nonzero_exit_code_is_recorded() {
        let (_dir, shell, store) = manager();
        shell.execute_command("exit 3").await.unwrap();
        match command_block(&store) {
            Block::CommandOutput { exit_code, .. } => assert_eq!(exit_code, Some(3)),
            other => panic!("unexpected block {other:?}"),
        }
    }

    #[tokio::test]
    async fn refuses_concurrent_commands() {
        let (_dir, shell, _store) = manager();
        let bg = Arc::clone(&shell);
        let task = tokio::spawn(async move { bg.execute_command("sleep 5").await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        let err = shell.execute_command("echo nope").await.unwrap_err();
        assert!(err.to_string().contains("already running"));
        shell.abort_command();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn abort_kills_and_reports_signal_exit_code() {
        let (_dir, shell, store) = manager();
        let bg = Arc::clone(&shell);
        let task = tokio::spawn(async move { bg.execute_command("sleep 60").await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        shell.abort_command();
        task.await.unwrap().unwrap();
        match command_block(&store) {
            Block::CommandOutput {
                is_running,
                exit_code,
                ..
            } => {
                assert!(!is_running);
                assert_eq!(exit_code, Some(130));
            }
            other => panic!("unexpected block {other:?}"),
        }
        assert!(!shell.is_running());
    }

    #[tokio::test]
    async fn abort_without_running_command_is_noop() {
        let (_dir, shell, _store) = manager();
        shell.abort_command();
        assert!(!shell.is_running());
    }

    #[tokio::test]
    async fn command_is_appended_to_history_file() {
        let (dir, shell, _store) = manager();
        shell.execute_command("echo hist").await.unwrap();
        let history = std::fs::read_to_string(dir.path().join("bash_history")).unwrap();
        let entry: serde_json::Value = serde_json::from_str(history.lines().next().unwrap()).unwrap();
        assert_eq!(entry["command"], "echo hist");
        assert_eq!(entry["exit_code"], 0);
        assert!(entry["workdir"].as_str().is_some());
    }

    #[tokio::test]
    async fn chunks_preserve_order() {
        let (_dir, shell, store) = manager();
        shell
            .execute_command("printf 'one\\n'; sleep 0.05; printf 'two\\n'; sleep 0.05; printf 'three\\n'")
            .await
            .unwrap();
        match command_block(&store) {
            Block::CommandOutput { output, .. } => {
                let one = output.find("one").unwrap();
                let two = output.find("two").unwrap();
                let three = output.find("three").unwrap();
                assert!(one < two && two < three);
            }
            other => panic!("unexpected block {other:?}"),
        }
    }
}
