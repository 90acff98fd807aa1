// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Minimal cancel-token abstraction.
//!
//! Exactly three operations: [`CancelToken::raise`], [`CancelToken::is_raised`]
//! and [`CancelToken::observe`].  Raising is sticky — a token never resets;
//! the agent loop installs fresh tokens instead.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// Returned by [`CancelToken::observe`] when the token was raised before the
/// observed operation completed.  Displays as `"aborted"` so string-level
/// abort classification keeps working on wrapped errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("aborted")]
pub struct CancelledError;

#[derive(Debug, Default)]
struct Inner {
    raised: AtomicBool,
    notify: Notify,
}

/// Cloneable cancellation handle.  All clones share the raised state.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<Inner>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the token.  Idempotent; wakes every pending [`observe`] /
    /// [`cancelled`] waiter.
    ///
    /// [`observe`]: CancelToken::observe
    /// [`cancelled`]: CancelToken::cancelled
    pub fn raise(&self) {
        self.0.raised.store(true, Ordering::SeqCst);
        self.0.notify.notify_waiters();
    }

    pub fn is_raised(&self) -> bool {
        self.0.raised.load(Ordering::SeqCst)
    }

    /// Resolve once the token is raised.  Returns immediately when it
    /// already is.
    pub async fn cancelled(&self) {
        loop {
            // Register interest before checking the flag so a raise between
            // the check and the await cannot be missed.
            let notified = self.0.notify.notified();
            if self.is_raised() {
                return;
            }
            notified.await;
        }
    }

    /// Run `fut` until completion or until this token is raised, whichever
    /// comes first.
    pub async fn observe<F: Future>(&self, fut: F) -> Result<F::Output, CancelledError> {
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(CancelledError),
            out = fut => Ok(out),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
