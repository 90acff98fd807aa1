// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! History-compression window selection.
//!
//! When the model's reported token total crosses the configured limit, the
//! oldest uncompressed window is summarized and a Compress block is
//! inserted after it.  Selection happens here; the summarizer call and the
//! insertion are driven by the agent loop.

use crate::message::{MessageRecord, Role};

/// The slice of history to summarize and where the resulting Compress
/// block must be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressionWindow {
    pub messages: Vec<MessageRecord>,
    pub insert_index: usize,
}

/// Select the oldest `window` messages that are not already behind a
/// Compress block.
///
/// The window starts at the most recent Compress message (whose summary is
/// folded into the new one) or at the beginning of history.  Returns `None`
/// only when fewer than `window` uncompressed messages exist — no full
/// window can be formed.
pub fn select_window(messages: &[MessageRecord], window: usize) -> Option<CompressionWindow> {
    if window == 0 {
        return None;
    }
    let start = messages
        .iter()
        .rposition(|m| m.role == Role::User && m.has_compress())
        .unwrap_or(0);
    let available = messages.len() - start;
    if available < window {
        return None;
    }
    let insert_index = start + window;
    Some(CompressionWindow {
        messages: messages[start..insert_index].to_vec(),
        insert_index,
    })
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageRecord;

    fn history(n: usize) -> Vec<MessageRecord> {
        (0..n).map(|i| MessageRecord::user(format!("m{i}"))).collect()
    }

    #[test]
    fn selects_first_k_messages_from_fresh_history() {
        let messages = history(10);
        let w = select_window(&messages, 7).unwrap();
        assert_eq!(w.insert_index, 7);
        assert_eq!(w.messages.len(), 7);
        assert_eq!(w.messages[0], messages[0]);
        assert_eq!(w.messages[6], messages[6]);
    }

    #[test]
    fn short_history_is_not_compressed() {
        assert!(select_window(&history(6), 7).is_none());
        assert!(select_window(&history(3), 7).is_none());
        assert!(select_window(&[], 7).is_none());
    }

    #[test]
    fn exactly_window_length_history_is_compressed() {
        let messages = history(7);
        let w = select_window(&messages, 7).unwrap();
        assert_eq!(w.messages.len(), 7);
        assert_eq!(w.insert_index, 7);
    }

    #[test]
    fn window_resumes_after_previous_compress() {
        let mut messages = history(4);
        messages.insert(2, MessageRecord::compress("earlier"));
        // layout: m0 m1 C m2 m3  → start at index 2 (the compress)
        let w = select_window(&messages, 2).unwrap();
        assert_eq!(w.insert_index, 4);
        assert!(w.messages[0].has_compress());
        assert_eq!(w.messages[1], MessageRecord::user("m2"));
    }

    #[test]
    fn fully_compressed_tail_is_left_alone() {
        let mut messages = history(2);
        messages.push(MessageRecord::compress("sum"));
        messages.push(MessageRecord::user("current"));
        // Only 2 live messages after the compress; window of 7 cannot fit.
        assert!(select_window(&messages, 7).is_none());
    }

    #[test]
    fn zero_window_is_disabled() {
        assert!(select_window(&history(10), 0).is_none());
    }
}
