// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Conversation turns.
//!
//! A turn is one user or assistant message in the history. Turns are
//! append-only: the single permitted post-append mutation is finalizing a
//! streaming turn (content completed, in-progress flag cleared).

use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a conversation turn.
    pub struct TurnId("trn-");
}

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
}

crate::simple_display! {
    TurnRole {
        User => "user",
        Assistant => "assistant",
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// One message in an agent's conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub id: TurnId,
    pub role: TurnRole,
    pub content: String,
    /// Epoch milliseconds when the turn was appended
    pub at_ms: u64,
    /// True while an assistant turn is still streaming deltas
    #[serde(default, skip_serializing_if = "is_false")]
    pub in_progress: bool,
}

impl Turn {
    /// A completed user turn.
    pub fn user(content: impl Into<String>, at_ms: u64) -> Self {
        Self {
            id: TurnId::new(),
            role: TurnRole::User,
            content: content.into(),
            at_ms,
            in_progress: false,
        }
    }

    /// A completed assistant turn.
    pub fn assistant(content: impl Into<String>, at_ms: u64) -> Self {
        Self {
            id: TurnId::new(),
            role: TurnRole::Assistant,
            content: content.into(),
            at_ms,
            in_progress: false,
        }
    }

    /// An assistant turn created in the streaming state, to be filled by
    /// text deltas and finalized in place.
    pub fn streaming(at_ms: u64) -> Self {
        Self {
            id: TurnId::new(),
            role: TurnRole::Assistant,
            content: String::new(),
            at_ms,
            in_progress: true,
        }
    }

    /// Append a text delta to a streaming turn. No-op once finalized.
    pub fn push_delta(&mut self, delta: &str) {
        if self.in_progress {
            self.content.push_str(delta);
        }
    }

    /// Mark a streaming turn as complete.
    pub fn finalize(&mut self) {
        self.in_progress = false;
    }
}

#[cfg(test)]
#[path = "turn_tests.rs"]
mod tests;
