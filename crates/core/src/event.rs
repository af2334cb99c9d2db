// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run events distributed to observers.
//!
//! Every state change and incremental output of a run is published as a
//! `RunEvent` on the agent's event channel before it is persisted, so an
//! observer connected at emission time can reconstruct the run purely from
//! the stream. The enum is closed: each kind carries only the fields
//! relevant to it, and consumers match exhaustively.
//!
//! Serializes with `{"type": "run:name", ...fields}` format.

use crate::agent::AgentStatus;
use crate::id::short;
use crate::turn::TurnId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Events emitted over an agent's event channel, in generation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RunEvent {
    /// Lifecycle status changed
    #[serde(rename = "run:status")]
    Status { status: AgentStatus, at_ms: u64 },

    /// Incremental assistant text for the turn identified by `turn_id`
    #[serde(rename = "run:text-delta")]
    TextDelta { turn_id: TurnId, delta: String },

    /// The agent invoked a tool
    #[serde(rename = "run:tool-call")]
    ToolCall {
        call_id: String,
        name: String,
        arguments: serde_json::Value,
    },

    /// A previously announced tool call produced its result
    #[serde(rename = "run:tool-result")]
    ToolResult { call_id: String, output: String },

    /// The agent edited a file in its environment
    #[serde(rename = "run:file-edit")]
    FileEdit { path: PathBuf, at_ms: u64 },

    /// The run hit an unrecoverable failure
    #[serde(rename = "run:error")]
    Error { message: String },

    /// Terminal marker; no further events follow for this run
    #[serde(rename = "run:finish")]
    Finish { status: AgentStatus },
}

impl RunEvent {
    /// Event kind name as it appears in the serialized `type` tag.
    pub fn name(&self) -> &'static str {
        match self {
            RunEvent::Status { .. } => "run:status",
            RunEvent::TextDelta { .. } => "run:text-delta",
            RunEvent::ToolCall { .. } => "run:tool-call",
            RunEvent::ToolResult { .. } => "run:tool-result",
            RunEvent::FileEdit { .. } => "run:file-edit",
            RunEvent::Error { .. } => "run:error",
            RunEvent::Finish { .. } => "run:finish",
        }
    }

    /// One-line summary for activity logs.
    pub fn log_summary(&self) -> String {
        let t = self.name();
        match self {
            RunEvent::Status { status, .. } => format!("{t} status={status}"),
            RunEvent::TextDelta { turn_id, delta } => {
                format!("{t} turn={} len={}", turn_id.short(8), delta.len())
            }
            RunEvent::ToolCall { call_id, name, .. } => {
                format!("{t} call={} tool={name}", short(call_id, 8))
            }
            RunEvent::ToolResult { call_id, output } => {
                format!("{t} call={} len={}", short(call_id, 8), output.len())
            }
            RunEvent::FileEdit { path, .. } => format!("{t} path={}", path.display()),
            RunEvent::Error { message } => format!("{t} message={message}"),
            RunEvent::Finish { status } => format!("{t} status={status}"),
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
