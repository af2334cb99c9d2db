// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Point-in-time run state for joining subscribers.

use crate::agent::{AgentId, AgentStatus};
use crate::edit::FileEdit;
use crate::turn::Turn;
use serde::{Deserialize, Serialize};

/// A tool invocation that has started but not yet produced a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenToolCall {
    pub call_id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Aggregate run state assembled atomically at subscribe time.
///
/// A subscriber that applies the snapshot and then every event from the
/// accompanying stream sees exactly the run's history: no duplicated unit,
/// no gap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub agent_id: AgentId,
    pub status: AgentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Full turn log so far, including any still-streaming turn
    pub turns: Vec<Turn>,
    /// Tool calls announced but not yet resolved
    pub open_tool_calls: Vec<OpenToolCall>,
    pub files_edited: Vec<FileEdit>,
    /// Number of instructions still waiting to be claimed
    pub queued_instructions: usize,
}
