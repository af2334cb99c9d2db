// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent entity.
//!
//! An `Agent` is one delegated coding task: its run configuration, current
//! lifecycle status, and append-only run history (turns, instructions, file
//! edits). The environment handle for an active run is deliberately NOT part
//! of the record — it is owned by the live run driver and dies with it.

use crate::edit::FileEdit;
use crate::instruction::Instruction;
use crate::turn::Turn;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

crate::define_id! {
    /// Unique identifier for a delegated agent task.
    pub struct AgentId("agt-");
}

/// Lifecycle status of an agent.
///
/// `Running` implies exactly one live run driver holds the environment
/// handle for this agent. Any terminal status permits a fresh start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// No run in progress; configuration is mutable
    Idle,
    /// A run driver is active for this agent
    Running,
    /// Last run finished gracefully
    Completed,
    /// Last run failed before or during execution
    Error,
    /// Last run was cancelled by an explicit stop
    Stopped,
}

impl AgentStatus {
    /// Whether this status is terminal (no live driver, restart permitted)
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentStatus::Completed | AgentStatus::Error | AgentStatus::Stopped)
    }
}

crate::simple_display! {
    AgentStatus {
        Idle => "idle",
        Running => "running",
        Completed => "completed",
        Error => "error",
        Stopped => "stopped",
    }
}

/// Error parsing an [`AgentStatus`] from its display form.
#[derive(Debug, Error)]
#[error("unknown agent status: {0}")]
pub struct StatusParseError(String);

impl FromStr for AgentStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(AgentStatus::Idle),
            "running" => Ok(AgentStatus::Running),
            "completed" => Ok(AgentStatus::Completed),
            "error" => Ok(AgentStatus::Error),
            "stopped" => Ok(AgentStatus::Stopped),
            other => Err(StatusParseError(other.to_string())),
        }
    }
}

/// Run configuration, immutable once a run starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    /// The coding task delegated to the agent
    pub task: String,
    /// Repository the agent works against
    pub target_repository: String,
    /// Ref the run starts from (e.g. "main")
    pub source_ref: String,
    /// Ref the run pushes its changes to
    pub target_ref: String,
    /// Model identifier handed to the reasoning collaborator
    pub model: String,
}

/// One delegated coding task and its run history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    /// Run configuration (mutable only while no run is active)
    pub config: RunConfig,
    /// Current lifecycle status
    pub status: AgentStatus,
    /// Append-only conversation history, oldest first
    #[serde(default)]
    pub turns: Vec<Turn>,
    /// Mid-run steering instructions, FIFO
    #[serde(default)]
    pub instructions: Vec<Instruction>,
    /// Files edited across runs, append-only
    #[serde(default)]
    pub files_edited: Vec<FileEdit>,
    /// Human-readable cause when status is `Error`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Epoch milliseconds when created
    pub created_at_ms: u64,
    /// Epoch milliseconds of last update
    pub updated_at_ms: u64,
}

impl Agent {
    /// Create a new idle agent for a submitted task.
    pub fn new(id: AgentId, config: RunConfig, now_ms: u64) -> Self {
        Self {
            id,
            config,
            status: AgentStatus::Idle,
            turns: Vec::new(),
            instructions: Vec::new(),
            files_edited: Vec::new(),
            error: None,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
        }
    }
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
