// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reasoning/tool-execution adapter.
//!
//! One `step` is one reasoning round: the collaborator receives the
//! conversation context plus the latest steering instruction, streams its
//! incremental outputs over `unit_tx` in generation order, and returns
//! whether the run is done or another step is needed. The adapter may call
//! back into the environment to perform file edits; it reports them as
//! [`StepUnit::FileEdit`] in the same stream.

use async_trait::async_trait;
use std::path::PathBuf;
use sw_core::{EnvironmentHandle, FileEdit, Instruction, RunConfig, Turn};
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors from the reasoning collaborator
#[derive(Debug, Error)]
pub enum ReasonerError {
    #[error("reasoning failed: {0}")]
    Failed(String),
    #[error("environment unreachable: {0}")]
    EnvironmentUnreachable(String),
}

/// One incremental output unit within a reasoning step.
#[derive(Debug, Clone, PartialEq)]
pub enum StepUnit {
    /// A fragment of assistant text
    TextDelta(String),
    /// A tool invocation with its arguments
    ToolCall {
        call_id: String,
        name: String,
        arguments: serde_json::Value,
    },
    /// The result of a previously announced tool invocation
    ToolResult { call_id: String, output: String },
    /// A file edited inside the environment
    FileEdit { path: PathBuf },
}

/// Terminal signal of a reasoning step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The agent wants another reasoning step
    Continue,
    /// The run is complete
    Done,
}

/// Context handed to the collaborator for one reasoning step.
///
/// Assembled entirely from persisted state (turn log, files edited), so a
/// continued or restarted run reasons over exactly what the record holds.
#[derive(Debug, Clone)]
pub struct StepContext {
    pub config: RunConfig,
    /// Conversation history so far, oldest first
    pub turns: Vec<Turn>,
    /// Instruction drained from the queue for this step, if any
    pub instruction: Option<Instruction>,
    /// Files edited in earlier steps and runs
    pub files_edited: Vec<FileEdit>,
    /// The environment this run executes in
    pub environment: EnvironmentHandle,
}

/// Adapter for the reasoning/tool-execution collaborator.
#[async_trait]
pub trait ReasonerAdapter: Clone + Send + Sync + 'static {
    /// Run one reasoning step, streaming incremental units over `unit_tx`.
    ///
    /// Units must be sent in generation order; the channel closing early
    /// (receiver dropped) is a signal to abandon the step quietly.
    async fn step(
        &self,
        ctx: StepContext,
        unit_tx: mpsc::Sender<StepUnit>,
    ) -> Result<StepOutcome, ReasonerError>;
}
