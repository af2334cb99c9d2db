// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine error taxonomy.
//!
//! Only the synchronous surface of the orchestrator returns errors to
//! callers. Failures inside a background run — provisioning, reasoning,
//! teardown — are captured by the driver, converted into an `error` event
//! plus a terminal `Error` status, and never re-raised to whoever called
//! `start`.

use sw_core::AgentId;
use sw_storage::StoreError;
use thiserror::Error;

/// Errors returned from orchestrator operations
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// A second start while a run is active. Rejected, never queued.
    #[error("agent already running: {0}")]
    AlreadyRunning(AgentId),

    #[error("agent not found: {0}")]
    NotFound(AgentId),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
