// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Compute environment handles.

use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a provisioned compute environment.
    pub struct EnvironmentId("env-");
}

/// Reference to the isolated compute environment backing an active run.
///
/// Owned exclusively by the run driver for that run; never persisted, so a
/// crashed run cannot resurrect a stale handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentHandle {
    pub environment_id: EnvironmentId,
    /// Network endpoint assigned by the provisioner (opaque to the core)
    pub endpoint: String,
}

impl EnvironmentHandle {
    pub fn new(environment_id: EnvironmentId, endpoint: impl Into<String>) -> Self {
        Self { environment_id, endpoint: endpoint.into() }
    }
}
