// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Environment provisioning adapter.
//!
//! Provisioning creates the isolated, disposable compute environment a run
//! executes in and hands back an [`EnvironmentHandle`]. Teardown is
//! best-effort and idempotent: the driver calls it in every finalization
//! branch, and a second teardown of the same handle must succeed quietly.

use async_trait::async_trait;
use std::path::PathBuf;
use sw_core::{AgentId, EnvironmentHandle, EnvironmentId};
use thiserror::Error;

/// Errors from provisioning operations
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("provision failed: {0}")]
    ProvisionFailed(String),
    #[error("teardown failed: {0}")]
    TeardownFailed(String),
}

/// Credentials injected into a run's environment.
///
/// Opaque to the core; carried as environment variable pairs the same way
/// the environment backend expects them.
#[derive(Debug, Clone, Default)]
pub struct RunCredentials {
    pub env: Vec<(String, String)>,
}

impl RunCredentials {
    pub fn new(env: Vec<(String, String)>) -> Self {
        Self { env }
    }
}

/// Adapter for the environment provisioning collaborator.
#[async_trait]
pub trait ProvisionAdapter: Clone + Send + Sync + 'static {
    /// Create an environment for the agent, injecting run credentials.
    async fn provision(
        &self,
        agent_id: &AgentId,
        credentials: &RunCredentials,
    ) -> Result<EnvironmentHandle, ProvisionError>;

    /// Release an environment. Best-effort and idempotent.
    async fn teardown(&self, handle: &EnvironmentHandle) -> Result<(), ProvisionError>;
}

/// Provisioner backed by per-agent directories under a local state root.
///
/// Each "environment" is a workspace directory; the handle's endpoint is
/// the directory path. Useful for local backends and demos where the
/// compute environment is the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalDirProvisioner {
    root: PathBuf,
}

impl LocalDirProvisioner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn workspace_dir(&self, environment_id: &EnvironmentId) -> PathBuf {
        self.root.join("workspaces").join(environment_id.as_str())
    }
}

#[async_trait]
impl ProvisionAdapter for LocalDirProvisioner {
    async fn provision(
        &self,
        agent_id: &AgentId,
        credentials: &RunCredentials,
    ) -> Result<EnvironmentHandle, ProvisionError> {
        let environment_id = EnvironmentId::new();
        let dir = self.workspace_dir(&environment_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| ProvisionError::ProvisionFailed(e.to_string()))?;

        // Credentials land in a dotenv the environment's tooling sources
        if !credentials.env.is_empty() {
            let dotenv: String = credentials
                .env
                .iter()
                .map(|(k, v)| format!("{k}={v}\n"))
                .collect();
            tokio::fs::write(dir.join(".env"), dotenv)
                .await
                .map_err(|e| ProvisionError::ProvisionFailed(e.to_string()))?;
        }

        tracing::info!(agent_id = %agent_id, environment_id = %environment_id, "provisioned workspace");
        Ok(EnvironmentHandle::new(environment_id, dir.display().to_string()))
    }

    async fn teardown(&self, handle: &EnvironmentHandle) -> Result<(), ProvisionError> {
        let dir = self.workspace_dir(&handle.environment_id);
        if !dir.exists() {
            return Ok(());
        }
        tokio::fs::remove_dir_all(&dir)
            .await
            .map_err(|e| ProvisionError::TeardownFailed(e.to_string()))
    }
}

#[cfg(test)]
#[path = "provision_tests.rs"]
mod tests;
