// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test builders and helpers, available to other crates via the
//! `test-support` feature.

use crate::agent::{Agent, AgentId, AgentStatus, RunConfig};

/// A run configuration with sensible test defaults.
pub fn test_config() -> RunConfig {
    RunConfig {
        task: "fix the flaky test".to_string(),
        target_repository: "git@example.com:acme/widgets.git".to_string(),
        source_ref: "main".to_string(),
        target_ref: "sidework/fix-flaky-test".to_string(),
        model: "default".to_string(),
    }
}

/// Builder for [`Agent`] records with test defaults.
pub struct AgentBuilder {
    id: AgentId,
    config: RunConfig,
    status: AgentStatus,
    created_at_ms: u64,
}

impl AgentBuilder {
    pub fn id(mut self, id: impl Into<AgentId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn task(mut self, task: impl Into<String>) -> Self {
        self.config.task = task.into();
        self
    }

    pub fn status(mut self, status: AgentStatus) -> Self {
        self.status = status;
        self
    }

    pub fn created_at_ms(mut self, ms: u64) -> Self {
        self.created_at_ms = ms;
        self
    }

    pub fn build(self) -> Agent {
        let mut agent = Agent::new(self.id, self.config, self.created_at_ms);
        agent.status = self.status;
        agent
    }
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self {
            id: AgentId::from_string("agt-test-1"),
            config: test_config(),
            status: AgentStatus::Idle,
            created_at_ms: 0,
        }
    }
}

impl Agent {
    /// Create a builder with test defaults.
    pub fn builder() -> AgentBuilder {
        AgentBuilder::default()
    }
}
