// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory record store for tests.

use crate::store::{RecordStore, StoreError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use sw_core::{Agent, AgentId};

/// Test double for [`RecordStore`] keeping records in a shared map.
#[derive(Clone, Default)]
pub struct MemoryStore {
    records: Arc<Mutex<HashMap<AgentId, Agent>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently stored.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl RecordStore for MemoryStore {
    fn load(&self, id: &AgentId) -> Result<Option<Agent>, StoreError> {
        Ok(self.records.lock().get(id).cloned())
    }

    fn save(&self, agent: &Agent) -> Result<(), StoreError> {
        self.records.lock().insert(agent.id.clone(), agent.clone());
        Ok(())
    }

    fn delete(&self, id: &AgentId) -> Result<(), StoreError> {
        self.records.lock().remove(id);
        Ok(())
    }

    fn list(&self) -> Result<Vec<Agent>, StoreError> {
        let mut agents: Vec<Agent> = self.records.lock().values().cloned().collect();
        agents.sort_by(|a, b| a.created_at_ms.cmp(&b.created_at_ms));
        Ok(agents)
    }
}
