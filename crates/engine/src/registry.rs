// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory agent registry.
//!
//! Each agent has one [`AgentEntry`] whose mutex serializes every state
//! mutation and every snapshot/subscribe against the run driver's
//! publishes. The driver is the single writer during a run; instruction
//! submitters and subscribers are the concurrent readers/writers this
//! lock isolates.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use sw_core::{
    Agent, AgentId, EnvironmentHandle, Instruction, InstructionStatus, OpenToolCall, RunSnapshot,
};

/// All agents known to the orchestrator.
pub(crate) struct AgentTable {
    entries: Mutex<HashMap<AgentId, Arc<AgentEntry>>>,
}

impl AgentTable {
    pub fn new() -> Self {
        Self { entries: Mutex::new(HashMap::new()) }
    }

    pub fn insert(&self, record: Agent) -> Arc<AgentEntry> {
        let entry = Arc::new(AgentEntry::new(record.clone()));
        self.entries.lock().insert(record.id, Arc::clone(&entry));
        entry
    }

    pub fn get(&self, id: &AgentId) -> Option<Arc<AgentEntry>> {
        self.entries.lock().get(id).cloned()
    }

    pub fn remove(&self, id: &AgentId) -> Option<Arc<AgentEntry>> {
        self.entries.lock().remove(id)
    }

    /// Clones of all records, oldest first.
    pub fn list(&self) -> Vec<Agent> {
        let entries: Vec<Arc<AgentEntry>> = self.entries.lock().values().cloned().collect();
        let mut records: Vec<Agent> = entries.iter().map(|e| e.record()).collect();
        records.sort_by(|a, b| a.created_at_ms.cmp(&b.created_at_ms));
        records
    }
}

/// One agent's live state: the record plus run-scoped extras that are
/// never persisted (environment handle, open tool calls).
pub(crate) struct AgentEntry {
    state: Mutex<EntryState>,
}

pub(crate) struct EntryState {
    pub record: Agent,
    /// Present only while a run driver holds it
    pub environment: Option<EnvironmentHandle>,
    /// Tool calls announced but not yet resolved
    pub open_tools: Vec<OpenToolCall>,
}

impl AgentEntry {
    pub fn new(record: Agent) -> Self {
        Self {
            state: Mutex::new(EntryState {
                record,
                environment: None,
                open_tools: Vec::new(),
            }),
        }
    }

    /// Run `f` with the entry state locked.
    ///
    /// Publishes that must be atomic with a state mutation happen inside
    /// `f`, so a concurrent subscriber can never observe the mutation
    /// without also being positioned to receive the matching event.
    pub fn with_state<T>(&self, f: impl FnOnce(&mut EntryState) -> T) -> T {
        let mut state = self.state.lock();
        f(&mut state)
    }

    /// Clone of the current record.
    pub fn record(&self) -> Agent {
        self.state.lock().record.clone()
    }
}

impl EntryState {
    /// Atomically claim the oldest `queued` instruction, marking it
    /// `applied`. Discarded and already-applied entries are skipped;
    /// FIFO order over the remaining queued entries is preserved.
    pub fn claim_next_instruction(&mut self) -> Option<Instruction> {
        let instruction = self
            .record
            .instructions
            .iter_mut()
            .find(|i| i.status == InstructionStatus::Queued)?;
        instruction.status = InstructionStatus::Applied;
        Some(instruction.clone())
    }

    /// Point-in-time aggregate for a joining subscriber.
    pub fn snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            agent_id: self.record.id.clone(),
            status: self.record.status,
            error: self.record.error.clone(),
            turns: self.record.turns.clone(),
            open_tool_calls: self.open_tools.clone(),
            files_edited: self.record.files_edited.clone(),
            queued_instructions: self
                .record
                .instructions
                .iter()
                .filter(|i| i.status == InstructionStatus::Queued)
                .count(),
        }
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
