// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orchestrator facade.
//!
//! External callers reach the engine only through this type: agent CRUD,
//! `start`/`stop`/`instruct`, subscription, and history reads. The
//! one-run-per-agent invariant is enforced here, under the run-table
//! lock; the driver trusts this gate and never re-checks. Drivers are
//! supervised background tasks: their failures are routed through the
//! event channel and never through the call that spawned them.

use crate::channel::{ChannelRegistry, EventStream};
use crate::config::EngineConfig;
use crate::driver::RunDriver;
use crate::error::RuntimeError;
use crate::registry::{AgentEntry, AgentTable};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use sw_adapters::{ProvisionAdapter, ReasonerAdapter, RunCredentials};
use sw_core::{
    Agent, AgentId, AgentStatus, Clock, Instruction, InstructionId, InstructionStatus, RunConfig,
    RunEvent, RunSnapshot, Turn,
};
use sw_storage::RecordStore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Adapter dependencies for the orchestrator.
pub struct EngineDeps<P, R, S> {
    pub provisioner: P,
    pub reasoner: R,
    pub store: S,
}

/// Handle to one spawned run driver.
struct RunHandle {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

/// The agent lifecycle orchestrator.
///
/// Methods that spawn or await background work must be called within a
/// Tokio runtime.
pub struct Orchestrator<P, R, S, C: Clock> {
    provisioner: P,
    reasoner: R,
    store: S,
    clock: C,
    config: EngineConfig,
    channels: Arc<ChannelRegistry>,
    table: AgentTable,
    runs: Mutex<HashMap<AgentId, RunHandle>>,
}

impl<P, R, S, C> Orchestrator<P, R, S, C>
where
    P: ProvisionAdapter,
    R: ReasonerAdapter,
    S: RecordStore,
    C: Clock,
{
    /// Create an orchestrator over the given collaborators.
    ///
    /// The channel registry is an explicit dependency so callers can share
    /// it with other observers and control its buffering and idle TTL.
    pub fn new(
        deps: EngineDeps<P, R, S>,
        channels: Arc<ChannelRegistry>,
        clock: C,
        config: EngineConfig,
    ) -> Self {
        Self {
            provisioner: deps.provisioner,
            reasoner: deps.reasoner,
            store: deps.store,
            clock,
            config,
            channels,
            table: AgentTable::new(),
            runs: Mutex::new(HashMap::new()),
        }
    }

    /// Load all persisted agents, settling orphaned `Running` records.
    ///
    /// A record persisted as `Running` has lost its driver with the
    /// previous process; the turn log is trusted as-is (events are
    /// ephemeral and never replayed) and the status settles to `Error`.
    /// Call once at startup. Returns the number of records settled.
    pub fn recover(&self) -> Result<usize, RuntimeError> {
        let mut settled = 0;
        for mut agent in self.store.list()? {
            if agent.status == AgentStatus::Running {
                agent.status = AgentStatus::Error;
                agent.error = Some("run driver lost on restart".to_string());
                agent.updated_at_ms = self.clock.epoch_ms();
                self.store.save(&agent)?;
                settled += 1;
                tracing::warn!(agent_id = %agent.id, "settled orphaned running record");
            }
            self.table.insert(agent);
        }
        Ok(settled)
    }

    /// Register a new agent for a submitted task. Starts Idle.
    pub fn create_agent(&self, config: RunConfig) -> Result<Agent, RuntimeError> {
        let agent = Agent::new(AgentId::new(), config, self.clock.epoch_ms());
        self.store.save(&agent)?;
        self.table.insert(agent.clone());
        tracing::info!(agent_id = %agent.id, "agent created");
        Ok(agent)
    }

    pub fn get_agent(&self, agent_id: &AgentId) -> Option<Agent> {
        self.table.get(agent_id).map(|entry| entry.record())
    }

    pub fn list_agents(&self) -> Vec<Agent> {
        self.table.list()
    }

    /// Replace the run configuration. Rejected while a run is active:
    /// configuration is immutable once a run starts.
    pub fn update_config(
        &self,
        agent_id: &AgentId,
        config: RunConfig,
    ) -> Result<Agent, RuntimeError> {
        let entry = self.require(agent_id)?;
        let now_ms = self.clock.epoch_ms();
        let updated = entry.with_state(|s| {
            if s.record.status == AgentStatus::Running {
                return Err(RuntimeError::AlreadyRunning(agent_id.clone()));
            }
            s.record.config = config;
            s.record.updated_at_ms = now_ms;
            Ok(s.record.clone())
        })?;
        self.store.save(&updated)?;
        Ok(updated)
    }

    /// Start a run. Returns immediately once the driver is spawned; run
    /// progress and failures are observable only through the event
    /// channel and snapshots, never through this call.
    pub fn start(
        &self,
        agent_id: &AgentId,
        credentials: RunCredentials,
    ) -> Result<(), RuntimeError> {
        let entry = self.require(agent_id)?;
        let mut runs = self.runs.lock();

        // Only one accepted start may be outstanding per agent
        if let Some(handle) = runs.get(agent_id) {
            if !handle.join.is_finished() {
                return Err(RuntimeError::AlreadyRunning(agent_id.clone()));
            }
        }

        let now = self.clock.now();
        let now_ms = self.clock.epoch_ms();
        entry.with_state(|s| {
            if s.record.status == AgentStatus::Running {
                return Err(RuntimeError::AlreadyRunning(agent_id.clone()));
            }
            let previous_status = s.record.status;
            let previous_error = s.record.error.take();
            let previous_updated = s.record.updated_at_ms;
            s.record.status = AgentStatus::Running;
            s.record.updated_at_ms = now_ms;
            match self.store.save(&s.record) {
                Ok(()) => {
                    self.channels.publish(
                        agent_id,
                        RunEvent::Status { status: AgentStatus::Running, at_ms: now_ms },
                        now,
                    );
                    Ok(())
                }
                Err(e) => {
                    // A rejected start leaves no state change behind
                    s.record.status = previous_status;
                    s.record.error = previous_error;
                    s.record.updated_at_ms = previous_updated;
                    Err(RuntimeError::Store(e))
                }
            }
        })?;

        let cancel = CancellationToken::new();
        let driver = RunDriver {
            agent_id: agent_id.clone(),
            entry,
            channels: Arc::clone(&self.channels),
            store: self.store.clone(),
            provisioner: self.provisioner.clone(),
            reasoner: self.reasoner.clone(),
            clock: self.clock.clone(),
            config: self.config.clone(),
            cancel: cancel.clone(),
            credentials,
            current_turn: None,
        };
        let join = tokio::spawn(driver.run());
        runs.insert(agent_id.clone(), RunHandle { cancel, join });
        tracing::info!(agent_id = %agent_id, "start accepted");
        Ok(())
    }

    /// Enqueue a steering instruction. Valid in any status; while no run
    /// is active the instruction is retained for the next run.
    pub fn instruct(
        &self,
        agent_id: &AgentId,
        text: impl Into<String>,
    ) -> Result<Instruction, RuntimeError> {
        let entry = self.require(agent_id)?;
        let now_ms = self.clock.epoch_ms();
        let instruction = Instruction::queued(text, now_ms);
        let record = entry.with_state(|s| {
            s.record.instructions.push(instruction.clone());
            s.record.updated_at_ms = now_ms;
            s.record.clone()
        });
        self.store.save(&record)?;
        tracing::debug!(agent_id = %agent_id, instruction_id = %instruction.id, "instruction enqueued");
        Ok(instruction)
    }

    /// Withdraw a still-queued instruction. Returns whether it was
    /// discarded; an entry already applied or discarded is left alone.
    pub fn discard_instruction(
        &self,
        agent_id: &AgentId,
        instruction_id: &InstructionId,
    ) -> Result<bool, RuntimeError> {
        let entry = self.require(agent_id)?;
        let now_ms = self.clock.epoch_ms();
        let (discarded, record) = entry.with_state(|s| {
            let mut discarded = false;
            if let Some(instruction) =
                s.record.instructions.iter_mut().find(|i| i.id == *instruction_id)
            {
                if instruction.status == InstructionStatus::Queued {
                    instruction.status = InstructionStatus::Discarded;
                    s.record.updated_at_ms = now_ms;
                    discarded = true;
                }
            }
            (discarded, s.record.clone())
        });
        if discarded {
            self.store.save(&record)?;
        }
        Ok(discarded)
    }

    /// Stop the active run, if any. Idempotent and infallible: a stop on
    /// an unknown, idle, or already-terminal agent is a quiet no-op, and
    /// no agent is ever left `Running` without a live driver afterwards.
    pub async fn stop(&self, agent_id: &AgentId) {
        let Some(entry) = self.table.get(agent_id) else {
            tracing::debug!(agent_id = %agent_id, "stop on unknown agent is a no-op");
            return;
        };

        let handle = self.runs.lock().remove(agent_id);
        if let Some(handle) = handle {
            handle.cancel.cancel();
            tracing::info!(agent_id = %agent_id, "stop signalled; waiting for driver");
            if tokio::time::timeout(self.config.stop_timeout, handle.join).await.is_err() {
                tracing::warn!(agent_id = %agent_id, "driver did not settle within stop timeout");
            }
        }

        // Settle the status ourselves if the driver has not: either it
        // overran the stop timeout or it died without finalizing
        let now = self.clock.now();
        let now_ms = self.clock.epoch_ms();
        let settled = entry.with_state(|s| {
            if s.record.status != AgentStatus::Running {
                return None;
            }
            s.environment = None;
            s.open_tools.clear();
            s.record.status = AgentStatus::Stopped;
            s.record.updated_at_ms = now_ms;
            self.channels.publish(
                agent_id,
                RunEvent::Status { status: AgentStatus::Stopped, at_ms: now_ms },
                now,
            );
            self.channels
                .publish(agent_id, RunEvent::Finish { status: AgentStatus::Stopped }, now);
            Some(s.record.clone())
        });
        if let Some(record) = settled {
            if let Err(e) = self.store.save(&record) {
                tracing::warn!(agent_id = %agent_id, error = %e, "failed to persist stopped status");
            }
        }
    }

    /// Delete the agent: best-effort stop, then remove the record, its
    /// event topic, and its persisted document. Teardown failures never
    /// block deletion.
    pub async fn delete_agent(&self, agent_id: &AgentId) -> Result<(), RuntimeError> {
        if self.table.get(agent_id).is_none() {
            return Err(RuntimeError::NotFound(agent_id.clone()));
        }
        self.stop(agent_id).await;
        self.table.remove(agent_id);
        self.channels.remove(agent_id);
        self.store.delete(agent_id)?;
        tracing::info!(agent_id = %agent_id, "agent deleted");
        Ok(())
    }

    /// Subscribe to the agent's run: a snapshot assembled atomically at
    /// subscribe time, plus a stream of every event published after it —
    /// no duplication, no gap. Dropping the stream unsubscribes.
    pub fn subscribe(
        &self,
        agent_id: &AgentId,
    ) -> Result<(RunSnapshot, EventStream), RuntimeError> {
        let entry = self.require(agent_id)?;
        let now = self.clock.now();
        Ok(entry.with_state(|s| {
            let stream = self.channels.subscribe(agent_id, now);
            (s.snapshot(), stream)
        }))
    }

    /// Current aggregate state without subscribing.
    pub fn snapshot(&self, agent_id: &AgentId) -> Result<RunSnapshot, RuntimeError> {
        Ok(self.require(agent_id)?.with_state(|s| s.snapshot()))
    }

    /// The agent's full conversation history, oldest first.
    pub fn read_turn_log(&self, agent_id: &AgentId) -> Result<Vec<Turn>, RuntimeError> {
        Ok(self.require(agent_id)?.with_state(|s| s.record.turns.clone()))
    }

    /// The agent's instruction queue, oldest first, all statuses.
    pub fn read_instructions(&self, agent_id: &AgentId) -> Result<Vec<Instruction>, RuntimeError> {
        Ok(self.require(agent_id)?.with_state(|s| s.record.instructions.clone()))
    }

    /// Sweep idle event topics. Also happens opportunistically on every
    /// publish/subscribe; call this periodically when traffic is sparse.
    pub fn sweep_channels(&self) {
        self.channels.sweep(self.clock.now());
    }

    fn require(&self, agent_id: &AgentId) -> Result<Arc<AgentEntry>, RuntimeError> {
        self.table.get(agent_id).ok_or_else(|| RuntimeError::NotFound(agent_id.clone()))
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
