// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run driver.
//!
//! One driver instance owns one run: `Provisioning → Active →
//! Finalizing-{Completed, Error, Stopped}`. Every incremental output is
//! published to the event channel before it is persisted, in generation
//! order, so observers can reconstruct the run purely from the stream.
//! Cancellation is cooperative: the token is checked before each
//! reasoning step and at every unit boundary inside a step; the unit
//! being applied is always finished. Environment teardown runs in every
//! finalization branch, time-bounded and best-effort.

use crate::channel::ChannelRegistry;
use crate::config::EngineConfig;
use crate::registry::AgentEntry;
use std::sync::Arc;
use sw_adapters::{
    ProvisionAdapter, ReasonerAdapter, RunCredentials, StepContext, StepOutcome, StepUnit,
};
use sw_core::{
    Agent, AgentId, AgentStatus, Clock, EnvironmentHandle, FileEdit, Instruction, OpenToolCall,
    RunEvent, Turn, TurnId,
};
use sw_storage::{RecordStore, StoreError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Buffer between the reasoner task and the driver's apply loop
const UNIT_BUFFER: usize = 64;

/// Terminal branch of a run.
enum Terminal {
    Completed,
    Stopped,
    Error(String),
}

/// Result of one reasoning step.
enum StepResult {
    Outcome(StepOutcome),
    Failed(String),
    Cancelled,
    TimedOut,
}

pub(crate) struct RunDriver<P, R, S, C> {
    pub agent_id: AgentId,
    pub entry: Arc<AgentEntry>,
    pub channels: Arc<ChannelRegistry>,
    pub store: S,
    pub provisioner: P,
    pub reasoner: R,
    pub clock: C,
    pub config: EngineConfig,
    pub cancel: CancellationToken,
    pub credentials: RunCredentials,
    /// Streaming assistant turn opened by the current step, if any
    pub current_turn: Option<TurnId>,
}

impl<P, R, S, C> RunDriver<P, R, S, C>
where
    P: ProvisionAdapter,
    R: ReasonerAdapter,
    S: RecordStore,
    C: Clock,
{
    /// Drive the run to a terminal state. Never returns an error: every
    /// failure is converted into events and a terminal status.
    pub(crate) async fn run(mut self) {
        tracing::info!(agent_id = %self.agent_id, "run driver starting");

        let provisioned = tokio::time::timeout(
            self.config.provision_timeout,
            self.provisioner.provision(&self.agent_id, &self.credentials),
        )
        .await;

        let environment = match provisioned {
            Ok(Ok(environment)) => environment,
            Ok(Err(e)) => {
                return self
                    .finalize(Terminal::Error(format!("environment provisioning failed: {e}")), None)
                    .await;
            }
            Err(_) => {
                let message = format!(
                    "environment provisioning timed out after {:?}",
                    self.config.provision_timeout
                );
                return self.finalize(Terminal::Error(message), None).await;
            }
        };

        {
            let entry = Arc::clone(&self.entry);
            entry.with_state(|s| s.environment = Some(environment.clone()));
        }
        tracing::info!(
            agent_id = %self.agent_id,
            environment_id = %environment.environment_id,
            "environment provisioned"
        );

        let terminal = self.active_loop(&environment).await;
        self.finalize(terminal, Some(&environment)).await;
    }

    /// The Active state: drain one instruction, run one reasoning step,
    /// repeat until the reasoner reports completion or the run is
    /// cancelled or fails.
    async fn active_loop(&mut self, environment: &EnvironmentHandle) -> Terminal {
        loop {
            // Cancellation is checked before each new reasoning step
            if self.cancel.is_cancelled() {
                return Terminal::Stopped;
            }

            let instruction = match self.claim_instruction() {
                Ok(instruction) => instruction,
                Err(e) => {
                    return Terminal::Error(format!("failed to persist instruction claim: {e}"));
                }
            };

            let entry = Arc::clone(&self.entry);
            let ctx = entry.with_state(|s| StepContext {
                config: s.record.config.clone(),
                turns: s.record.turns.clone(),
                instruction,
                files_edited: s.record.files_edited.clone(),
                environment: environment.clone(),
            });

            let result = self.run_step(ctx).await;
            // The step's streaming turn is finalized in every branch, so
            // an interrupted step still leaves a complete turn behind
            self.finalize_turn();

            match result {
                StepResult::Outcome(StepOutcome::Continue) => {}
                StepResult::Outcome(StepOutcome::Done) => return Terminal::Completed,
                StepResult::Cancelled => return Terminal::Stopped,
                StepResult::TimedOut => {
                    return Terminal::Error(format!(
                        "reasoning step timed out after {:?}",
                        self.config.step_timeout
                    ));
                }
                StepResult::Failed(message) => return Terminal::Error(message),
            }
        }
    }

    /// Run one reasoning step, applying incremental units as they arrive.
    async fn run_step(&mut self, ctx: StepContext) -> StepResult {
        let (unit_tx, mut unit_rx) = mpsc::channel::<StepUnit>(UNIT_BUFFER);
        let reasoner = self.reasoner.clone();
        let mut task = tokio::spawn(async move { reasoner.step(ctx, unit_tx).await });
        let abort = task.abort_handle();
        let cancel = self.cancel.clone();

        let deadline = tokio::time::sleep(self.config.step_timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                maybe = unit_rx.recv() => match maybe {
                    Some(unit) => {
                        if let Err(e) = self.apply_unit(unit) {
                            abort.abort();
                            return StepResult::Failed(format!("failed to persist run output: {e}"));
                        }
                    }
                    // Sender dropped: the step future finished (or gave
                    // up); collect its outcome below
                    None => break,
                },
                // Cancellation observed at a unit boundary: the current
                // unit is fully applied, the rest of the step abandoned
                () = cancel.cancelled() => {
                    abort.abort();
                    return StepResult::Cancelled;
                }
                () = &mut deadline => {
                    abort.abort();
                    return StepResult::TimedOut;
                }
            }
        }

        tokio::select! {
            joined = &mut task => match joined {
                Ok(Ok(outcome)) => StepResult::Outcome(outcome),
                Ok(Err(e)) => StepResult::Failed(e.to_string()),
                Err(e) => StepResult::Failed(format!("reasoning step aborted: {e}")),
            },
            () = cancel.cancelled() => {
                abort.abort();
                StepResult::Cancelled
            }
            () = &mut deadline => {
                abort.abort();
                StepResult::TimedOut
            }
        }
    }

    /// Emit one incremental unit to the event channel, then fold it into
    /// the aggregate. Durable writes happen for finalized units only;
    /// deltas become durable when their turn is finalized.
    fn apply_unit(&mut self, unit: StepUnit) -> Result<(), StoreError> {
        let now = self.clock.now();
        let now_ms = self.clock.epoch_ms();
        let entry = Arc::clone(&self.entry);

        match unit {
            StepUnit::TextDelta(delta) => {
                entry.with_state(|s| {
                    let turn_id = match self.current_turn.clone() {
                        Some(turn_id) => turn_id,
                        None => {
                            let turn = Turn::streaming(now_ms);
                            let turn_id = turn.id.clone();
                            s.record.turns.push(turn);
                            self.current_turn = Some(turn_id.clone());
                            turn_id
                        }
                    };
                    self.channels.publish(
                        &self.agent_id,
                        RunEvent::TextDelta { turn_id: turn_id.clone(), delta: delta.clone() },
                        now,
                    );
                    if let Some(turn) = s.record.turns.iter_mut().find(|t| t.id == turn_id) {
                        turn.push_delta(&delta);
                    }
                    s.record.updated_at_ms = now_ms;
                });
                Ok(())
            }
            StepUnit::ToolCall { call_id, name, arguments } => {
                entry.with_state(|s| {
                    self.channels.publish(
                        &self.agent_id,
                        RunEvent::ToolCall {
                            call_id: call_id.clone(),
                            name: name.clone(),
                            arguments: arguments.clone(),
                        },
                        now,
                    );
                    s.open_tools.push(OpenToolCall { call_id, name, arguments });
                });
                Ok(())
            }
            StepUnit::ToolResult { call_id, output } => {
                entry.with_state(|s| {
                    self.channels.publish(
                        &self.agent_id,
                        RunEvent::ToolResult { call_id: call_id.clone(), output },
                        now,
                    );
                    s.open_tools.retain(|t| t.call_id != call_id);
                });
                Ok(())
            }
            StepUnit::FileEdit { path } => {
                let record = entry.with_state(|s| {
                    self.channels.publish(
                        &self.agent_id,
                        RunEvent::FileEdit { path: path.clone(), at_ms: now_ms },
                        now,
                    );
                    s.record.files_edited.push(FileEdit::new(path, now_ms));
                    s.record.updated_at_ms = now_ms;
                    s.record.clone()
                });
                self.store.save(&record)
            }
        }
    }

    /// Claim the oldest queued instruction, persisting the transition.
    fn claim_instruction(&self) -> Result<Option<Instruction>, StoreError> {
        let now_ms = self.clock.epoch_ms();
        let entry = Arc::clone(&self.entry);
        let (claimed, record) = entry.with_state(|s| {
            let claimed = s.claim_next_instruction();
            if claimed.is_some() {
                s.record.updated_at_ms = now_ms;
            }
            (claimed, s.record.clone())
        });
        if let Some(instruction) = &claimed {
            self.store.save(&record)?;
            tracing::debug!(
                agent_id = %self.agent_id,
                instruction_id = %instruction.id,
                "instruction applied"
            );
        }
        Ok(claimed)
    }

    /// Finalize the streaming turn opened by the current step, if any,
    /// and make it durable.
    fn finalize_turn(&mut self) {
        let Some(turn_id) = self.current_turn.take() else {
            return;
        };
        let now_ms = self.clock.epoch_ms();
        let entry = Arc::clone(&self.entry);
        let record = entry.with_state(|s| {
            if let Some(turn) = s.record.turns.iter_mut().find(|t| t.id == turn_id) {
                turn.finalize();
            }
            s.record.updated_at_ms = now_ms;
            s.record.clone()
        });
        if let Err(e) = self.store.save(&record) {
            tracing::warn!(agent_id = %self.agent_id, error = %e, "failed to persist finalized turn");
        }
    }

    /// Finalization: release the environment, settle the terminal status,
    /// emit the terminal events, persist. Runs for every branch; if a
    /// concurrent stop already settled the record, the settle is skipped
    /// (first terminal transition wins) but teardown still happens.
    async fn finalize(mut self, terminal: Terminal, environment: Option<&EnvironmentHandle>) {
        self.finalize_turn();

        if let Some(environment) = environment {
            match tokio::time::timeout(
                self.config.teardown_timeout,
                self.provisioner.teardown(environment),
            )
            .await
            {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(agent_id = %self.agent_id, error = %e, "environment teardown failed");
                }
                Err(_) => {
                    tracing::warn!(agent_id = %self.agent_id, "environment teardown timed out");
                }
            }
        }

        let now = self.clock.now();
        let now_ms = self.clock.epoch_ms();
        let (status, error) = match terminal {
            Terminal::Completed => (AgentStatus::Completed, None),
            Terminal::Stopped => (AgentStatus::Stopped, None),
            Terminal::Error(message) => (AgentStatus::Error, Some(message)),
        };

        let entry = Arc::clone(&self.entry);
        let settled: Option<Agent> = entry.with_state(|s| {
            s.environment = None;
            s.open_tools.clear();
            if s.record.status != AgentStatus::Running {
                return None;
            }
            if let Some(message) = &error {
                self.channels
                    .publish(&self.agent_id, RunEvent::Error { message: message.clone() }, now);
            }
            s.record.status = status;
            s.record.error = error.clone();
            s.record.updated_at_ms = now_ms;
            self.channels
                .publish(&self.agent_id, RunEvent::Status { status, at_ms: now_ms }, now);
            self.channels.publish(&self.agent_id, RunEvent::Finish { status }, now);
            Some(s.record.clone())
        });

        match settled {
            Some(record) => {
                if let Err(e) = self.store.save(&record) {
                    tracing::error!(agent_id = %self.agent_id, error = %e, "failed to persist terminal state");
                }
                tracing::info!(agent_id = %self.agent_id, status = %status, "run finished");
            }
            None => {
                tracing::info!(agent_id = %self.agent_id, "run already settled; finalization skipped");
            }
        }
    }
}
