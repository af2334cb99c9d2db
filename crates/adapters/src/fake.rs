// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake adapters for tests.
//!
//! `FakeProvisioner` records every call and can be scripted to fail or
//! stall; `ScriptedReasoner` plays back a fixed sequence of steps and
//! records the context it was handed for each one.

use crate::provision::{ProvisionAdapter, ProvisionError, RunCredentials};
use crate::reasoner::{ReasonerAdapter, ReasonerError, StepContext, StepOutcome, StepUnit};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use sw_core::{AgentId, EnvironmentHandle, EnvironmentId};
use tokio::sync::mpsc;
use tokio::sync::Notify;

/// A recorded call on the fake provisioner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionCall {
    Provision { agent_id: AgentId },
    Teardown { environment_id: EnvironmentId },
}

#[derive(Default)]
struct FakeProvisionState {
    calls: Vec<ProvisionCall>,
    fail_next_provision: Option<String>,
    fail_teardown: Option<String>,
    provision_delay: Option<Duration>,
    live: Vec<EnvironmentId>,
}

/// Test double for [`ProvisionAdapter`].
#[derive(Clone, Default)]
pub struct FakeProvisioner {
    state: Arc<Mutex<FakeProvisionState>>,
}

impl FakeProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `provision` call fail with the given message.
    pub fn fail_next_provision(&self, message: impl Into<String>) {
        self.state.lock().fail_next_provision = Some(message.into());
    }

    /// Make every `teardown` call fail with the given message.
    pub fn fail_teardown(&self, message: impl Into<String>) {
        self.state.lock().fail_teardown = Some(message.into());
    }

    /// Stall every `provision` call for the given duration.
    pub fn set_provision_delay(&self, delay: Duration) {
        self.state.lock().provision_delay = Some(delay);
    }

    /// All calls recorded so far.
    pub fn calls(&self) -> Vec<ProvisionCall> {
        self.state.lock().calls.clone()
    }

    /// Environments provisioned but not yet torn down.
    pub fn live_environments(&self) -> Vec<EnvironmentId> {
        self.state.lock().live.clone()
    }
}

#[async_trait]
impl ProvisionAdapter for FakeProvisioner {
    async fn provision(
        &self,
        agent_id: &AgentId,
        _credentials: &RunCredentials,
    ) -> Result<EnvironmentHandle, ProvisionError> {
        let (delay, fail) = {
            let mut state = self.state.lock();
            state.calls.push(ProvisionCall::Provision { agent_id: agent_id.clone() });
            (state.provision_delay, state.fail_next_provision.take())
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = fail {
            return Err(ProvisionError::ProvisionFailed(message));
        }
        let environment_id = EnvironmentId::new();
        self.state.lock().live.push(environment_id.clone());
        Ok(EnvironmentHandle::new(
            environment_id.clone(),
            format!("fake://{environment_id}"),
        ))
    }

    async fn teardown(&self, handle: &EnvironmentHandle) -> Result<(), ProvisionError> {
        let mut state = self.state.lock();
        state
            .calls
            .push(ProvisionCall::Teardown { environment_id: handle.environment_id.clone() });
        state.live.retain(|id| *id != handle.environment_id);
        if let Some(message) = &state.fail_teardown {
            return Err(ProvisionError::TeardownFailed(message.clone()));
        }
        Ok(())
    }
}

/// One scripted reasoning step.
#[derive(Clone)]
pub struct ScriptedStep {
    units: Vec<StepUnit>,
    outcome: StepOutcome,
    error: Option<String>,
    /// Wait for a notification before emitting units (test rendezvous)
    pause: Option<Arc<Notify>>,
    /// Never return after emitting units (for cancellation tests)
    hang: bool,
}

impl ScriptedStep {
    /// Emit the given units, then report the outcome.
    pub fn new(units: Vec<StepUnit>, outcome: StepOutcome) -> Self {
        Self { units, outcome, error: None, pause: None, hang: false }
    }

    /// Emit no units and fail the step.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            units: Vec::new(),
            outcome: StepOutcome::Continue,
            error: Some(message.into()),
            pause: None,
            hang: false,
        }
    }

    /// Emit the given units, then never return.
    pub fn hanging(units: Vec<StepUnit>) -> Self {
        Self { units, outcome: StepOutcome::Continue, error: None, pause: None, hang: true }
    }

    /// Block before emitting units until the notify fires.
    pub fn paused(mut self, gate: Arc<Notify>) -> Self {
        self.pause = Some(gate);
        self
    }
}

#[derive(Default)]
struct ScriptState {
    steps: VecDeque<ScriptedStep>,
    contexts: Vec<StepContext>,
}

/// Test double for [`ReasonerAdapter`] playing back scripted steps.
///
/// Once the script is exhausted, further steps complete immediately with
/// [`StepOutcome::Done`] and no units.
#[derive(Clone, Default)]
pub struct ScriptedReasoner {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedReasoner {
    pub fn new(steps: Vec<ScriptedStep>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ScriptState {
                steps: steps.into(),
                contexts: Vec::new(),
            })),
        }
    }

    /// Contexts received so far, one per started step.
    pub fn contexts(&self) -> Vec<StepContext> {
        self.state.lock().contexts.clone()
    }
}

#[async_trait]
impl ReasonerAdapter for ScriptedReasoner {
    async fn step(
        &self,
        ctx: StepContext,
        unit_tx: mpsc::Sender<StepUnit>,
    ) -> Result<StepOutcome, ReasonerError> {
        let step = {
            let mut state = self.state.lock();
            state.contexts.push(ctx);
            state.steps.pop_front()
        };
        let Some(step) = step else {
            return Ok(StepOutcome::Done);
        };

        if let Some(gate) = &step.pause {
            gate.notified().await;
        }
        for unit in step.units {
            if unit_tx.send(unit).await.is_err() {
                // Receiver gone; the driver abandoned this step
                return Ok(StepOutcome::Continue);
            }
        }
        if step.hang {
            std::future::pending::<()>().await;
        }
        match step.error {
            Some(message) => Err(ReasonerError::Failed(message)),
            None => Ok(step.outcome),
        }
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
