// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine configuration

use std::time::Duration;

/// Time bounds for the engine's suspension points.
///
/// The run driver suspends only while awaiting the provisioning and
/// reasoning collaborators; each wait is bounded and treated as failed
/// once its timeout elapses.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum wait for environment provisioning
    pub provision_timeout: Duration,
    /// Maximum wall time for one reasoning step
    pub step_timeout: Duration,
    /// Maximum wait for environment teardown (exceeding it is logged,
    /// never surfaced)
    pub teardown_timeout: Duration,
    /// How long `stop` waits for the driver to finish its in-flight unit
    /// before settling the status itself
    pub stop_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            provision_timeout: Duration::from_secs(60),
            step_timeout: Duration::from_secs(300),
            teardown_timeout: Duration::from_secs(30),
            stop_timeout: Duration::from_secs(10),
        }
    }
}
