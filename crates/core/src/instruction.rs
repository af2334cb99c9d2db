// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Mid-run steering instructions.
//!
//! Instructions are user-submitted steering text queued for the run driver.
//! Entries transition `queued → applied` in FIFO order only; a still-queued
//! entry may instead be marked `discarded`, which removes it from the FIFO
//! without disturbing the order of the rest.

use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a queued instruction.
    pub struct InstructionId("ins-");
}

/// Consumption state of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstructionStatus {
    /// Waiting to be claimed by the run driver
    Queued,
    /// Claimed and folded into a reasoning step
    Applied,
    /// Withdrawn by the user before being claimed
    Discarded,
}

crate::simple_display! {
    InstructionStatus {
        Queued => "queued",
        Applied => "applied",
        Discarded => "discarded",
    }
}

/// One user-submitted steering instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub id: InstructionId,
    pub text: String,
    /// Epoch milliseconds when enqueued
    pub added_at_ms: u64,
    pub status: InstructionStatus,
}

impl Instruction {
    /// A freshly enqueued instruction.
    pub fn queued(text: impl Into<String>, added_at_ms: u64) -> Self {
        Self {
            id: InstructionId::new(),
            text: text.into(),
            added_at_ms,
            status: InstructionStatus::Queued,
        }
    }
}

#[cfg(test)]
#[path = "instruction_tests.rs"]
mod tests;
