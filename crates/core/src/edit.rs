// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File-edit records, used to build continuation context for later runs.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One file touched by a run. Append-only per run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEdit {
    pub path: PathBuf,
    /// Epoch milliseconds when the edit was reported
    pub edited_at_ms: u64,
}

impl FileEdit {
    pub fn new(path: impl Into<PathBuf>, edited_at_ms: u64) -> Self {
        Self { path: path.into(), edited_at_ms }
    }
}
