// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Record persistence.
//!
//! Each agent record is stored as a versioned JSON document at
//! `{root}/agents/{agent_id}.json`. Writes go through a `.tmp` sibling and
//! a rename so a crash mid-write never leaves a torn document; the previous
//! document is kept as `.bak` until the next rewrite.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use sw_core::{Agent, AgentId};
use thiserror::Error;

/// Current record schema version
pub const CURRENT_RECORD_VERSION: u32 = 1;

/// Errors that can occur in store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported record version {found} in {}", path.display())]
    UnsupportedVersion { found: u32, path: PathBuf },
    #[error("Could not determine state directory")]
    NoStateDir,
}

/// Durable key-value-by-agent-id store for agent records.
///
/// Implementations must make `save` atomic per record: a reader never
/// observes a partially written document. `delete` is idempotent.
pub trait RecordStore: Clone + Send + Sync + 'static {
    fn load(&self, id: &AgentId) -> Result<Option<Agent>, StoreError>;
    fn save(&self, agent: &Agent) -> Result<(), StoreError>;
    fn delete(&self, id: &AgentId) -> Result<(), StoreError>;
    fn list(&self) -> Result<Vec<Agent>, StoreError>;
}

/// On-disk envelope around a record, carrying the schema version.
#[derive(Debug, Serialize, Deserialize)]
struct RecordDoc {
    #[serde(rename = "v")]
    version: u32,
    agent: Agent,
}

/// File-backed record store, one JSON document per agent.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Default state root, `{XDG state dir}/sidework`.
    pub fn default_root() -> Result<PathBuf, StoreError> {
        dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .map(|d| d.join("sidework"))
            .ok_or(StoreError::NoStateDir)
    }

    fn agents_dir(&self) -> PathBuf {
        self.root.join("agents")
    }

    fn record_path(&self, id: &AgentId) -> PathBuf {
        self.agents_dir().join(format!("{id}.json"))
    }

    fn read_doc(path: &Path) -> Result<Agent, StoreError> {
        let bytes = fs::read(path)?;
        let doc: RecordDoc = serde_json::from_slice(&bytes)?;
        if doc.version > CURRENT_RECORD_VERSION {
            return Err(StoreError::UnsupportedVersion {
                found: doc.version,
                path: path.to_path_buf(),
            });
        }
        Ok(doc.agent)
    }
}

impl RecordStore for FileStore {
    fn load(&self, id: &AgentId) -> Result<Option<Agent>, StoreError> {
        let path = self.record_path(id);
        if !path.exists() {
            return Ok(None);
        }
        Self::read_doc(&path).map(Some)
    }

    fn save(&self, agent: &Agent) -> Result<(), StoreError> {
        fs::create_dir_all(self.agents_dir())?;
        let path = self.record_path(&agent.id);
        let doc = RecordDoc { version: CURRENT_RECORD_VERSION, agent: agent.clone() };
        let bytes = serde_json::to_vec_pretty(&doc)?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, &bytes)?;

        // Keep the previous document around until the next rewrite
        if path.exists() {
            let _ = fs::rename(&path, path.with_extension("json.bak"));
        }
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn delete(&self, id: &AgentId) -> Result<(), StoreError> {
        let path = self.record_path(id);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        let bak = path.with_extension("json.bak");
        if bak.exists() {
            let _ = fs::remove_file(&bak);
        }
        Ok(())
    }

    fn list(&self) -> Result<Vec<Agent>, StoreError> {
        let dir = self.agents_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut agents = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read_doc(&path) {
                Ok(agent) => agents.push(agent),
                // A corrupt or future-versioned record must not take the
                // whole store down with it
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable record");
                }
            }
        }
        agents.sort_by(|a, b| a.created_at_ms.cmp(&b.created_at_ms));
        Ok(agents)
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
