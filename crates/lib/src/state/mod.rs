//! Persisted build state for resumable builds.
//!
//! One record per module holds the last phase that completed and the source
//! revision it completed for. A record only counts when its revision matches
//! the module's current revision, so a source change forces a full re-run.
//!
//! # Storage Layout
//!
//! ```text
//! <state_dir>/
//! ├── glib.json
//! └── gtk.json
//! ```
//!
//! # Example State File
//!
//! ```json
//! {
//!   "module": "glib",
//!   "last_completed_phase": "build",
//!   "source_revision": "2.80.0",
//!   "updated_at": 1760600000
//! }
//! ```

pub mod file;
pub mod memory;

use std::io;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use file::FileStateStore;
pub use memory::MemoryStateStore;

/// Last known progress of one module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStateRecord {
  pub last_completed_phase: Option<String>,
  pub source_revision: String,
  /// Unix seconds of the last update. Informational only.
  #[serde(default)]
  pub updated_at: u64,
}

impl BuildStateRecord {
  pub fn new(last_completed_phase: Option<&str>, source_revision: &str) -> Self {
    Self {
      last_completed_phase: last_completed_phase.map(str::to_string),
      source_revision: source_revision.to_string(),
      updated_at: SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default(),
    }
  }

  /// The completed phase, if this record is still valid for `revision`.
  pub fn completed_for(&self, revision: &str) -> Option<&str> {
    if self.source_revision == revision {
      self.last_completed_phase.as_deref()
    } else {
      None
    }
  }
}

/// Errors that can occur when reading or writing build state.
#[derive(Debug, Error)]
pub enum StateStoreError {
  #[error("failed to read build state for {module}: {source}")]
  Read {
    module: String,
    #[source]
    source: io::Error,
  },

  #[error("failed to write build state for {module}: {source}")]
  Write {
    module: String,
    #[source]
    source: io::Error,
  },

  #[error("failed to create state directory: {0}")]
  CreateDir(#[source] io::Error),

  #[error("failed to parse build state for {module}: {source}")]
  Parse {
    module: String,
    #[source]
    source: serde_json::Error,
  },

  #[error("failed to serialize build state: {0}")]
  Serialize(#[source] serde_json::Error),

  #[error("failed to remove build state for {module}: {source}")]
  Remove {
    module: String,
    #[source]
    source: io::Error,
  },
}

/// Storage for per-module build state.
///
/// Implementations must be safe to share between executors running distinct
/// modules concurrently; writes for one module never touch another's record.
pub trait BuildStateStore: Send + Sync {
  fn get(&self, module: &str) -> Result<Option<BuildStateRecord>, StateStoreError>;

  /// Atomically replace the record of `module`.
  fn put(&self, module: &str, record: BuildStateRecord) -> Result<(), StateStoreError>;

  fn invalidate(&self, module: &str) -> Result<(), StateStoreError>;

  /// All records, sorted by module name.
  fn list(&self) -> Result<Vec<(String, BuildStateRecord)>, StateStoreError>;

  fn record_phase_complete(&self, module: &str, phase: &str, revision: &str) -> Result<(), StateStoreError> {
    self.put(module, BuildStateRecord::new(Some(phase), revision))
  }

  /// Rewind (or advance) the record to `phase`; `None` clears progress but
  /// keeps the revision.
  fn set_last_completed(&self, module: &str, phase: Option<&str>, revision: &str) -> Result<(), StateStoreError> {
    self.put(module, BuildStateRecord::new(phase, revision))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn record_is_honored_only_for_its_revision() {
    let record = BuildStateRecord::new(Some("build"), "rev-1");
    assert_eq!(record.completed_for("rev-1"), Some("build"));
    assert_eq!(record.completed_for("rev-2"), None);
  }

  #[test]
  fn record_without_phase_completes_nothing() {
    let record = BuildStateRecord::new(None, "rev-1");
    assert_eq!(record.completed_for("rev-1"), None);
    assert!(record.updated_at > 0);
  }
}
