//! File-backed build state: one JSON document per module.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{BuildStateRecord, BuildStateStore, StateStoreError};

const EXTENSION: &str = "json";

#[derive(Serialize, Deserialize)]
struct StateFile {
  module: String,
  #[serde(flatten)]
  record: BuildStateRecord,
}

/// Stores each module's record in `<dir>/<module>.json`.
///
/// Upserts write a per-module temp file and rename it over the record, so a
/// crash leaves either the old or the new record and never a partial one.
#[derive(Debug, Clone)]
pub struct FileStateStore {
  dir: PathBuf,
}

impl FileStateStore {
  pub fn new(dir: impl Into<PathBuf>) -> Self {
    Self { dir: dir.into() }
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }

  fn record_path(&self, module: &str) -> PathBuf {
    self.dir.join(format!("{}.{}", file_stem(module), EXTENSION))
  }

  fn read_file(&self, module: &str, path: &Path) -> Result<Option<StateFile>, StateStoreError> {
    let content = match fs::read_to_string(path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
      Err(source) => {
        return Err(StateStoreError::Read {
          module: module.to_string(),
          source,
        });
      }
    };

    serde_json::from_str(&content)
      .map(Some)
      .map_err(|source| StateStoreError::Parse {
        module: module.to_string(),
        source,
      })
  }
}

/// Percent-encodes path separators (and `%` itself) so every module name maps
/// to its own file directly inside the state directory.
fn file_stem(module: &str) -> String {
  let mut stem = String::with_capacity(module.len());
  for c in module.chars() {
    match c {
      '%' => stem.push_str("%25"),
      '/' => stem.push_str("%2F"),
      '\\' => stem.push_str("%5C"),
      c => stem.push(c),
    }
  }
  stem
}

impl BuildStateStore for FileStateStore {
  fn get(&self, module: &str) -> Result<Option<BuildStateRecord>, StateStoreError> {
    let path = self.record_path(module);
    let record = self.read_file(module, &path)?.map(|file| file.record);
    debug!(module = %module, path = %path.display(), found = record.is_some(), "loaded build state");
    Ok(record)
  }

  fn put(&self, module: &str, record: BuildStateRecord) -> Result<(), StateStoreError> {
    fs::create_dir_all(&self.dir).map_err(StateStoreError::CreateDir)?;

    let path = self.record_path(module);
    let temp_path = path.with_extension("json.tmp");
    let file = StateFile {
      module: module.to_string(),
      record,
    };
    let content = serde_json::to_string_pretty(&file).map_err(StateStoreError::Serialize)?;

    let write_err = |source| StateStoreError::Write {
      module: module.to_string(),
      source,
    };
    fs::write(&temp_path, &content).map_err(write_err)?;
    fs::rename(&temp_path, &path).map_err(write_err)?;

    debug!(
      module = %module,
      phase = ?file.record.last_completed_phase,
      revision = %file.record.source_revision,
      "saved build state"
    );
    Ok(())
  }

  fn invalidate(&self, module: &str) -> Result<(), StateStoreError> {
    match fs::remove_file(self.record_path(module)) {
      Ok(()) => {
        info!(module = %module, "build state invalidated");
        Ok(())
      }
      Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
      Err(source) => Err(StateStoreError::Remove {
        module: module.to_string(),
        source,
      }),
    }
  }

  fn list(&self) -> Result<Vec<(String, BuildStateRecord)>, StateStoreError> {
    let entries = match fs::read_dir(&self.dir) {
      Ok(entries) => entries,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
      Err(source) => {
        return Err(StateStoreError::Read {
          module: "*".to_string(),
          source,
        });
      }
    };

    let mut records = Vec::new();
    for entry in entries.flatten() {
      let path = entry.path();
      if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
        continue;
      }
      let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default().to_string();
      match self.read_file(&stem, &path) {
        Ok(Some(file)) => records.push((file.module, file.record)),
        Ok(None) => {}
        Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable build state"),
      }
    }

    records.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(records)
  }
}
