//! In-memory build state, sharded per module.

use dashmap::DashMap;

use super::{BuildStateRecord, BuildStateStore, StateStoreError};

/// Keeps records in a concurrent map; nothing is persisted.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
  records: DashMap<String, BuildStateRecord>,
}

impl MemoryStateStore {
  pub fn new() -> Self {
    Self::default()
  }
}

impl BuildStateStore for MemoryStateStore {
  fn get(&self, module: &str) -> Result<Option<BuildStateRecord>, StateStoreError> {
    Ok(self.records.get(module).map(|r| r.value().clone()))
  }

  fn put(&self, module: &str, record: BuildStateRecord) -> Result<(), StateStoreError> {
    self.records.insert(module.to_string(), record);
    Ok(())
  }

  fn invalidate(&self, module: &str) -> Result<(), StateStoreError> {
    self.records.remove(module);
    Ok(())
  }

  fn list(&self) -> Result<Vec<(String, BuildStateRecord)>, StateStoreError> {
    let mut records: Vec<_> = self
      .records
      .iter()
      .map(|entry| (entry.key().clone(), entry.value().clone()))
      .collect();
    records.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(records)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Arc;

  #[test]
  fn concurrent_modules_do_not_interfere() {
    let store = Arc::new(MemoryStateStore::new());
    let handles: Vec<_> = (0..8)
      .map(|i| {
        let store = store.clone();
        std::thread::spawn(move || {
          let module = format!("module-{}", i);
          for phase in ["checkout", "build", "install"] {
            store.record_phase_complete(&module, phase, "r").unwrap();
          }
        })
      })
      .collect();
    for handle in handles {
      handle.join().unwrap();
    }

    let records = store.list().unwrap();
    assert_eq!(records.len(), 8);
    assert!(
      records
        .iter()
        .all(|(_, r)| r.last_completed_phase.as_deref() == Some("install"))
    );
  }
}
