//! In-process storages backed by a locked `HashMap`.

use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use super::data::StorageData;
use super::storage::{ItemStorage, ListStorage, Storage, StorageBackend};

/// Keeps the latest entry per key.
#[derive(Debug, Default)]
pub struct MemoryItemStorage {
  entries: Mutex<HashMap<String, StorageData>>,
}

impl MemoryItemStorage {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self
      .entries
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl Storage for MemoryItemStorage {
  fn save(&self, key: &str, value: StorageData) -> Result<()> {
    self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?
      .insert(key.to_string(), value);
    Ok(())
  }

  fn into_backend(self: Arc<Self>) -> StorageBackend {
    StorageBackend::Item(self)
  }
}

impl ItemStorage for MemoryItemStorage {
  fn load(&self, key: &str) -> Option<StorageData> {
    self
      .entries
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .get(key)
      .cloned()
  }
}

/// Keeps every entry ever saved per key, in insertion order.
#[derive(Debug, Default)]
pub struct MemoryListStorage {
  entries: Mutex<HashMap<String, Vec<StorageData>>>,
}

impl MemoryListStorage {
  pub fn new() -> Self {
    Self::default()
  }
}

impl Storage for MemoryListStorage {
  fn save(&self, key: &str, value: StorageData) -> Result<()> {
    self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?
      .entry(key.to_string())
      .or_default()
      .push(value);
    Ok(())
  }

  fn into_backend(self: Arc<Self>) -> StorageBackend {
    StorageBackend::List(self)
  }
}

impl ListStorage for MemoryListStorage {
  fn load(&self, key: &str) -> Vec<StorageData> {
    self
      .entries
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .get(key)
      .cloned()
      .unwrap_or_default()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Utc;

  #[test]
  fn test_item_storage_overwrites() {
    let storage = MemoryItemStorage::new();
    storage.save("k", StorageData::new(Utc::now(), b"a".to_vec())).unwrap();
    storage.save("k", StorageData::new(Utc::now(), b"b".to_vec())).unwrap();

    assert_eq!(storage.len(), 1);
    assert_eq!(storage.load("k").unwrap().data, b"b");
    assert!(storage.load("missing").is_none());
  }

  #[test]
  fn test_list_storage_appends_in_order() {
    let storage = MemoryListStorage::new();
    storage.save("k", StorageData::new(Utc::now(), b"a".to_vec())).unwrap();
    storage.save("k", StorageData::new(Utc::now(), b"b".to_vec())).unwrap();

    let loaded: Vec<Vec<u8>> = storage.load("k").into_iter().map(|e| e.data).collect();
    assert_eq!(loaded, vec![b"a".to_vec(), b"b".to_vec()]);
    assert!(storage.load("missing").is_empty());
  }
}
