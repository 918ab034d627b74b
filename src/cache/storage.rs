//! Storage capability traits and the backend resolved from them.

use color_eyre::Result;
use std::sync::Arc;

use super::data::StorageData;
use crate::error::Error;

/// Durable key-value persistence for cached responses.
///
/// Every storage can save. To be read from it must also implement
/// [`ItemStorage`] or [`ListStorage`] and say so in [`Storage::into_backend`].
pub trait Storage: Send + Sync {
  /// Persist `value` under `key`.
  ///
  /// Item storages overwrite, list storages append.
  fn save(&self, key: &str, value: StorageData) -> Result<()>;

  /// Declare the load shape this storage offers.
  ///
  /// Left at the default the storage is write-only, and every cache lookup
  /// through it fails with [`Error::StorageShape`].
  fn into_backend(self: Arc<Self>) -> StorageBackend
  where
    Self: Sized + 'static,
  {
    StorageBackend::Unshaped(self)
  }
}

/// One entry per key.
pub trait ItemStorage: Storage {
  fn load(&self, key: &str) -> Option<StorageData>;
}

/// Entries appended per key, returned oldest first.
pub trait ListStorage: Storage {
  fn load(&self, key: &str) -> Vec<StorageData>;
}

/// A storage with its load shape resolved once, at handler construction.
#[derive(Clone)]
pub enum StorageBackend {
  Item(Arc<dyn ItemStorage>),
  List(Arc<dyn ListStorage>),
  /// Implements neither load shape.
  Unshaped(Arc<dyn Storage>),
}

impl StorageBackend {
  pub fn from_storage<S: Storage + 'static>(storage: S) -> Self {
    Arc::new(storage).into_backend()
  }

  pub fn save(&self, key: &str, value: StorageData) -> Result<()> {
    match self {
      StorageBackend::Item(storage) => storage.save(key, value),
      StorageBackend::List(storage) => storage.save(key, value),
      StorageBackend::Unshaped(storage) => storage.save(key, value),
    }
  }

  /// The entry to serve for `key`, if any is still valid.
  ///
  /// List storages yield the first valid entry in insertion order.
  pub fn lookup(&self, key: &str) -> Result<Option<StorageData>, Error> {
    match self {
      StorageBackend::Item(storage) => Ok(storage.load(key).filter(StorageData::is_valid)),
      StorageBackend::List(storage) => Ok(storage.load(key).into_iter().find(StorageData::is_valid)),
      StorageBackend::Unshaped(_) => Err(Error::StorageShape),
    }
  }

  pub fn shape_name(&self) -> &'static str {
    match self {
      StorageBackend::Item(_) => "item",
      StorageBackend::List(_) => "list",
      StorageBackend::Unshaped(_) => "unshaped",
    }
  }
}

impl std::fmt::Debug for StorageBackend {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_tuple("StorageBackend")
      .field(&self.shape_name())
      .finish()
  }
}
