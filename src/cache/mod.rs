//! Cache storage for dispatched responses.
//!
//! This module provides:
//! - Expiring entries whose validity is judged at read time
//! - The storage capability in two load shapes: one item per key, or an
//!   append-only list per key
//! - In-memory and SQLite implementations of both shapes

mod data;
mod memory;
mod sqlite;
mod storage;

pub use data::StorageData;
pub use memory::{MemoryItemStorage, MemoryListStorage};
pub use sqlite::{default_path, SqliteItemStorage, SqliteListStorage};
pub use storage::{ItemStorage, ListStorage, Storage, StorageBackend};
