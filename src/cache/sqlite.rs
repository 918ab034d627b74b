//! SQLite-backed storages.

use chrono::{DateTime, SecondsFormat, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::warn;

use super::data::StorageData;
use super::storage::{ItemStorage, ListStorage, Storage, StorageBackend};

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
-- One entry per key, overwritten on save
CREATE TABLE IF NOT EXISTS cache_item (
    cache_key TEXT PRIMARY KEY,
    valid_until TEXT NOT NULL,
    data BLOB NOT NULL
);

-- Entries appended per key; seq preserves insertion order
CREATE TABLE IF NOT EXISTS cache_list (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    cache_key TEXT NOT NULL,
    valid_until TEXT NOT NULL,
    data BLOB NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_cache_list_key ON cache_list(cache_key, seq);
"#;

/// Connection shared by both storage shapes.
struct SqliteCache {
  conn: Mutex<Connection>,
}

impl SqliteCache {
  fn open_at(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  fn in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

/// Get the default database path.
pub fn default_path() -> Result<PathBuf> {
  let data_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?;

  Ok(data_dir.join("lynn").join("cache.db"))
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}

/// Item-shaped storage: one row per key.
pub struct SqliteItemStorage {
  cache: SqliteCache,
}

impl SqliteItemStorage {
  /// Open or create the database at the default location.
  pub fn open() -> Result<Self> {
    Self::open_at(&default_path()?)
  }

  pub fn open_at(path: &Path) -> Result<Self> {
    Ok(Self {
      cache: SqliteCache::open_at(path)?,
    })
  }

  pub fn in_memory() -> Result<Self> {
    Ok(Self {
      cache: SqliteCache::in_memory()?,
    })
  }

  fn try_load(&self, key: &str) -> Result<Option<StorageData>> {
    let conn = self.cache.lock()?;

    let row: Option<(String, Vec<u8>)> = conn
      .query_row(
        "SELECT valid_until, data FROM cache_item WHERE cache_key = ?",
        params![key],
        |row| Ok((row.get(0)?, row.get(1)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to query cache entry: {}", e))?;

    match row {
      Some((valid_until, data)) => Ok(Some(StorageData {
        valid_until: parse_datetime(&valid_until)?,
        data,
      })),
      None => Ok(None),
    }
  }
}

impl Storage for SqliteItemStorage {
  fn save(&self, key: &str, value: StorageData) -> Result<()> {
    let conn = self.cache.lock()?;

    conn
      .execute(
        "INSERT OR REPLACE INTO cache_item (cache_key, valid_until, data) VALUES (?, ?, ?)",
        params![key, format_datetime(&value.valid_until), value.data],
      )
      .map_err(|e| eyre!("Failed to store cache entry: {}", e))?;

    Ok(())
  }

  fn into_backend(self: Arc<Self>) -> StorageBackend {
    StorageBackend::Item(self)
  }
}

impl ItemStorage for SqliteItemStorage {
  fn load(&self, key: &str) -> Option<StorageData> {
    self.try_load(key).unwrap_or_else(|e| {
      warn!(key, error = %e, "failed to load cache entry");
      None
    })
  }
}

/// List-shaped storage: rows appended per key, read back in insertion order.
pub struct SqliteListStorage {
  cache: SqliteCache,
}

impl SqliteListStorage {
  /// Open or create the database at the default location.
  pub fn open() -> Result<Self> {
    Self::open_at(&default_path()?)
  }

  pub fn open_at(path: &Path) -> Result<Self> {
    Ok(Self {
      cache: SqliteCache::open_at(path)?,
    })
  }

  pub fn in_memory() -> Result<Self> {
    Ok(Self {
      cache: SqliteCache::in_memory()?,
    })
  }

  fn try_load(&self, key: &str) -> Result<Vec<StorageData>> {
    let conn = self.cache.lock()?;

    let mut stmt = conn
      .prepare("SELECT valid_until, data FROM cache_list WHERE cache_key = ? ORDER BY seq")
      .map_err(|e| eyre!("Failed to prepare cache query: {}", e))?;

    let rows: Vec<(String, Vec<u8>)> = stmt
      .query_map(params![key], |row| Ok((row.get(0)?, row.get(1)?)))
      .map_err(|e| eyre!("Failed to query cache entries: {}", e))?
      .filter_map(|r| match r {
        Ok(row) => Some(row),
        Err(e) => {
          warn!(key, error = %e, "skipping unreadable cache row");
          None
        }
      })
      .collect();

    // Rows with an unreadable timestamp are skipped rather than failing the whole list
    let entries = rows
      .into_iter()
      .filter_map(|(valid_until, data)| match parse_datetime(&valid_until) {
        Ok(valid_until) => Some(StorageData { valid_until, data }),
        Err(e) => {
          warn!(key, error = %e, "skipping unreadable cache entry");
          None
        }
      })
      .collect();

    Ok(entries)
  }
}

impl Storage for SqliteListStorage {
  fn save(&self, key: &str, value: StorageData) -> Result<()> {
    let conn = self.cache.lock()?;

    conn
      .execute(
        "INSERT INTO cache_list (cache_key, valid_until, data) VALUES (?, ?, ?)",
        params![key, format_datetime(&value.valid_until), value.data],
      )
      .map_err(|e| eyre!("Failed to append cache entry: {}", e))?;

    Ok(())
  }

  fn into_backend(self: Arc<Self>) -> StorageBackend {
    StorageBackend::List(self)
  }
}

impl ListStorage for SqliteListStorage {
  fn load(&self, key: &str) -> Vec<StorageData> {
    self.try_load(key).unwrap_or_else(|e| {
      warn!(key, error = %e, "failed to load cache entries");
      Vec::new()
    })
  }
}
