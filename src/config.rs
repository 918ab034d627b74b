use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{
  self, MemoryItemStorage, MemoryListStorage, SqliteItemStorage, SqliteListStorage, Storage,
  StorageBackend,
};
use crate::decoding::KeyDecoding;
use crate::handler::{RequestHandler, ResponseMode, DEFAULT_MAX_RETRIES};
use crate::observer::TracingObserver;
use crate::transport::ReqwestTransport;

/// Everything the binary needs to assemble a handler. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
  pub handler: HandlerConfig,
  pub cache: CacheConfig,
  pub transport: TransportConfig,
  pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HandlerConfig {
  pub max_retries: usize,
  pub response_mode: ResponseMode,
  /// Key convention of cached envelopes
  pub envelope_keys: KeyDecoding,
}

impl Default for HandlerConfig {
  fn default() -> Self {
    Self {
      max_retries: DEFAULT_MAX_RETRIES,
      response_mode: ResponseMode::default(),
      envelope_keys: KeyDecoding::default(),
    }
  }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
  #[default]
  None,
  Memory,
  Sqlite,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheShape {
  #[default]
  Item,
  List,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  pub backend: CacheBackend,
  pub shape: CacheShape,
  /// SQLite database file (defaults to $XDG_DATA_HOME/lynn/cache.db)
  pub path: Option<PathBuf>,
}

impl CacheConfig {
  /// Open the configured storage, or `None` when caching is off.
  pub fn build(&self) -> Result<Option<StorageBackend>> {
    let backend = match (self.backend, self.shape) {
      (CacheBackend::None, _) => return Ok(None),
      (CacheBackend::Memory, CacheShape::Item) => Arc::new(MemoryItemStorage::new()).into_backend(),
      (CacheBackend::Memory, CacheShape::List) => Arc::new(MemoryListStorage::new()).into_backend(),
      (CacheBackend::Sqlite, shape) => {
        let path = match &self.path {
          Some(p) => p.clone(),
          None => cache::default_path()?,
        };
        match shape {
          CacheShape::Item => Arc::new(SqliteItemStorage::open_at(&path)?).into_backend(),
          CacheShape::List => Arc::new(SqliteListStorage::open_at(&path)?).into_backend(),
        }
      }
    };
    Ok(Some(backend))
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
  pub timeout_secs: Option<u64>,
  pub user_agent: Option<String>,
  /// Treat non-2xx statuses as transport failures (and so retry them)
  pub fail_on_status: bool,
}

impl TransportConfig {
  pub fn build(&self) -> Result<ReqwestTransport> {
    let mut builder = ReqwestTransport::builder().fail_on_status(self.fail_on_status);
    if let Some(secs) = self.timeout_secs {
      builder = builder.timeout(Duration::from_secs(secs));
    }
    if let Some(user_agent) = &self.user_agent {
      builder = builder.user_agent(user_agent.clone());
    }
    builder.build()
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
  /// Filter directive used when RUST_LOG is unset
  pub level: String,
  /// Write daily rolling log files here instead of stderr
  pub directory: Option<PathBuf>,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: "info".to_string(),
      directory: None,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./lynn.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/lynn/config.yaml
  ///
  /// Falls back to defaults when no file is found.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("lynn.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("lynn").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    // An empty file is a valid, all-default config
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))
  }

  /// Assemble a handler over the configured transport and storage, logging
  /// every exchange through `tracing`.
  pub fn build_handler(&self) -> Result<RequestHandler<ReqwestTransport>> {
    let handler = RequestHandler::builder(self.transport.build()?)
      .storage_backend(self.cache.build()?)
      .max_retries(self.handler.max_retries)
      .response_mode(self.handler.response_mode)
      .envelope_key_decoding(self.handler.envelope_keys)
      .observer(Arc::new(TracingObserver))
      .build();
    Ok(handler)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_config_is_all_defaults() {
    let config = Config::parse("").unwrap();
    assert_eq!(config.handler.max_retries, DEFAULT_MAX_RETRIES);
    assert_eq!(config.handler.response_mode, ResponseMode::Normal);
    assert_eq!(config.cache.backend, CacheBackend::None);
    assert_eq!(config.log.level, "info");
    assert!(config.cache.build().unwrap().is_none());
  }

  #[test]
  fn test_full_config() {
    let config = Config::parse(
      r#"
handler:
  max_retries: 5
  response_mode: sample
  envelope_keys: convert_from_snake_case
cache:
  backend: memory
  shape: list
transport:
  timeout_secs: 10
  user_agent: lynn-test
  fail_on_status: true
log:
  level: debug
  directory: /tmp/lynn-logs
"#,
    )
    .unwrap();

    assert_eq!(config.handler.max_retries, 5);
    assert_eq!(config.handler.response_mode, ResponseMode::Sample);
    assert_eq!(config.handler.envelope_keys, KeyDecoding::ConvertFromSnakeCase);
    assert_eq!(config.cache.shape, CacheShape::List);
    assert_eq!(config.transport.timeout_secs, Some(10));
    assert!(config.transport.fail_on_status);
    assert_eq!(config.log.directory, Some(PathBuf::from("/tmp/lynn-logs")));

    let storage = config.cache.build().unwrap().unwrap();
    assert_eq!(storage.shape_name(), "list");
  }

  #[test]
  fn test_partial_section_keeps_other_defaults() {
    let config = Config::parse("handler:\n  response_mode: always_live\n").unwrap();
    assert_eq!(config.handler.response_mode, ResponseMode::AlwaysLive);
    assert_eq!(config.handler.max_retries, DEFAULT_MAX_RETRIES);
    assert_eq!(config.cache.shape, CacheShape::Item);
  }

  #[test]
  fn test_unknown_mode_is_rejected() {
    assert!(Config::parse("handler:\n  response_mode: sometimes\n").is_err());
  }

  #[test]
  fn test_missing_explicit_path_is_an_error() {
    let err = Config::load(Some(Path::new("/nonexistent/lynn.yaml"))).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
  }

  #[test]
  fn test_sqlite_cache_opens_at_path() {
    let dir = std::env::temp_dir().join(format!("lynn-config-test-{}", std::process::id()));
    let config = CacheConfig {
      backend: CacheBackend::Sqlite,
      shape: CacheShape::Item,
      path: Some(dir.join("cache.db")),
    };

    let storage = config.build().unwrap().unwrap();
    assert_eq!(storage.shape_name(), "item");
    assert!(dir.join("cache.db").exists());

    let _ = std::fs::remove_dir_all(&dir);
  }

  #[test]
  fn test_build_handler_applies_settings() {
    let config = Config::parse("handler:\n  max_retries: 1\n  response_mode: always_fail\n").unwrap();
    let handler = config.build_handler().unwrap();
    assert_eq!(handler.max_retries(), 1);
    assert_eq!(handler.response_mode(), ResponseMode::AlwaysFail);
    assert!(handler.storage().is_none());
  }
}
