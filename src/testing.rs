//! Scripted collaborators shared by the unit tests.

use color_eyre::{eyre::eyre, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::cache::{ItemStorage, MemoryItemStorage, Storage, StorageBackend, StorageData};
use crate::error::Error;
use crate::observer::Observer;
use crate::response::{CoreError, CoreResponse, Header};
use crate::target::OutgoingRequest;
use crate::transport::Transport;

pub fn ok(status: u16, body: &str) -> Result<CoreResponse, CoreError> {
  Ok(CoreResponse::new(
    Some(status),
    Header::new([("content-type", "application/json")]),
    body.as_bytes().to_vec(),
  ))
}

pub fn fail(status: u16) -> Result<CoreResponse, CoreError> {
  Err(CoreError::with_status(status, Error::transport(format!("attempt failed with {}", status))))
}

/// Plays back a fixed list of outcomes, one per exchange.
#[derive(Default)]
pub struct ScriptedTransport {
  script: Mutex<VecDeque<Result<CoreResponse, CoreError>>>,
  calls: AtomicUsize,
}

impl ScriptedTransport {
  pub fn new(script: Vec<Result<CoreResponse, CoreError>>) -> Self {
    Self {
      script: Mutex::new(script.into()),
      calls: AtomicUsize::new(0),
    }
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }
}

impl Transport for Arc<ScriptedTransport> {
  async fn exchange(&self, _request: &OutgoingRequest) -> Result<CoreResponse, CoreError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    self
      .script
      .lock()
      .unwrap()
      .pop_front()
      .unwrap_or_else(|| Err(Error::transport("script exhausted").into()))
  }
}

/// Records every event as a short string.
#[derive(Default)]
pub struct RecordingObserver {
  events: Mutex<Vec<String>>,
}

impl RecordingObserver {
  pub fn events(&self) -> Vec<String> {
    self.events.lock().unwrap().clone()
  }
}

impl Observer for RecordingObserver {
  fn will_send(&self, _request: &OutgoingRequest) {
    self.events.lock().unwrap().push("send".to_string());
  }

  fn did_receive(&self, outcome: Result<&CoreResponse, &CoreError>) {
    let status = |code: Option<u16>| code.map_or("-".to_string(), |c| c.to_string());
    let event = match outcome {
      Ok(response) => format!("response {}", status(response.status_code)),
      Err(err) => format!("error {}", status(err.status_code)),
    };
    self.events.lock().unwrap().push(event);
  }
}

/// Item storage that counts how often it is touched.
#[derive(Default)]
pub struct CountingStorage {
  inner: MemoryItemStorage,
  loads: AtomicUsize,
  saves: AtomicUsize,
}

impl CountingStorage {
  pub fn loads(&self) -> usize {
    self.loads.load(Ordering::SeqCst)
  }

  pub fn saves(&self) -> usize {
    self.saves.load(Ordering::SeqCst)
  }

  /// Store `response` as if a previous request had cached it.
  pub fn seed(&self, key: &str, response: &CoreResponse, valid_until: chrono::DateTime<chrono::Utc>) {
    self.seed_raw(key, serde_json::to_vec(response).unwrap(), valid_until);
  }

  pub fn seed_raw(&self, key: &str, data: Vec<u8>, valid_until: chrono::DateTime<chrono::Utc>) {
    self.inner.save(key, StorageData::new(valid_until, data)).unwrap();
  }

  pub fn peek(&self, key: &str) -> Option<StorageData> {
    self.inner.load(key)
  }
}

impl Storage for CountingStorage {
  fn save(&self, key: &str, value: StorageData) -> Result<()> {
    self.saves.fetch_add(1, Ordering::SeqCst);
    self.inner.save(key, value)
  }

  fn into_backend(self: Arc<Self>) -> StorageBackend {
    StorageBackend::Item(self)
  }
}

impl ItemStorage for CountingStorage {
  fn load(&self, key: &str) -> Option<StorageData> {
    self.loads.fetch_add(1, Ordering::SeqCst);
    self.inner.load(key)
  }
}

/// Item storage whose writes always fail.
#[derive(Default)]
pub struct BrokenStorage;

impl Storage for BrokenStorage {
  fn save(&self, _key: &str, _value: StorageData) -> Result<()> {
    Err(eyre!("disk full"))
  }

  fn into_backend(self: Arc<Self>) -> StorageBackend {
    StorageBackend::Item(self)
  }
}

impl ItemStorage for BrokenStorage {
  fn load(&self, _key: &str) -> Option<StorageData> {
    None
  }
}

/// Storage that can only save.
#[derive(Default)]
pub struct WriteOnlyStorage;

impl Storage for WriteOnlyStorage {
  fn save(&self, _key: &str, _value: StorageData) -> Result<()> {
    Ok(())
  }
}
