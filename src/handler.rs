//! The dispatch pipeline: cache lookup, response-mode branching, retries,
//! decoding and best-effort cache writes.
//!
//! Every operation exists as a primitive taking success and failure
//! continuations (`dispatch*`) and as an async wrapper returning a `Result`
//! (`request*`). The wrapper adds no behavior of its own.

use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Deserialize};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::cache::{Storage, StorageBackend, StorageData};
use crate::decoding::{self, KeyDecoding};
use crate::error::Error;
use crate::observer::{Observer, Observers};
use crate::response::{CoreError, CoreResponse, DecodedResponse, Header};
use crate::target::{Target, TargetGroup};
use crate::transport::Transport;

pub const DEFAULT_MAX_RETRIES: usize = 3;

/// Where responses come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMode {
  /// Never read the cache; always go to the network.
  AlwaysLive,
  /// Serve valid cache entries, otherwise go to the network with retries.
  #[default]
  Normal,
  /// Serve valid cache entries, otherwise the target's sample payload.
  Sample,
  /// Fail every request without touching cache or network.
  AlwaysFail,
}

impl FromStr for ResponseMode {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().replace('-', "_").as_str() {
      "always_live" | "live" => Ok(ResponseMode::AlwaysLive),
      "normal" => Ok(ResponseMode::Normal),
      "sample" => Ok(ResponseMode::Sample),
      "always_fail" | "fail" => Ok(ResponseMode::AlwaysFail),
      other => Err(format!("unknown response mode: {}", other)),
    }
  }
}

/// Computes when a fresh response stops being servable from the cache.
pub type ValidUntil<'a, T> = &'a (dyn Fn(&T) -> DateTime<Utc> + Send + Sync);

/// Validity function that keeps any response for `ttl`.
///
/// A `ttl` reaching past the representable range keeps the response forever.
pub fn valid_for<T>(ttl: Duration) -> impl Fn(&T) -> DateTime<Utc> + Send + Sync {
  move |_| Utc::now().checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// How the decode variant turns a body into `M`, and whether to cache it.
pub struct DecodeAs<M> {
  keys: KeyDecoding,
  valid_until: Option<Box<dyn Fn(&M) -> DateTime<Utc> + Send + Sync>>,
}

impl<M> DecodeAs<M> {
  pub fn new() -> Self {
    Self {
      keys: KeyDecoding::default(),
      valid_until: None,
    }
  }

  pub fn key_decoding(mut self, keys: KeyDecoding) -> Self {
    self.keys = keys;
    self
  }

  /// Cache fresh responses until the instant computed from the decoded model.
  ///
  /// Without this, fresh responses are never written to the cache.
  pub fn valid_until(mut self, valid_until: impl Fn(&M) -> DateTime<Utc> + Send + Sync + 'static) -> Self {
    self.valid_until = Some(Box::new(valid_until));
    self
  }
}

impl<M> Default for DecodeAs<M> {
  fn default() -> Self {
    Self::new()
  }
}

/// Dispatches requests described by [`TargetGroup`]s.
///
/// All configuration is fixed at construction; the handler can be shared
/// across concurrent requests.
pub struct RequestHandler<T> {
  transport: T,
  storage: Option<StorageBackend>,
  max_retries: usize,
  response_mode: ResponseMode,
  observers: Observers,
  envelope_keys: KeyDecoding,
}

pub struct RequestHandlerBuilder<T> {
  transport: T,
  storage: Option<StorageBackend>,
  max_retries: usize,
  response_mode: ResponseMode,
  observers: Observers,
  envelope_keys: KeyDecoding,
}

impl<T: Transport> RequestHandlerBuilder<T> {
  /// Cache through `storage`. Its load shape is resolved here, once.
  pub fn storage<S: Storage + 'static>(mut self, storage: Arc<S>) -> Self {
    self.storage = Some(storage.into_backend());
    self
  }

  pub fn storage_backend(mut self, storage: Option<StorageBackend>) -> Self {
    self.storage = storage;
    self
  }

  /// Attempts per live request. Zero disables dispatch entirely.
  pub fn max_retries(mut self, max_retries: usize) -> Self {
    self.max_retries = max_retries;
    self
  }

  pub fn response_mode(mut self, response_mode: ResponseMode) -> Self {
    self.response_mode = response_mode;
    self
  }

  pub fn observer(mut self, observer: Arc<dyn Observer>) -> Self {
    self.observers.push(observer);
    self
  }

  pub fn observers(mut self, observers: Observers) -> Self {
    self.observers = observers;
    self
  }

  /// Key convention used when reading response envelopes back from the cache.
  pub fn envelope_key_decoding(mut self, keys: KeyDecoding) -> Self {
    self.envelope_keys = keys;
    self
  }

  pub fn build(self) -> RequestHandler<T> {
    RequestHandler {
      transport: self.transport,
      storage: self.storage,
      max_retries: self.max_retries,
      response_mode: self.response_mode,
      observers: self.observers,
      envelope_keys: self.envelope_keys,
    }
  }
}

impl<T: Transport> RequestHandler<T> {
  /// A handler with default settings and no cache.
  pub fn new(transport: T) -> Self {
    Self::builder(transport).build()
  }

  pub fn builder(transport: T) -> RequestHandlerBuilder<T> {
    RequestHandlerBuilder {
      transport,
      storage: None,
      max_retries: DEFAULT_MAX_RETRIES,
      response_mode: ResponseMode::default(),
      observers: Observers::default(),
      envelope_keys: KeyDecoding::default(),
    }
  }

  pub fn max_retries(&self) -> usize {
    self.max_retries
  }

  pub fn response_mode(&self) -> ResponseMode {
    self.response_mode
  }

  pub fn storage(&self) -> Option<&StorageBackend> {
    self.storage.as_ref()
  }

  pub fn transport(&self) -> &T {
    &self.transport
  }

  // --------------------------------------------------------------------------
  // Decode variant
  // --------------------------------------------------------------------------

  /// Fetch `group` and decode its body as `M`.
  ///
  /// At most one continuation fires, at most once. A valid cache entry that
  /// decodes is delivered without a live request; one that does not decode is
  /// ignored and a live request is made. Decode failures are never retried.
  pub async fn dispatch_decoded<G, M, S, E>(
    &self,
    group: &G,
    decode: &DecodeAs<M>,
    on_success: S,
    on_error: E,
  ) where
    G: TargetGroup + ?Sized,
    M: DeserializeOwned,
    S: FnOnce(DecodedResponse<M>),
    E: FnOnce(CoreError),
  {
    if self.max_retries == 0 {
      debug!("dispatch disabled: max_retries is 0");
      return;
    }

    let key = group.storage_key();
    match self.cache_routine(&key) {
      Ok(Some(cached)) => match cached.decode::<M>(decode.keys) {
        Ok(decoded) => {
          debug!(key = %key, "serving decoded response from cache");
          on_success(decoded);
          return;
        }
        Err(err) => warn!(key = %key, error = %err, "cached response does not decode, fetching live"),
      },
      Ok(None) => {}
      Err(err) => {
        on_error(err);
        return;
      }
    }

    let target = match group.target() {
      Ok(target) => target,
      Err(err) => {
        on_error(err.into());
        return;
      }
    };

    let Some(outcome) = self.request_routine(&target).await else {
      return;
    };

    match outcome {
      Ok(response) => match response.decode::<M>(decode.keys) {
        Ok(decoded) => {
          if let Some(valid_until) = &decode.valid_until {
            self.store_if_needed(&key, &response, || valid_until(&decoded.body));
          }
          on_success(decoded);
        }
        Err(err) => on_error(CoreError::new(response.status_code, response.header, err)),
      },
      Err(err) => on_error(err),
    }
  }

  /// Async form of [`RequestHandler::dispatch_decoded`].
  ///
  /// Yields [`Error::NotDispatched`] when no continuation fired.
  pub async fn request_decoded<G, M>(
    &self,
    group: &G,
    decode: &DecodeAs<M>,
  ) -> Result<DecodedResponse<M>, CoreError>
  where
    G: TargetGroup + ?Sized,
    M: DeserializeOwned,
  {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let error_tx = tx.clone();

    self
      .dispatch_decoded(
        group,
        decode,
        move |decoded| {
          let _ = tx.send(Ok(decoded));
        },
        move |err| {
          let _ = error_tx.send(Err(err));
        },
      )
      .await;

    rx.recv()
      .await
      .unwrap_or_else(|| Err(Error::NotDispatched.into()))
  }

  // --------------------------------------------------------------------------
  // Raw variant
  // --------------------------------------------------------------------------

  /// Fetch `group` and deliver the raw envelope.
  ///
  /// A valid cache entry is delivered first, and the live request is still
  /// made and delivered afterwards, so `on_response` may fire twice.
  pub async fn dispatch<G, S, E>(
    &self,
    group: &G,
    valid_until: Option<ValidUntil<'_, CoreResponse>>,
    mut on_response: S,
    on_error: E,
  ) where
    G: TargetGroup + ?Sized,
    S: FnMut(CoreResponse),
    E: FnOnce(CoreError),
  {
    if self.max_retries == 0 {
      debug!("dispatch disabled: max_retries is 0");
      return;
    }

    let key = group.storage_key();
    match self.cache_routine(&key) {
      Ok(Some(cached)) => {
        debug!(key = %key, "serving response from cache before revalidating");
        on_response(cached);
      }
      Ok(None) => {}
      Err(err) => {
        on_error(err);
        return;
      }
    }

    let target = match group.target() {
      Ok(target) => target,
      Err(err) => {
        on_error(err.into());
        return;
      }
    };

    let Some(outcome) = self.request_routine(&target).await else {
      return;
    };

    match outcome {
      Ok(response) => {
        if let Some(valid_until) = valid_until {
          self.store_if_needed(&key, &response, || valid_until(&response));
        }
        on_response(response);
      }
      Err(err) => on_error(err),
    }
  }

  /// Async form of [`RequestHandler::dispatch`].
  ///
  /// Resolves to the first delivered outcome, which is the cached envelope
  /// when one was served. The live request still runs to completion first.
  pub async fn request<G>(
    &self,
    group: &G,
    valid_until: Option<ValidUntil<'_, CoreResponse>>,
  ) -> Result<CoreResponse, CoreError>
  where
    G: TargetGroup + ?Sized,
  {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let error_tx = tx.clone();

    self
      .dispatch(
        group,
        valid_until,
        move |response| {
          let _ = tx.send(Ok(response));
        },
        move |err| {
          let _ = error_tx.send(Err(err));
        },
      )
      .await;

    rx.recv()
      .await
      .unwrap_or_else(|| Err(Error::NotDispatched.into()))
  }

  // --------------------------------------------------------------------------
  // Routines
  // --------------------------------------------------------------------------

  fn cache_routine(&self, key: &str) -> Result<Option<CoreResponse>, CoreError> {
    match self.response_mode {
      ResponseMode::AlwaysLive | ResponseMode::AlwaysFail => Ok(None),
      ResponseMode::Normal | ResponseMode::Sample => self.fetch_from_storage_if_needed(key),
    }
  }

  fn fetch_from_storage_if_needed(&self, key: &str) -> Result<Option<CoreResponse>, CoreError> {
    let Some(storage) = &self.storage else {
      return Ok(None);
    };

    let Some(entry) = storage.lookup(key)? else {
      debug!(key, "cache miss");
      return Ok(None);
    };

    match decoding::decode::<CoreResponse>(&entry.data, self.envelope_keys) {
      Ok(response) => Ok(Some(response)),
      Err(err) => {
        warn!(key, error = %err, "ignoring unreadable cache entry");
        Ok(None)
      }
    }
  }

  /// `None` only when no attempt was made.
  async fn request_routine(&self, target: &Target) -> Option<Result<CoreResponse, CoreError>> {
    match self.response_mode {
      ResponseMode::AlwaysLive | ResponseMode::Normal => self.send_request(target).await,
      ResponseMode::Sample => Some(match target.sample_data() {
        Some(sample) => Ok(CoreResponse::new(Some(200), Header::default(), sample.to_vec())),
        None => Err(CoreError::with_status(404, Error::NoSampleData)),
      }),
      ResponseMode::AlwaysFail => Some(Err(CoreError::with_status(404, Error::ForcedFailure))),
    }
  }

  /// Sequential attempts without backoff; the last failure wins.
  async fn send_request(&self, target: &Target) -> Option<Result<CoreResponse, CoreError>> {
    let mut last_error = None;

    for attempt in 1..=self.max_retries {
      match self.transport.send(target, &self.observers).await {
        Ok(response) => {
          debug!(attempt, status = ?response.status_code, "request succeeded");
          return Some(Ok(response));
        }
        Err(err) => {
          warn!(
            attempt,
            max_retries = self.max_retries,
            error = %err,
            "request attempt failed"
          );
          last_error = Some(err);
        }
      }
    }

    last_error.map(Err)
  }

  /// Best effort: failures are logged and never reach the caller.
  fn store_if_needed(
    &self,
    key: &str,
    response: &CoreResponse,
    valid_until: impl FnOnce() -> DateTime<Utc>,
  ) {
    let Some(storage) = &self.storage else {
      return;
    };

    let data = match serde_json::to_vec(response) {
      Ok(data) => data,
      Err(err) => {
        warn!(key, error = %err, "failed to serialize response for cache");
        return;
      }
    };

    if let Err(err) = storage.save(key, StorageData::new(valid_until(), data)) {
      warn!(key, error = %err, "failed to write cache entry");
    }
  }
}

impl<T> std::fmt::Debug for RequestHandler<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("RequestHandler")
      .field("storage", &self.storage)
      .field("max_retries", &self.max_retries)
      .field("response_mode", &self.response_mode)
      .field("observers", &self.observers)
      .field("envelope_keys", &self.envelope_keys)
      .finish_non_exhaustive()
  }
}
