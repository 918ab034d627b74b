//! Error kinds delivered through the failure continuation.

use thiserror::Error as ThisError;

/// Why a dispatch produced no usable response.
#[derive(Debug, ThisError)]
pub enum Error {
  /// The live exchange failed before a response body was read.
  #[error("transport error: {0}")]
  Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

  /// The server answered with a status the transport treats as a failure.
  #[error("unexpected HTTP status {0}")]
  Status(u16),

  /// The response bytes did not match the requested model.
  #[error("failed to decode response: {0}")]
  Decode(#[from] serde_json::Error),

  /// `ResponseMode::Sample` was selected but the target has no sample payload.
  #[error("no sample data provided while using sample response mode")]
  NoSampleData,

  /// `ResponseMode::AlwaysFail` was selected.
  #[error("forced failure while using always-fail response mode")]
  ForcedFailure,

  /// The configured storage implements neither the item nor the list load shape.
  #[error("storage must be item-shaped or list-shaped to be read from")]
  StorageShape,

  /// The target's base URL and path do not form a valid URL.
  #[error("invalid target url: {0}")]
  InvalidUrl(#[from] url::ParseError),

  /// The dispatch finished without ever invoking a continuation.
  #[error("request was never dispatched")]
  NotDispatched,
}

impl Error {
  /// Wrap any transport-level failure.
  pub fn transport(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
    Error::Transport(err.into())
  }

  /// Whether this error came from decoding bytes into a model.
  pub fn is_decode(&self) -> bool {
    matches!(self, Error::Decode(_))
  }
}
