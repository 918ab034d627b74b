//! Response and error envelopes produced by one exchange attempt.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::decoding::{self, KeyDecoding};
use crate::error::Error;

/// Response headers kept as a serialized JSON blob.
///
/// The map is parsed from the blob on every access and never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Header {
  raw: Option<String>,
}

impl Header {
  /// Serialize a header set once, at construction.
  pub fn new<I, K, V>(entries: I) -> Self
  where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
  {
    let map: BTreeMap<String, String> = entries
      .into_iter()
      .map(|(k, v)| (k.into(), v.into()))
      .collect();

    Self {
      raw: serde_json::to_string(&map).ok(),
    }
  }

  /// Wrap an already-serialized blob as-is.
  pub fn from_raw(raw: impl Into<String>) -> Self {
    Self {
      raw: Some(raw.into()),
    }
  }

  /// Re-materialize the header map.
  ///
  /// Returns `None` when no headers were recorded or the blob does not parse.
  pub fn dictionary(&self) -> Option<BTreeMap<String, String>> {
    serde_json::from_str(self.raw.as_deref()?).ok()
  }

  /// Look up a single header, ignoring ASCII case.
  pub fn get(&self, name: &str) -> Option<String> {
    self
      .dictionary()?
      .into_iter()
      .find(|(key, _)| key.eq_ignore_ascii_case(name))
      .map(|(_, value)| value)
  }

  pub fn is_empty(&self) -> bool {
    self.dictionary().map_or(true, |map| map.is_empty())
  }
}

impl fmt::Display for Header {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let Some(map) = self.dictionary() else {
      return Ok(());
    };

    for (i, (key, value)) in map.iter().enumerate() {
      if i > 0 {
        writeln!(f)?;
      }
      write!(f, "{}: {}", key, value)?;
    }
    Ok(())
  }
}

/// Successful outcome of one exchange.
///
/// This is also the record written to storage, so the serialized form is
/// stable: camelCase keys, headers as their JSON blob and the body hex-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreResponse {
  // Also accepted as written after a camel-to-snake key rewrite
  #[serde(alias = "status_code")]
  pub status_code: Option<u16>,
  pub header: Header,
  #[serde(with = "hex::serde")]
  pub body: Vec<u8>,
}

impl CoreResponse {
  pub fn new(status_code: Option<u16>, header: Header, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status_code,
      header,
      body: body.into(),
    }
  }

  /// Whether the status code is in the 2xx range.
  pub fn is_success(&self) -> bool {
    matches!(self.status_code, Some(200..=299))
  }

  /// Body as text, replacing invalid UTF-8.
  pub fn text(&self) -> String {
    String::from_utf8_lossy(&self.body).into_owned()
  }

  /// Decode the body into a model.
  pub fn decode<M: DeserializeOwned>(&self, keys: KeyDecoding) -> Result<DecodedResponse<M>, Error> {
    let body = decoding::decode(&self.body, keys)?;
    Ok(DecodedResponse {
      status_code: self.status_code,
      header: self.header.clone(),
      body,
    })
  }
}

/// A response whose body has been decoded into a model.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedResponse<M> {
  pub status_code: Option<u16>,
  pub header: Header,
  pub body: M,
}

impl<M> DecodedResponse<M> {
  pub fn into_body(self) -> M {
    self.body
  }
}

/// Failed outcome of one exchange, with whatever status and headers were seen.
#[derive(Debug)]
pub struct CoreError {
  pub status_code: Option<u16>,
  pub header: Header,
  pub error: Error,
}

impl CoreError {
  pub fn new(status_code: Option<u16>, header: Header, error: Error) -> Self {
    Self {
      status_code,
      header,
      error,
    }
  }

  /// An error with the given status and no headers.
  pub fn with_status(status_code: u16, error: Error) -> Self {
    Self::new(Some(status_code), Header::default(), error)
  }
}

impl From<Error> for CoreError {
  fn from(error: Error) -> Self {
    Self::new(None, Header::default(), error)
  }
}

impl fmt::Display for CoreError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.status_code {
      Some(status) => write!(f, "{} (status {})", self.error, status),
      None => write!(f, "{}", self.error),
    }
  }
}

impl std::error::Error for CoreError {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    Some(&self.error)
  }
}
