//! Transport backed by `reqwest`.

use color_eyre::{eyre::eyre, Result};
use reqwest::header::HeaderMap;
use reqwest::Method;
use std::collections::BTreeMap;
use std::time::Duration;

use super::Transport;
use crate::error::Error;
use crate::response::{CoreError, CoreResponse, Header};
use crate::target::{HttpMethod, OutgoingRequest};

/// HTTP transport over a shared `reqwest::Client`.
///
/// Any response that arrives is a success unless `fail_on_status` is set, in
/// which case non-2xx statuses become [`Error::Status`] failures (and are
/// therefore retried by the handler).
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
  client: reqwest::Client,
  fail_on_status: bool,
}

impl ReqwestTransport {
  pub fn new() -> Result<Self> {
    Self::builder().build()
  }

  pub fn builder() -> ReqwestTransportBuilder {
    ReqwestTransportBuilder::default()
  }

  /// Use an already configured client.
  pub fn with_client(client: reqwest::Client) -> Self {
    Self {
      client,
      fail_on_status: false,
    }
  }
}

#[derive(Debug, Clone, Default)]
pub struct ReqwestTransportBuilder {
  timeout: Option<Duration>,
  user_agent: Option<String>,
  fail_on_status: bool,
}

impl ReqwestTransportBuilder {
  /// Per-attempt timeout.
  pub fn timeout(mut self, timeout: Duration) -> Self {
    self.timeout = Some(timeout);
    self
  }

  pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
    self.user_agent = Some(user_agent.into());
    self
  }

  pub fn fail_on_status(mut self, fail_on_status: bool) -> Self {
    self.fail_on_status = fail_on_status;
    self
  }

  pub fn build(self) -> Result<ReqwestTransport> {
    let mut builder = reqwest::Client::builder();
    if let Some(timeout) = self.timeout {
      builder = builder.timeout(timeout);
    }
    if let Some(user_agent) = self.user_agent {
      builder = builder.user_agent(user_agent);
    }

    let client = builder
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(ReqwestTransport {
      client,
      fail_on_status: self.fail_on_status,
    })
  }
}

fn method(method: HttpMethod) -> Method {
  match method {
    HttpMethod::Get => Method::GET,
    HttpMethod::Post => Method::POST,
    HttpMethod::Put => Method::PUT,
    HttpMethod::Patch => Method::PATCH,
    HttpMethod::Delete => Method::DELETE,
  }
}

/// Repeated headers are joined with ", ". Values that are not visible ASCII are dropped.
fn collect_headers(headers: &HeaderMap) -> Header {
  let mut merged: BTreeMap<String, String> = BTreeMap::new();
  for (name, value) in headers {
    let Ok(value) = value.to_str() else {
      continue;
    };
    merged
      .entry(name.as_str().to_string())
      .and_modify(|existing| {
        existing.push_str(", ");
        existing.push_str(value);
      })
      .or_insert_with(|| value.to_string());
  }
  Header::new(merged)
}

impl Transport for ReqwestTransport {
  async fn exchange(&self, request: &OutgoingRequest) -> Result<CoreResponse, CoreError> {
    let mut builder = self
      .client
      .request(method(request.method), request.url.clone());
    for (name, value) in &request.headers {
      builder = builder.header(name.as_str(), value.as_str());
    }
    if let Some(body) = &request.body {
      builder = builder.body(body.clone());
    }

    let response = builder.send().await.map_err(|e| {
      CoreError::new(
        e.status().map(|s| s.as_u16()),
        Header::default(),
        Error::transport(e),
      )
    })?;

    let status = response.status();
    let header = collect_headers(response.headers());

    if self.fail_on_status && !status.is_success() {
      return Err(CoreError::new(
        Some(status.as_u16()),
        header,
        Error::Status(status.as_u16()),
      ));
    }

    let body = response
      .bytes()
      .await
      .map_err(|e| CoreError::new(Some(status.as_u16()), header.clone(), Error::transport(e)))?;

    Ok(CoreResponse::new(Some(status.as_u16()), header, body.to_vec()))
  }
}
