//! Declarative endpoint descriptions and the concrete requests built from them.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use url::Url;

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
  Get,
  Post,
  Put,
  Patch,
  Delete,
}

impl HttpMethod {
  pub fn as_str(&self) -> &'static str {
    match self {
      HttpMethod::Get => "GET",
      HttpMethod::Post => "POST",
      HttpMethod::Put => "PUT",
      HttpMethod::Patch => "PATCH",
      HttpMethod::Delete => "DELETE",
    }
  }
}

impl fmt::Display for HttpMethod {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for HttpMethod {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_uppercase().as_str() {
      "GET" => Ok(HttpMethod::Get),
      "POST" => Ok(HttpMethod::Post),
      "PUT" => Ok(HttpMethod::Put),
      "PATCH" => Ok(HttpMethod::Patch),
      "DELETE" => Ok(HttpMethod::Delete),
      other => Err(format!("unsupported HTTP method: {}", other)),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyEncoding {
  Json,
  UrlEncoded,
}

/// Request body content and how it goes on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct Body {
  pub content: Map<String, Value>,
  pub encoding: BodyEncoding,
}

impl Body {
  pub fn json(content: Map<String, Value>) -> Self {
    Self {
      content,
      encoding: BodyEncoding::Json,
    }
  }

  pub fn url_encoded(content: Map<String, Value>) -> Self {
    Self {
      content,
      encoding: BodyEncoding::UrlEncoded,
    }
  }

  pub fn content_type(&self) -> &'static str {
    match self.encoding {
      BodyEncoding::Json => "application/json; charset=utf-8",
      BodyEncoding::UrlEncoded => "application/x-www-form-urlencoded; charset=utf-8",
    }
  }

  pub fn encode(&self) -> Vec<u8> {
    match self.encoding {
      BodyEncoding::Json => Value::Object(self.content.clone()).to_string().into_bytes(),
      BodyEncoding::UrlEncoded => {
        let mut form = url::form_urlencoded::Serializer::new(String::new());
        for (key, value) in &self.content {
          match value {
            Value::String(s) => form.append_pair(key, s),
            other => form.append_pair(key, &other.to_string()),
          };
        }
        form.finish().into_bytes()
      }
    }
  }
}

/// Method, query parameters and body of an endpoint call.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
  pub method: HttpMethod,
  pub parameters: Option<BTreeMap<String, String>>,
  pub body: Option<Body>,
}

impl Task {
  pub fn new(method: HttpMethod) -> Self {
    Self {
      method,
      parameters: None,
      body: None,
    }
  }

  pub fn get() -> Self {
    Self::new(HttpMethod::Get)
  }

  pub fn post(body: Body) -> Self {
    Self::new(HttpMethod::Post).with_body(body)
  }

  pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self
      .parameters
      .get_or_insert_with(BTreeMap::new)
      .insert(key.into(), value.into());
    self
  }

  pub fn with_body(mut self, body: Body) -> Self {
    self.body = Some(body);
    self
  }
}

/// A fully resolved endpoint call.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
  url: Url,
  task: Task,
  headers: Option<BTreeMap<String, String>>,
  sample_data: Option<Vec<u8>>,
}

impl Target {
  pub fn new(
    url: Url,
    task: Task,
    headers: Option<BTreeMap<String, String>>,
    sample_data: Option<Vec<u8>>,
  ) -> Self {
    Self {
      url,
      task,
      headers,
      sample_data,
    }
  }

  /// Resolve `path` against `base_url` with exactly one `/` between them.
  pub fn resolve(base_url: &str, path: &str) -> Result<Url, Error> {
    let mut url = Url::parse(base_url)?;
    let path = path.trim_start_matches('/');
    if !path.is_empty() {
      let joined = format!("{}/{}", url.path().trim_end_matches('/'), path);
      url.set_path(&joined);
    }
    Ok(url)
  }

  pub fn url(&self) -> &Url {
    &self.url
  }

  pub fn task(&self) -> &Task {
    &self.task
  }

  pub fn headers(&self) -> Option<&BTreeMap<String, String>> {
    self.headers.as_ref()
  }

  pub fn sample_data(&self) -> Option<&[u8]> {
    self.sample_data.as_deref()
  }

  /// Build the concrete request a transport sends.
  ///
  /// The body's content type comes first, then the target's own headers.
  pub fn request(&self) -> OutgoingRequest {
    let mut url = self.url.clone();
    if let Some(parameters) = self.task.parameters.as_ref().filter(|p| !p.is_empty()) {
      url.query_pairs_mut().extend_pairs(parameters.iter());
    }

    let mut headers = Vec::new();
    let body = self.task.body.as_ref().map(|body| {
      headers.push(("Content-Type".to_string(), body.content_type().to_string()));
      body.encode()
    });
    if let Some(extra) = &self.headers {
      headers.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    OutgoingRequest {
      method: self.task.method,
      url,
      headers,
      body,
    }
  }

  /// Stable SHA-256 hex digest of method, URL with query, and body.
  ///
  /// Usable as a storage key for endpoints without a natural one.
  pub fn fingerprint(&self) -> String {
    let request = self.request();

    let mut hasher = Sha256::new();
    hasher.update(request.method.as_str().as_bytes());
    hasher.update(b"\n");
    hasher.update(request.url.as_str().as_bytes());
    hasher.update(b"\n");
    if let Some(body) = &request.body {
      hasher.update(body);
    }
    hex::encode(hasher.finalize())
  }
}

/// The request a transport puts on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingRequest {
  pub method: HttpMethod,
  pub url: Url,
  pub headers: Vec<(String, String)>,
  pub body: Option<Vec<u8>>,
}

/// A family of endpoints, usually implemented by an enum with one variant per call.
pub trait TargetGroup {
  fn base_url(&self) -> &str;

  fn path(&self) -> String;

  fn task(&self) -> Task;

  fn headers(&self) -> Option<BTreeMap<String, String>> {
    None
  }

  /// Key under which responses for this call are cached.
  fn storage_key(&self) -> String;

  /// Canned payload served in sample mode.
  fn sample_data(&self) -> Option<Vec<u8>> {
    None
  }

  fn target(&self) -> Result<Target, Error> {
    Ok(Target::new(
      Target::resolve(self.base_url(), &self.path())?,
      self.task(),
      self.headers(),
      self.sample_data(),
    ))
  }
}

impl TargetGroup for Target {
  fn base_url(&self) -> &str {
    self.url.as_str()
  }

  fn path(&self) -> String {
    String::new()
  }

  fn task(&self) -> Task {
    self.task.clone()
  }

  fn headers(&self) -> Option<BTreeMap<String, String>> {
    self.headers.clone()
  }

  fn storage_key(&self) -> String {
    self.fingerprint()
  }

  fn sample_data(&self) -> Option<Vec<u8>> {
    self.sample_data.clone()
  }

  fn target(&self) -> Result<Target, Error> {
    Ok(self.clone())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn object(value: Value) -> Map<String, Value> {
    match value {
      Value::Object(map) => map,
      _ => panic!("expected object"),
    }
  }

  enum PetApi {
    List,
    Show { id: u32 },
    Create { name: String },
  }

  impl TargetGroup for PetApi {
    fn base_url(&self) -> &str {
      "https://pets.example.com/v1/"
    }

    fn path(&self) -> String {
      match self {
        PetApi::List | PetApi::Create { .. } => "/pets".to_string(),
        PetApi::Show { id } => format!("pets/{}", id),
      }
    }

    fn task(&self) -> Task {
      match self {
        PetApi::List => Task::get().with_parameter("limit", "10"),
        PetApi::Show { .. } => Task::get(),
        PetApi::Create { name } => Task::post(Body::json(object(json!({ "name": name })))),
      }
    }

    fn storage_key(&self) -> String {
      match self {
        PetApi::List => "pets:list".to_string(),
        PetApi::Show { id } => format!("pets:{}", id),
        PetApi::Create { .. } => "pets:create".to_string(),
      }
    }

    fn sample_data(&self) -> Option<Vec<u8>> {
      match self {
        PetApi::List => Some(b"[]".to_vec()),
        _ => None,
      }
    }
  }

  #[test]
  fn test_resolve_joins_with_single_slash() {
    let url = Target::resolve("https://a.example.com/api/", "/items").unwrap();
    assert_eq!(url.as_str(), "https://a.example.com/api/items");

    let url = Target::resolve("https://a.example.com/api", "items/3").unwrap();
    assert_eq!(url.as_str(), "https://a.example.com/api/items/3");

    let url = Target::resolve("https://a.example.com", "").unwrap();
    assert_eq!(url.as_str(), "https://a.example.com/");
  }

  #[test]
  fn test_resolve_invalid_base() {
    let err = Target::resolve("not a url", "x").unwrap_err();
    assert!(matches!(err, Error::InvalidUrl(_)));
  }

  #[test]
  fn test_group_builds_target() {
    let target = PetApi::Show { id: 7 }.target().unwrap();
    assert_eq!(target.url().as_str(), "https://pets.example.com/v1/pets/7");
    assert_eq!(target.task().method, HttpMethod::Get);
    assert!(target.sample_data().is_none());

    let target = PetApi::List.target().unwrap();
    assert_eq!(target.sample_data(), Some(&b"[]"[..]));
  }

  #[test]
  fn test_request_appends_query() {
    let request = PetApi::List.target().unwrap().request();
    assert_eq!(request.url.as_str(), "https://pets.example.com/v1/pets?limit=10");
    assert!(request.body.is_none());
    assert!(request.headers.is_empty());
  }

  #[test]
  fn test_request_query_is_escaped() {
    let target = Target::new(
      Target::resolve("https://a.example.com", "search").unwrap(),
      Task::get().with_parameter("q", "a b&c"),
      None,
      None,
    );
    assert_eq!(
      target.request().url.as_str(),
      "https://a.example.com/search?q=a+b%26c"
    );
  }

  #[test]
  fn test_request_json_body() {
    let request = PetApi::Create {
      name: "Rex".to_string(),
    }
    .target()
    .unwrap()
    .request();

    assert_eq!(request.method, HttpMethod::Post);
    assert_eq!(
      request.headers,
      vec![(
        "Content-Type".to_string(),
        "application/json; charset=utf-8".to_string()
      )]
    );
    let body: Value = serde_json::from_slice(request.body.as_deref().unwrap()).unwrap();
    assert_eq!(body, json!({ "name": "Rex" }));
  }

  #[test]
  fn test_request_form_body_and_extra_headers() {
    let mut extra = BTreeMap::new();
    extra.insert("Authorization".to_string(), "Bearer t".to_string());
    let target = Target::new(
      Target::resolve("https://a.example.com", "login").unwrap(),
      Task::post(Body::url_encoded(object(json!({ "user": "a b", "age": 3 })))),
      Some(extra),
      None,
    );

    let request = target.request();
    assert_eq!(request.headers.len(), 2);
    assert_eq!(
      request.headers[0].1,
      "application/x-www-form-urlencoded; charset=utf-8"
    );
    assert_eq!(request.headers[1].0, "Authorization");
    assert_eq!(request.body.as_deref(), Some(&b"age=3&user=a+b"[..]));
  }

  #[test]
  fn test_fingerprint_is_stable_and_distinct() {
    let a = PetApi::Show { id: 1 }.target().unwrap();
    let b = PetApi::Show { id: 1 }.target().unwrap();
    let c = PetApi::Show { id: 2 }.target().unwrap();

    assert_eq!(a.fingerprint(), b.fingerprint());
    assert_ne!(a.fingerprint(), c.fingerprint());
    assert_eq!(a.fingerprint().len(), 64);
  }

  #[test]
  fn test_target_is_its_own_group() {
    let target = PetApi::List.target().unwrap();
    assert_eq!(target.target().unwrap(), target);
    assert_eq!(target.storage_key(), target.fingerprint());
  }

  #[test]
  fn test_method_from_str() {
    assert_eq!("get".parse::<HttpMethod>().unwrap(), HttpMethod::Get);
    assert_eq!("PATCH".parse::<HttpMethod>().unwrap(), HttpMethod::Patch);
    assert!("TRACE".parse::<HttpMethod>().is_err());
  }
}
