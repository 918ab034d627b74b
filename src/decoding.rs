//! JSON decoding with selectable key naming conventions.

use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{Map, Value};

/// How wire field names are mapped before decoding into a model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyDecoding {
  /// Use the keys exactly as they appear on the wire.
  #[default]
  Exact,
  /// `first_name` becomes `firstName`.
  ConvertFromSnakeCase,
  /// `firstName` becomes `first_name`.
  ConvertFromCamelCase,
}

/// Decode `bytes` as `M`, rewriting every object key first if requested.
pub fn decode<M: DeserializeOwned>(bytes: &[u8], keys: KeyDecoding) -> serde_json::Result<M> {
  match keys {
    KeyDecoding::Exact => serde_json::from_slice(bytes),
    KeyDecoding::ConvertFromSnakeCase => {
      let value: Value = serde_json::from_slice(bytes)?;
      serde_json::from_value(rewrite_keys(value, &snake_to_camel))
    }
    KeyDecoding::ConvertFromCamelCase => {
      let value: Value = serde_json::from_slice(bytes)?;
      serde_json::from_value(rewrite_keys(value, &camel_to_snake))
    }
  }
}

fn rewrite_keys(value: Value, rename: &dyn Fn(&str) -> String) -> Value {
  match value {
    Value::Object(map) => Value::Object(
      map
        .into_iter()
        .map(|(key, value)| (rename(&key), rewrite_keys(value, rename)))
        .collect::<Map<String, Value>>(),
    ),
    Value::Array(items) => Value::Array(
      items
        .into_iter()
        .map(|item| rewrite_keys(item, rename))
        .collect(),
    ),
    other => other,
  }
}

/// Leading and trailing underscores are kept as-is.
fn snake_to_camel(key: &str) -> String {
  let core = key.trim_matches('_');
  if core.is_empty() || !core.contains('_') {
    return key.to_string();
  }

  let leading = &key[..key.len() - key.trim_start_matches('_').len()];
  let trailing = &key[key.trim_end_matches('_').len()..];

  let mut out = String::with_capacity(key.len());
  out.push_str(leading);
  for (i, part) in core.split('_').filter(|p| !p.is_empty()).enumerate() {
    if i == 0 {
      out.push_str(part);
      continue;
    }
    let mut chars = part.chars();
    if let Some(first) = chars.next() {
      out.extend(first.to_uppercase());
      out.push_str(chars.as_str());
    }
  }
  out.push_str(trailing);
  out
}

/// Acronyms stay together: `userID` -> `user_id`, `HTTPServer` -> `http_server`.
fn camel_to_snake(key: &str) -> String {
  let chars: Vec<char> = key.chars().collect();
  let mut out = String::with_capacity(key.len() + 4);

  for (i, &c) in chars.iter().enumerate() {
    if c.is_uppercase() {
      let prev = i.checked_sub(1).map(|p| chars[p]);
      let next = chars.get(i + 1).copied();
      let boundary = match prev {
        Some('_') => false,
        Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
        Some(p) if p.is_uppercase() => next.is_some_and(|n| n.is_lowercase()),
        _ => false,
      };
      if boundary {
        out.push('_');
      }
      out.extend(c.to_lowercase());
    } else {
      out.push(c);
    }
  }
  out
}
