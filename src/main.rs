use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use lynn::config::{Config, LogConfig};
use lynn::{
  valid_for, Body, CoreResponse, HttpMethod, ResponseMode, TargetGroup, Task, ValidUntil,
};

#[derive(Parser, Debug)]
#[command(name = "lynn")]
#[command(about = "Send an HTTP request through a caching, retrying request handler")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/lynn/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Response mode: normal, always-live, sample or always-fail
  #[arg(short, long)]
  mode: Option<ResponseMode>,

  /// Attempts per live request (0 sends nothing)
  #[arg(short, long)]
  retries: Option<usize>,

  /// Base URL of the service
  url: String,

  /// Path appended to the base URL
  #[arg(short, long, default_value = "")]
  path: String,

  #[arg(short = 'X', long, default_value = "GET")]
  method: HttpMethod,

  /// Query parameter as KEY=VALUE
  #[arg(short = 'q', long = "query", value_parser = parse_query)]
  query: Vec<(String, String)>,

  /// Request header as NAME:VALUE
  #[arg(short = 'H', long = "header", value_parser = parse_header)]
  headers: Vec<(String, String)>,

  /// Body field as KEY=VALUE (sent as JSON unless --form)
  #[arg(short = 'd', long = "data", value_parser = parse_query)]
  data: Vec<(String, String)>,

  /// Send body fields URL-encoded
  #[arg(long)]
  form: bool,

  /// Cache the response for this many seconds
  #[arg(long)]
  cache_for: Option<i64>,

  /// Cache key (default: fingerprint of method, URL and body)
  #[arg(long)]
  key: Option<String>,

  /// File served as the response body in sample mode
  #[arg(long)]
  sample: Option<PathBuf>,
}

fn parse_pair(s: &str, sep: char) -> Result<(String, String), String> {
  let (key, value) = s
    .split_once(sep)
    .ok_or_else(|| format!("expected KEY{}VALUE, got '{}'", sep, s))?;
  Ok((key.trim().to_string(), value.trim().to_string()))
}

fn parse_query(s: &str) -> Result<(String, String), String> {
  parse_pair(s, '=')
}

fn parse_header(s: &str) -> Result<(String, String), String> {
  parse_pair(s, ':')
}

/// A single ad-hoc endpoint assembled from the command line.
struct CliRequest {
  base_url: String,
  path: String,
  task: Task,
  headers: BTreeMap<String, String>,
  key: String,
  sample: Option<Vec<u8>>,
}

impl CliRequest {
  fn from_args(args: &Args) -> Result<Self> {
    let mut task = Task::new(args.method);
    for (key, value) in &args.query {
      task = task.with_parameter(key.clone(), value.clone());
    }
    if !args.data.is_empty() {
      let content: Map<String, Value> = args
        .data
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
      task = task.with_body(if args.form {
        Body::url_encoded(content)
      } else {
        Body::json(content)
      });
    }

    let sample = match &args.sample {
      Some(path) => Some(
        std::fs::read(path)
          .map_err(|e| eyre!("Failed to read sample file {}: {}", path.display(), e))?,
      ),
      None => None,
    };

    let mut request = Self {
      base_url: args.url.clone(),
      path: args.path.clone(),
      task,
      headers: args.headers.iter().cloned().collect(),
      key: String::new(),
      sample,
    };
    request.key = match &args.key {
      Some(key) => key.clone(),
      None => request.target()?.fingerprint(),
    };

    Ok(request)
  }
}

impl TargetGroup for CliRequest {
  fn base_url(&self) -> &str {
    &self.base_url
  }

  fn path(&self) -> String {
    self.path.clone()
  }

  fn task(&self) -> Task {
    self.task.clone()
  }

  fn headers(&self) -> Option<BTreeMap<String, String>> {
    Some(self.headers.clone()).filter(|h| !h.is_empty())
  }

  fn storage_key(&self) -> String {
    self.key.clone()
  }

  fn sample_data(&self) -> Option<Vec<u8>> {
    self.sample.clone()
  }
}

/// Initialize tracing. RUST_LOG wins over the configured level.
///
/// The returned guard must live until exit so buffered log lines are flushed.
fn init_tracing(log: &LogConfig) -> Result<Option<WorkerGuard>> {
  let filter = EnvFilter::try_from_default_env()
    .or_else(|_| EnvFilter::try_new(&log.level))
    .map_err(|e| eyre!("Invalid log level '{}': {}", log.level, e))?;

  match &log.directory {
    Some(directory) => {
      let appender = tracing_appender::rolling::daily(directory, "lynn.log");
      let (writer, guard) = tracing_appender::non_blocking(appender);
      tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
      Ok(Some(guard))
    }
    None => {
      tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
      Ok(None)
    }
  }
}

fn cache_ttl(secs: i64) -> Result<chrono::Duration> {
  chrono::Duration::try_seconds(secs)
    .ok_or_else(|| eyre!("--cache-for {} is out of range", secs))
}

fn print_response(response: &CoreResponse) {
  match response.status_code {
    Some(code) => println!("HTTP {}", code),
    None => println!("HTTP -"),
  }
  if !response.header.is_empty() {
    println!("{}", response.header);
  }
  println!();
  println!("{}", response.text());
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Command line overrides the config file
  let mut config = Config::load(args.config.as_deref())?;
  if let Some(mode) = args.mode {
    config.handler.response_mode = mode;
  }
  if let Some(retries) = args.retries {
    config.handler.max_retries = retries;
  }

  let _guard = init_tracing(&config.log)?;

  let handler = config.build_handler()?;
  let request = CliRequest::from_args(&args)?;
  let valid_until = args
    .cache_for
    .map(cache_ttl)
    .transpose()?
    .map(valid_for::<CoreResponse>);

  let mut delivered = 0;
  let mut failure = None;
  handler
    .dispatch(
      &request,
      valid_until.as_ref().map(|f| f as ValidUntil<'_, CoreResponse>),
      |response| {
        if delivered > 0 {
          println!();
        }
        delivered += 1;
        print_response(&response);
      },
      |err| failure = Some(err),
    )
    .await;

  if let Some(err) = failure {
    return Err(eyre!("Request failed: {}", err));
  }
  if delivered == 0 {
    return Err(eyre!("Nothing was dispatched (max_retries is 0)"));
  }

  Ok(())
}
