//! Side-channel listeners notified of every exchange attempt.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::response::{CoreError, CoreResponse};
use crate::target::OutgoingRequest;

/// Receives request lifecycle events. Never consulted for control flow.
pub trait Observer: Send + Sync {
  fn will_send(&self, request: &OutgoingRequest);

  fn did_receive(&self, outcome: Result<&CoreResponse, &CoreError>);
}

/// Ordered list of observers, notified synchronously in list order.
///
/// A panicking observer is logged and skipped; the remaining observers and
/// the request itself are unaffected.
#[derive(Clone, Default)]
pub struct Observers {
  inner: Vec<Arc<dyn Observer>>,
}

impl Observers {
  pub fn new(observers: Vec<Arc<dyn Observer>>) -> Self {
    Self { inner: observers }
  }

  pub fn push(&mut self, observer: Arc<dyn Observer>) {
    self.inner.push(observer);
  }

  pub fn len(&self) -> usize {
    self.inner.len()
  }

  pub fn is_empty(&self) -> bool {
    self.inner.is_empty()
  }

  pub fn publish_request(&self, request: &OutgoingRequest) {
    self.each(|observer| observer.will_send(request));
  }

  pub fn publish_response(&self, response: &CoreResponse) {
    self.each(|observer| observer.did_receive(Ok(response)));
  }

  pub fn publish_error(&self, error: &CoreError) {
    self.each(|observer| observer.did_receive(Err(error)));
  }

  pub fn publish_outcome(&self, outcome: &Result<CoreResponse, CoreError>) {
    match outcome {
      Ok(response) => self.publish_response(response),
      Err(error) => self.publish_error(error),
    }
  }

  fn each(&self, notify: impl Fn(&dyn Observer)) {
    for (index, observer) in self.inner.iter().enumerate() {
      if catch_unwind(AssertUnwindSafe(|| notify(observer.as_ref()))).is_err() {
        error!(observer = index, "observer panicked while handling an event");
      }
    }
  }
}

impl std::fmt::Debug for Observers {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Observers")
      .field("len", &self.inner.len())
      .finish()
  }
}

impl From<Vec<Arc<dyn Observer>>> for Observers {
  fn from(observers: Vec<Arc<dyn Observer>>) -> Self {
    Self::new(observers)
  }
}

/// Logs every event through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl Observer for TracingObserver {
  fn will_send(&self, request: &OutgoingRequest) {
    debug!(method = %request.method, url = %request.url, "sending request");
  }

  fn did_receive(&self, outcome: Result<&CoreResponse, &CoreError>) {
    match outcome {
      Ok(response) => debug!(
        status = ?response.status_code,
        bytes = response.body.len(),
        "received response"
      ),
      Err(err) => warn!(status = ?err.status_code, error = %err.error, "request failed"),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::Error;
  use crate::response::Header;
  use crate::testing::RecordingObserver;
  use crate::target::{Target, Task};

  struct PanickingObserver;

  impl Observer for PanickingObserver {
    fn will_send(&self, _request: &OutgoingRequest) {
      panic!("will_send");
    }

    fn did_receive(&self, _outcome: Result<&CoreResponse, &CoreError>) {
      panic!("did_receive");
    }
  }

  fn request() -> OutgoingRequest {
    Target::new(
      Target::resolve("https://a.example.com", "x").unwrap(),
      Task::get(),
      None,
      None,
    )
    .request()
  }

  #[test]
  fn test_publishes_in_order() {
    let first = Arc::new(RecordingObserver::default());
    let second = Arc::new(RecordingObserver::default());
    let observers = Observers::new(vec![first.clone(), second.clone()]);

    observers.publish_request(&request());
    observers.publish_response(&CoreResponse::new(Some(200), Header::default(), Vec::new()));
    observers.publish_error(&CoreError::with_status(404, Error::ForcedFailure));

    assert_eq!(first.events(), vec!["send", "response 200", "error 404"]);
    assert_eq!(second.events(), first.events());
  }

  #[test]
  fn test_panicking_observer_is_isolated() {
    let after = Arc::new(RecordingObserver::default());
    let observers = Observers::new(vec![Arc::new(PanickingObserver), after.clone()]);

    observers.publish_request(&request());
    observers.publish_error(&CoreError::from(Error::NoSampleData));

    assert_eq!(after.events(), vec!["send", "error -"]);
  }

  #[test]
  fn test_publish_outcome_routes_by_variant() {
    let recorder = Arc::new(RecordingObserver::default());
    let observers = Observers::new(vec![recorder.clone()]);

    observers.publish_outcome(&Ok(CoreResponse::new(Some(201), Header::default(), Vec::new())));
    observers.publish_outcome(&Err(CoreError::with_status(500, Error::Status(500))));

    assert_eq!(recorder.events(), vec!["response 201", "error 500"]);
  }
}
