//! The capability that performs one network exchange.

mod client;

use std::future::Future;

use crate::observer::Observers;
use crate::response::{CoreError, CoreResponse};
use crate::target::{OutgoingRequest, Target};

pub use client::{ReqwestTransport, ReqwestTransportBuilder};

/// Performs exchanges for the dispatch pipeline.
///
/// Implementors only provide [`Transport::exchange`]; [`Transport::send`]
/// wraps it with observer notifications. Either future resolves exactly once,
/// with a response or an error.
pub trait Transport: Send + Sync {
  /// Put `request` on the wire and collect the outcome.
  fn exchange(
    &self,
    request: &OutgoingRequest,
  ) -> impl Future<Output = Result<CoreResponse, CoreError>> + Send;

  /// Build the request for `target` and exchange it.
  ///
  /// Observers hear "about to send" before the exchange and its outcome
  /// after it, before the outcome is returned.
  fn send(
    &self,
    target: &Target,
    observers: &Observers,
  ) -> impl Future<Output = Result<CoreResponse, CoreError>> + Send {
    async move {
      let request = target.request();
      observers.publish_request(&request);
      let outcome = self.exchange(&request).await;
      observers.publish_outcome(&outcome);
      outcome
    }
  }
}
