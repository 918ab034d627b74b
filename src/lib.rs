//! Declarative HTTP request dispatch.
//!
//! Callers describe endpoints with [`TargetGroup`] and hand them to a
//! [`RequestHandler`], which:
//! - Serves still-valid responses from an optional [`cache`] storage
//! - Retries live requests a bounded number of times
//! - Can answer from canned sample payloads, or fail every request on purpose
//! - Decodes bodies into caller models with a chosen key convention
//! - Reports every live exchange to registered [`Observer`]s

pub mod cache;
pub mod config;
pub mod decoding;
pub mod error;
pub mod handler;
pub mod observer;
pub mod response;
pub mod target;
pub mod transport;

#[cfg(test)]
mod testing;

pub use decoding::KeyDecoding;
pub use error::Error;
pub use handler::{valid_for, DecodeAs, RequestHandler, RequestHandlerBuilder, ResponseMode, ValidUntil};
pub use observer::{Observer, Observers, TracingObserver};
pub use response::{CoreError, CoreResponse, DecodedResponse, Header};
pub use target::{Body, HttpMethod, OutgoingRequest, Target, TargetGroup, Task};
pub use transport::{ReqwestTransport, Transport};
