//! The transport boundary.
//!
//! A [`Transport`] performs one network exchange per [`send`](Transport::send)
//! call and reports its progress as a stream of [`TransportEvent`]s. Request
//! tasks sit on top of this stream; they never touch sockets themselves.
//!
//! # Event Ordering
//!
//! For a single exchange the stream yields, in order:
//!
//! 1. either one [`TransportEvent::Redirect`], after which the stream ends, or
//! 2. zero or more [`TransportEvent::Data`] chunks followed by exactly one
//!    [`TransportEvent::Complete`].
//!
//! Dropping the stream cancels the exchange.
//!
//! # Implementations
//!
//! | Type | Description |
//! |------|-------------|
//! | [`ReqwestTransport`] | Default transport backed by `reqwest` |

mod network;

pub use network::ReqwestTransport;

use crate::error::TaskError;
use crate::types::{RedirectResponse, RequestDescriptor, ResponseHead};
use bytes::Bytes;
use futures::stream::BoxStream;

/// Stream of events for one exchange.
pub type EventStream = BoxStream<'static, TransportEvent>;

/// Lifecycle event emitted by a transport exchange.
#[derive(Debug)]
pub enum TransportEvent {
    /// The server answered with a redirect. The exchange ends here; the task
    /// decides which request, if any, to send next.
    Redirect(RedirectResponse),
    /// A chunk of response body.
    Data(Bytes),
    /// The exchange finished, successfully or not.
    Complete(Result<ResponseHead, TaskError>),
}

/// Capability that performs network exchanges.
pub trait Transport: Send + Sync + 'static {
    /// Begin an exchange for `request`.
    ///
    /// Must not block; all progress is reported through the returned stream.
    fn send(&self, request: &RequestDescriptor) -> EventStream;
}
