//! Error types for request orchestration.
//!
//! Errors fall into three families that never mix:
//!
//! | Type | Raised by | Delivered through |
//! |------|-----------|-------------------|
//! | [`TaskError`] | transport failures, cancellation, bad redirects | the task's failure interpreter |
//! | [`ContractError`] | misuse of the task/group API | the `Result` of the offending call |
//! | [`RequestError`] | building a [`RequestDescriptor`](crate::RequestDescriptor) | the builder's `Result` |
//!
//! Decode failures of the structured-data interpreter are plain
//! [`serde_json::Error`] values handed to that interpreter only; they are
//! never promoted to a task failure.

use thiserror::Error;

/// Convenient result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error returned by synchronous API calls.
#[derive(Debug, Error)]
pub enum Error {
    /// The API was used in a way its contract forbids.
    #[error(transparent)]
    Contract(#[from] ContractError),

    /// A request descriptor could not be built.
    #[error(transparent)]
    Request(#[from] RequestError),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client error: {0}")]
    Client(String),

    /// No tokio runtime was available to schedule tasks on.
    #[error("no tokio runtime available")]
    NoRuntime,
}

/// Terminal error of a request task.
///
/// Only the last attempt's error reaches the failure interpreter; earlier
/// failures are consumed by the retry policy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// The connection could not be established.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The exchange exceeded its timeout.
    #[error("request timed out")]
    Timeout,

    /// Any other transport-level failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The task, its group, or the transport cancelled the exchange.
    #[error("request cancelled")]
    Cancelled,

    /// The redirect policy produced a request that cannot be sent.
    #[error("invalid redirect request: {0}")]
    InvalidRedirect(String),

    /// The exchange kept redirecting past the redirect limit.
    #[error("too many redirects ({0})")]
    TooManyRedirects(usize),

    /// The transport closed the event stream without a completion event.
    #[error("transport closed the exchange without completing it")]
    Incomplete,
}

impl TaskError {
    /// Whether this error came from cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskError::Cancelled)
    }

    /// Whether another attempt may be made after this error.
    ///
    /// Redirect-policy failures end the task without consuming a retry.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TaskError::InvalidRedirect(_))
    }
}

/// Violations of the task and group API contracts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractError {
    /// The task was already started (or already resolved).
    #[error("task has already been started")]
    AlreadyStarted,

    /// The named registration was already made on this task.
    #[error("{0} is already registered on this task")]
    AlreadyRegistered(&'static str),

    /// Retry budgets are limited to 1, 2 or 3 attempts.
    #[error("retry budget must be 1, 2 or 3, got {0}")]
    InvalidRetryBudget(u8),

    /// A task group needs at least one member.
    #[error("a task group needs at least one task")]
    EmptyGroup,

    /// The task already belongs to a task group.
    #[error("task already belongs to a task group")]
    AlreadyGrouped,
}

/// Errors raised while building a request descriptor.
#[derive(Debug, Error)]
pub enum RequestError {
    /// The address is not a valid absolute URL.
    #[error("invalid URL {url:?}: {reason}")]
    InvalidUrl {
        /// The rejected address.
        url: String,
        /// Parser message.
        reason: String,
    },

    /// Only `http` and `https` addresses can be requested.
    #[error("unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    /// A header name or value is not valid HTTP.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// The JSON body could not be encoded.
    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redirect_errors_are_not_retryable() {
        assert!(!TaskError::InvalidRedirect("missing host".into()).is_retryable());
        assert!(TaskError::Timeout.is_retryable());
        assert!(TaskError::Cancelled.is_retryable());
    }

    #[test]
    fn test_contract_error_converts_into_crate_error() {
        let err: Error = ContractError::InvalidRetryBudget(4).into();
        assert!(matches!(
            err,
            Error::Contract(ContractError::InvalidRetryBudget(4))
        ));
        assert_eq!(err.to_string(), "retry budget must be 1, 2 or 3, got 4");
    }
}
