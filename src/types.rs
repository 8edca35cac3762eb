//! Core value types shared by managers, tasks and transports.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`RequestDescriptor`] | Immutable outbound request |
//! | [`CachePolicy`] | Cache behaviour forwarded to the transport |
//! | [`ResponseHead`] | Status line and headers of a completed exchange |
//! | [`RedirectResponse`] | A redirect offered by the transport |
//! | [`TaskState`] | Lifecycle position of a request task |
//! | [`TaskId`] | Identity of a request task |

use crate::error::RequestError;
use bytes::Bytes;
use http::Method;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use url::Url;
use uuid::Uuid;

/// Unique identity of a request task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(Uuid);

impl TaskId {
    pub(crate) fn new() -> Self {
        TaskId(Uuid::new_v4())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// How the transport should treat cached responses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    /// Let the transport apply its normal caching rules.
    #[default]
    UseProtocolPolicy,
    /// Always fetch from the origin.
    ReloadIgnoringCache,
    /// Prefer a cached response, even a stale one.
    ReturnCacheElseLoad,
}

/// A fully-formed outbound request.
///
/// Tasks never mutate a descriptor; a redirect produces a replacement.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    /// Target address.
    pub url: String,
    /// HTTP method.
    pub method: Method,
    /// Request headers, keyed by name.
    pub headers: BTreeMap<String, String>,
    /// Optional request body.
    pub body: Option<Bytes>,
    /// Cache behaviour.
    pub cache_policy: CachePolicy,
    /// Per-request timeout; the transport default applies when `None`.
    pub timeout: Option<Duration>,
    /// Send and store cookies for this request. Only meaningful when the
    /// manager keeps a cookie store.
    pub handle_cookies: bool,
}

impl RequestDescriptor {
    /// A bodiless GET for `url` with default settings.
    pub fn get(url: impl Into<String>) -> Self {
        RequestDescriptor {
            url: url.into(),
            method: Method::GET,
            headers: BTreeMap::new(),
            body: None,
            cache_policy: CachePolicy::default(),
            timeout: None,
            handle_cookies: true,
        }
    }

    /// Check that the descriptor can be handed to a transport.
    ///
    /// The address must parse as an absolute `http` or `https` URL with a host.
    pub fn validate(&self) -> Result<Url, RequestError> {
        let parsed = Url::parse(&self.url).map_err(|e| RequestError::InvalidUrl {
            url: self.url.clone(),
            reason: e.to_string(),
        })?;
        match parsed.scheme() {
            "http" | "https" => {}
            other => return Err(RequestError::UnsupportedScheme(other.to_string())),
        }
        if parsed.host_str().map_or(true, str::is_empty) {
            return Err(RequestError::InvalidUrl {
                url: self.url.clone(),
                reason: "missing host".to_string(),
            });
        }
        Ok(parsed)
    }
}

/// Status line and headers of a finished exchange.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResponseHead {
    /// Final URL after redirects.
    pub url: String,
    /// HTTP status code.
    pub status: u16,
    /// Response headers (names lowercased).
    pub headers: BTreeMap<String, String>,
}

impl ResponseHead {
    /// Whether the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A redirect offered by the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct RedirectResponse {
    /// Redirect status code (301, 302, 303, 307, 308).
    pub status: u16,
    /// Raw `Location` value.
    pub location: String,
    /// Headers of the redirect response.
    pub headers: BTreeMap<String, String>,
    /// The request the transport would issue if the redirect is followed as-is.
    pub proposed: RequestDescriptor,
}

/// Lifecycle position of a request task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// Configured but not started.
    Idle,
    /// An attempt is in progress.
    InFlight,
    /// A redirect is being resolved.
    Redirecting,
    /// The response was delivered to the interpreters.
    Succeeded,
    /// The last attempt failed; a retry decision is pending.
    Failed,
    /// Waiting to begin the next attempt.
    Retrying,
    /// Retries are used up or the task was cancelled.
    Exhausted,
}

impl TaskState {
    /// `Succeeded` and `Exhausted` are terminal.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::Exhausted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_http_urls() {
        let req = RequestDescriptor::get("https://example.com/a?b=c");
        let url = req.validate().unwrap();
        assert_eq!(url.host_str(), Some("example.com"));
    }

    #[test]
    fn test_validate_rejects_malformed_addresses() {
        assert!(matches!(
            RequestDescriptor::get("").validate(),
            Err(RequestError::InvalidUrl { .. })
        ));
        assert!(matches!(
            RequestDescriptor::get("ftp://example.com/file").validate(),
            Err(RequestError::UnsupportedScheme(scheme)) if scheme == "ftp"
        ));
    }

    #[test]
    fn test_terminal_states() {
        assert!(TaskState::Succeeded.is_terminal());
        assert!(TaskState::Exhausted.is_terminal());
        assert!(!TaskState::Failed.is_terminal());
        assert!(!TaskState::Retrying.is_terminal());
    }
}
