//! Utility functions for tasks and transports.
//!
//! - Retry delay calculation
//! - Redirect classification, method rewriting and `Location` resolution
//! - Text decoding for the text interpreter

use http::Method;
use std::time::Duration;
use url::Url;

/// Exponential backoff delay calculation.
///
/// The exponent is capped at 10 so the delay cannot overflow.
pub fn exponential_backoff(attempt: u32, base_ms: u64) -> Duration {
    let delay_ms = base_ms.saturating_mul(2_u64.pow(attempt.min(10)));
    Duration::from_millis(delay_ms)
}

/// Check if a status code is a redirect the transport should surface.
pub fn is_redirect_status(status: u16) -> bool {
    matches!(status, 301 | 302 | 303 | 307 | 308)
}

/// Method to use when following a redirect.
///
/// 303 always becomes GET; 301 and 302 turn POST into GET; 307 and 308
/// keep the original method.
pub fn redirect_method(status: u16, method: &Method) -> Method {
    match status {
        303 if *method != Method::HEAD => Method::GET,
        301 | 302 if *method == Method::POST => Method::GET,
        _ => method.clone(),
    }
}

/// Whether the request body survives a redirect with this status.
pub fn redirect_keeps_body(status: u16) -> bool {
    matches!(status, 307 | 308)
}

/// Resolve a `Location` header against the URL that produced it.
pub fn resolve_location(base: &str, location: &str) -> Option<String> {
    let base = Url::parse(base).ok()?;
    base.join(location).ok().map(String::from)
}

/// Decode a body as UTF-8 text.
///
/// Invalid UTF-8 yields an empty string; the bytes themselves were received
/// fine, so this is not a task failure.
pub fn decode_text(body: &[u8]) -> String {
    match std::str::from_utf8(body) {
        Ok(text) => text.to_string(),
        Err(e) => {
            tracing::debug!(error = %e, "Response body is not valid UTF-8");
            String::new()
        }
    }
}
