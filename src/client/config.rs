//! Manager configuration.
//!
//! A [`ManagerConfig`] plays the role of a session configuration: it sizes the
//! scheduling queue, configures the default transport and supplies defaults
//! for requests built through the manager's convenience constructors.
//!
//! The struct deserializes from JSON with every field optional:
//!
//! ```
//! use chained_http::client::{ManagerConfig, RetryBackoff};
//!
//! let config: ManagerConfig = serde_json::from_str(
//!     r#"{"max_concurrent_tasks": 2, "retry_backoff": {"fixed": {"delay_ms": 250}}}"#,
//! ).unwrap();
//! assert_eq!(config.max_concurrent_tasks, 2);
//! assert_eq!(config.retry_backoff, RetryBackoff::Fixed { delay_ms: 250 });
//! assert_eq!(config.request_timeout_ms, 60_000);
//! ```

use crate::client::utils::exponential_backoff;
use crate::types::CachePolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Delay inserted between a failed attempt and its retry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryBackoff {
    /// Retry immediately.
    #[default]
    None,
    /// Wait the same delay before every retry.
    Fixed {
        /// Delay in milliseconds.
        delay_ms: u64,
    },
    /// Double the delay on each retry, starting at `base_ms`.
    Exponential {
        /// First delay in milliseconds.
        base_ms: u64,
    },
}

impl RetryBackoff {
    /// Delay before retry number `retry` (0 for the first retry).
    pub fn delay(&self, retry: u32) -> Duration {
        match *self {
            RetryBackoff::None => Duration::ZERO,
            RetryBackoff::Fixed { delay_ms } => Duration::from_millis(delay_ms),
            RetryBackoff::Exponential { base_ms } => exponential_backoff(retry, base_ms),
        }
    }
}

/// Configuration shared by every task a manager creates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Maximum number of attempts in flight at once.
    pub max_concurrent_tasks: usize,
    /// Whole-request timeout in milliseconds.
    pub request_timeout_ms: u64,
    /// Connection timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Idle connections kept per host (`pool_max_idle_per_host`).
    pub max_idle_per_host: usize,
    /// Proxy for all traffic; empty for none.
    pub proxy_url: String,
    /// Keep cookies between requests. Individual requests can opt out with
    /// `handle_cookies`.
    pub cookie_store: bool,
    /// `User-Agent` sent with every request.
    pub user_agent: String,
    /// Cache policy for requests built by the manager.
    pub cache_policy: CachePolicy,
    /// Delay policy between retries.
    pub retry_backoff: RetryBackoff,
    /// Emit retry warnings.
    pub enable_logging: bool,
}

impl ManagerConfig {
    /// Request timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Connect timeout as a [`Duration`].
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        ManagerConfig {
            max_concurrent_tasks: 6,
            request_timeout_ms: 60_000,
            connect_timeout_ms: 10_000,
            max_idle_per_host: 16,
            proxy_url: String::new(),
            cookie_store: false,
            user_agent: concat!("chained_http/", env!("CARGO_PKG_VERSION")).to_string(),
            cache_policy: CachePolicy::default(),
            retry_backoff: RetryBackoff::default(),
            enable_logging: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ManagerConfig::default();
        assert_eq!(config.max_concurrent_tasks, 6);
        assert_eq!(config.request_timeout(), Duration::from_secs(60));
        assert_eq!(config.retry_backoff, RetryBackoff::None);
        assert!(config.user_agent.starts_with("chained_http/"));
    }

    #[test]
    fn test_backoff_delays() {
        assert_eq!(RetryBackoff::None.delay(3), Duration::ZERO);
        assert_eq!(
            RetryBackoff::Fixed { delay_ms: 20 }.delay(2),
            Duration::from_millis(20)
        );
        assert_eq!(
            RetryBackoff::Exponential { base_ms: 100 }.delay(2),
            Duration::from_millis(400)
        );
    }

    #[test]
    fn test_partial_json() {
        let config: ManagerConfig =
            serde_json::from_str(r#"{"cache_policy": "reload_ignoring_cache"}"#).unwrap();
        assert_eq!(config.cache_policy, CachePolicy::ReloadIgnoringCache);
        assert_eq!(config.max_concurrent_tasks, 6);
    }

    #[test]
    fn test_idle_pool_size_from_json() {
        let config: ManagerConfig = serde_json::from_str(r#"{"max_idle_per_host": 4}"#).unwrap();
        assert_eq!(config.max_idle_per_host, 4);
        assert_eq!(ManagerConfig::default().max_idle_per_host, 16);
    }
}
