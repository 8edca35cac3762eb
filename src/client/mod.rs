//! Request orchestration.
//!
//! This module provides the task engine that sits on top of a
//! [`Transport`](crate::transport::Transport), enabling callers to:
//!
//! - **Create request tasks** from descriptors or URL + parameters
//! - **Rewrite redirects** before they are followed
//! - **Interpret responses** as raw bytes, text or JSON
//! - **Retry failed requests** up to three attempts
//! - **Chain follow-up requests** through another manager
//! - **Wait for batches** of tasks to finish
//!
//! # Module Organization
//!
//! ```text
//! client/
//! ├── manager   - NetworkManager task factory
//! ├── task      - NetworkTask state machine
//! ├── group     - TaskGroup batch completion
//! ├── interpret - Response interpreters
//! ├── request   - RequestDescriptor builder
//! ├── config    - Manager configuration
//! └── utils     - Utility functions
//! ```
//!
//! # Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`NetworkManager`] | Creates tasks bound to one configuration |
//! | [`NetworkTask`] | One logical request with retries and redirects |
//! | [`TaskGroup`] | Completion callback for a set of tasks |
//! | [`RequestBuilder`] | Fluent request construction |
//! | [`ManagerConfig`] | Manager configuration options |
//!
//! # Examples
//!
//! ## Creating a Manager
//!
//! ```ignore
//! use chained_http::client::{ManagerConfig, NetworkManager, RetryBackoff};
//!
//! // Default configuration
//! let manager = NetworkManager::new(ManagerConfig::default())?;
//!
//! // Custom configuration
//! let config = ManagerConfig {
//!     max_concurrent_tasks: 2,
//!     retry_backoff: RetryBackoff::Exponential { base_ms: 200 },
//!     ..Default::default()
//! };
//! let manager = NetworkManager::new(config)?;
//! ```
//!
//! ## Utility Functions
//!
//! ```
//! use chained_http::client::{exponential_backoff, is_redirect_status};
//! use std::time::Duration;
//!
//! assert!(is_redirect_status(302));
//! assert!(!is_redirect_status(304));
//!
//! let delay = exponential_backoff(2, 100);
//! assert_eq!(delay, Duration::from_millis(400));
//! ```

mod config;
mod group;
mod interpret;
mod manager;
mod request;
mod task;
pub(crate) mod utils;

pub use config::{ManagerConfig, RetryBackoff};
pub use group::{GroupId, TaskGroup};
pub use manager::NetworkManager;
pub use request::RequestBuilder;
pub use task::{NetworkTask, MAX_REDIRECTS};
pub use utils::{exponential_backoff, is_redirect_status, redirect_method};
