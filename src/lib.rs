#![warn(missing_docs)]

//! # Chained HTTP: request orchestration
//!
//! This crate sits above an HTTP transport and manages the lifecycle of
//! individual requests: dispatch, redirect rewriting, body accumulation,
//! response interpretation, bounded retries and chained follow-ups. It also
//! coordinates batches of independently retrying requests.
//!
//! ## Overview
//!
//! 1. **Transport** - performs one exchange and emits redirect, data and completion events
//! 2. **Request Task** - drives exchanges for one logical request and reports one outcome
//! 3. **Task Group** - calls back once every member task is terminal
//! 4. **Manager** - creates tasks bound to a configuration and scheduling queue
//!
//! ## Usage
//!
//! ```ignore
//! use chained_http::{ManagerConfig, NetworkManager};
//! use serde_json::{json, Value};
//!
//! #[tokio::main]
//! async fn main() -> chained_http::Result<()> {
//!     let manager = NetworkManager::new(ManagerConfig::default())?;
//!
//!     let task = manager
//!         .get("https://httpbin.org/get", Some(&json!({"q": "rust"})))?
//!         .retry_count(3)?
//!         .on_json(|head, body: Result<Value, _>| println!("{} {:?}", head.status, body))?
//!         .on_failure(|error| eprintln!("request failed: {error}"))?;
//!
//!     task.start()?;
//!     task.wait().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Error Visibility
//!
//! Errors stay with the task that produced them. A task without a failure
//! interpreter drops its terminal error silently, and a task group reports
//! only completion, never member errors.
//!
//! ## Module Structure
//!
//! - **[types]** - Request descriptors, response heads, task states
//! - **[error]** - Error types and result handling
//! - **[client]** - Managers, tasks, groups and request building
//! - **[transport]** - Transport trait and the `reqwest` transport
//! - **[protocol]** - Query-string and JSON body encoding

pub mod client;
pub mod error;
pub mod protocol;
pub mod transport;
pub mod types;

pub use client::{ManagerConfig, NetworkManager, NetworkTask, RequestBuilder, TaskGroup};
pub use error::{ContractError, Error, RequestError, Result, TaskError};
pub use types::{CachePolicy, RedirectResponse, RequestDescriptor, ResponseHead, TaskId, TaskState};
