//! Task factory.
//!
//! A [`NetworkManager`] holds a configuration, a transport, a concurrency
//! limit and the runtime tasks are scheduled on. Every task it creates is
//! bound to those and tracked until it becomes terminal.
//!
//! There is no process-wide default manager; create one and pass it around.
//! Handles are cheap to clone.
//!
//! # Examples
//!
//! ## Simple GET request
//!
//! ```ignore
//! use chained_http::{ManagerConfig, NetworkManager};
//!
//! #[tokio::main]
//! async fn main() -> chained_http::Result<()> {
//!     let manager = NetworkManager::new(ManagerConfig::default())?;
//!     let task = manager
//!         .get("http://example.com/api/data", None)?
//!         .on_text(|head, text| println!("{}: {}", head.status, text))?;
//!     task.start()?;
//!     task.wait().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Chained follow-up request
//!
//! ```ignore
//! let login = manager
//!     .post_json("https://api.example.com/login", &json!({"user": "ann"}))?
//!     .next(&manager, |next, _head, body| {
//!         let token = String::from_utf8_lossy(body).to_string();
//!         let request = RequestBuilder::new("https://api.example.com/me")
//!             .with_header("Authorization", format!("Bearer {token}"))
//!             .build()
//!             .ok()?;
//!         Some(next.request(request))
//!     })?;
//! login.start()?;
//! ```

use crate::client::config::ManagerConfig;
use crate::client::group::TaskGroup;
use crate::client::request::RequestBuilder;
use crate::client::task::{NetworkTask, TaskContext, WeakTask};
use crate::error::{Error, Result};
use crate::transport::{ReqwestTransport, Transport};
use crate::types::{RequestDescriptor, TaskId};
use http::Method;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::sync::Semaphore;

pub(crate) struct ManagerInner {
    config: ManagerConfig,
    transport: Arc<dyn Transport>,
    limiter: Arc<Semaphore>,
    runtime: Handle,
    tasks: Mutex<HashMap<TaskId, WeakTask>>,
}

impl ManagerInner {
    pub(crate) fn deregister(&self, id: TaskId) {
        self.tasks.lock().remove(&id);
    }
}

/// Factory for request tasks sharing one configuration.
#[derive(Clone)]
pub struct NetworkManager {
    inner: Arc<ManagerInner>,
}

impl std::fmt::Debug for NetworkManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkManager")
            .field("config", &self.inner.config)
            .field("outstanding_tasks", &self.inner.tasks.lock().len())
            .finish()
    }
}

impl NetworkManager {
    /// Create a manager using the `reqwest` transport on the current tokio runtime.
    pub fn new(config: ManagerConfig) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| Error::NoRuntime)?;
        let transport = ReqwestTransport::new(&config)?;
        Ok(Self::with_transport(config, Arc::new(transport), runtime))
    }

    /// Create a manager with an explicit transport and runtime.
    ///
    /// `runtime` is the scheduling queue: task drivers and group completion
    /// callbacks run there.
    pub fn with_transport(config: ManagerConfig, transport: Arc<dyn Transport>, runtime: Handle) -> Self {
        let permits = config.max_concurrent_tasks.max(1);
        NetworkManager {
            inner: Arc::new(ManagerInner {
                config,
                transport,
                limiter: Arc::new(Semaphore::new(permits)),
                runtime,
                tasks: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<ManagerInner>) -> Self {
        NetworkManager { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<ManagerInner> {
        Arc::downgrade(&self.inner)
    }

    /// The manager configuration.
    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    // ========== Task Construction ==========

    /// Create a task for a fully-formed request.
    pub fn request(&self, request: RequestDescriptor) -> NetworkTask {
        let context = TaskContext {
            transport: Arc::clone(&self.inner.transport),
            limiter: Arc::clone(&self.inner.limiter),
            runtime: self.inner.runtime.clone(),
            backoff: self.inner.config.retry_backoff,
            enable_logging: self.inner.config.enable_logging,
            manager: self.downgrade(),
        };
        let task = NetworkTask::new(request, context);
        tracing::trace!(task_id = %task.id(), url = %task.request().url, "Task created");
        self.inner.tasks.lock().insert(task.id(), task.downgrade());
        task
    }

    /// Create a task from a request produced by `make`.
    pub fn make_request<F>(&self, make: F) -> NetworkTask
    where
        F: FnOnce() -> RequestDescriptor,
    {
        self.request(make())
    }

    /// GET `url`, with `params` encoded into the query string.
    pub fn get(&self, url: &str, params: Option<&Value>) -> Result<NetworkTask> {
        let mut builder = self.builder(url, Method::GET);
        if let Some(params) = params {
            builder = builder.with_query(params);
        }
        Ok(self.request(builder.build()?))
    }

    /// POST `url`, with `params` sent as a form-encoded body.
    pub fn post(&self, url: &str, params: Option<&Value>) -> Result<NetworkTask> {
        let mut builder = self.builder(url, Method::POST);
        if let Some(params) = params {
            builder = builder.with_form(params);
        }
        Ok(self.request(builder.build()?))
    }

    /// POST `url`, with `params` sent as a JSON body.
    pub fn post_json(&self, url: &str, params: &Value) -> Result<NetworkTask> {
        let builder = self.builder(url, Method::POST).with_json(params);
        Ok(self.request(builder.build()?))
    }

    fn builder(&self, url: &str, method: Method) -> RequestBuilder {
        let config = &self.inner.config;
        RequestBuilder::new(url)
            .with_method(method)
            .with_user_agent(config.user_agent.as_str())
            .with_cache_policy(config.cache_policy)
            .with_timeout(config.request_timeout())
    }

    // ========== Introspection and Batches ==========

    /// Tasks created by this manager that are not yet terminal.
    ///
    /// Only weak references are kept: an unstarted task whose handles have
    /// all been dropped is no longer listed.
    pub fn all_tasks(&self) -> Vec<NetworkTask> {
        let mut tasks = self.inner.tasks.lock();
        let mut live = Vec::with_capacity(tasks.len());
        tasks.retain(|_, task| match task.upgrade() {
            Some(task) => {
                live.push(task);
                true
            }
            None => false,
        });
        live
    }

    /// Start `tasks` and call `on_finish` once all of them are terminal.
    ///
    /// The tasks must not have been started. An empty set is rejected with
    /// [`ContractError::EmptyGroup`](crate::ContractError::EmptyGroup).
    /// `on_finish` runs on this manager's runtime.
    pub fn group<F>(&self, tasks: Vec<NetworkTask>, on_finish: F) -> Result<TaskGroup>
    where
        F: FnOnce() + Send + 'static,
    {
        TaskGroup::start(tasks, on_finish, &self.inner.runtime)
    }
}
