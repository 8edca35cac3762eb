//! Request tasks.
//!
//! A [`NetworkTask`] owns one logical request: it drives transport exchanges,
//! applies the redirect policy, buffers the body, retries failed attempts and
//! finally hands the result to exactly one set of interpreters.
//!
//! # State Machine
//!
//! ```text
//!            start                 redirect event
//!   Idle ───────────▶ InFlight ◀──────────────▶ Redirecting
//!                      │    │
//!        complete(ok)  │    │ complete(err)
//!                      ▼    ▼
//!               Succeeded  Failed ──(attempts < budget)──▶ Retrying ──▶ InFlight
//!                            │
//!                            └──(budget used / cancelled)──▶ Exhausted
//! ```
//!
//! - A redirect does not consume an attempt. The body buffer is cleared so
//!   only bytes from the final hop are kept.
//! - Every attempt starts with a fresh buffer and a fresh exchange.
//! - A redirect policy that returns an unsendable request ends the task
//!   immediately, whatever budget is left.
//!
//! # Cancellation
//!
//! [`NetworkTask::cancel`] stops the current exchange and suppresses further
//! retries; the failure interpreter receives [`TaskError::Cancelled`] once.
//! If a completion and a cancel race, the one committed first under the task
//! lock wins: a cancel requested before the outcome is committed turns even a
//! successful exchange into a cancellation.
//!
//! # Examples
//!
//! ```ignore
//! let task = manager
//!     .get("https://example.com/items", None)?
//!     .retry_count(3)?
//!     .on_json(|head, items: Result<Vec<String>, _>| println!("{} {:?}", head.status, items))?
//!     .on_failure(|error| eprintln!("gave up: {error}"))?;
//! task.start()?;
//! task.wait().await;
//! ```

use crate::client::config::RetryBackoff;
use crate::client::group::GroupId;
use crate::client::interpret::{
    data_interpreter, json_interpreter, text_interpreter, FailureInterpreter, Interpreters,
    RedirectPolicy,
};
use crate::client::manager::{ManagerInner, NetworkManager};
use crate::error::{ContractError, Result, TaskError};
use crate::transport::{Transport, TransportEvent};
use crate::types::{RedirectResponse, RequestDescriptor, ResponseHead, TaskId, TaskState};
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::sync::{watch, Semaphore};
use tokio_util::sync::CancellationToken;

/// Redirect hops followed within one attempt before giving up.
pub const MAX_REDIRECTS: usize = 16;

type FollowUp =
    Box<dyn FnOnce(&NetworkManager, &ResponseHead, &Bytes) -> Option<NetworkTask> + Send>;

struct NextHop {
    manager: Weak<ManagerInner>,
    follow_up: FollowUp,
}

/// What a task borrows from the manager that created it.
pub(crate) struct TaskContext {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) limiter: Arc<Semaphore>,
    pub(crate) runtime: Handle,
    pub(crate) backoff: RetryBackoff,
    pub(crate) enable_logging: bool,
    pub(crate) manager: Weak<ManagerInner>,
}

struct TaskShared {
    id: TaskId,
    request: RequestDescriptor,
    context: TaskContext,
    state: watch::Sender<TaskState>,
    cancel: CancellationToken,
    inner: Mutex<TaskInner>,
}

#[derive(Default)]
struct TaskInner {
    started: bool,
    resolved: bool,
    cancel_requested: bool,
    attempts: u8,
    retry_budget: Option<u8>,
    redirect: Option<RedirectPolicy>,
    interpreters: Interpreters,
    next: Option<NextHop>,
    group: Option<GroupId>,
}

/// Handle to one logical request.
///
/// Cloning the handle does not clone the request; all clones refer to the
/// same task. Configuration methods consume the handle and return it so they
/// can be chained, and each may be used once, before [`start`](Self::start).
#[derive(Clone)]
pub struct NetworkTask {
    shared: Arc<TaskShared>,
}

/// Non-owning handle kept by the manager registry.
///
/// A started task stays alive through its driver; an idle task lives only as
/// long as the caller's handles.
pub(crate) struct WeakTask(Weak<TaskShared>);

impl WeakTask {
    pub(crate) fn upgrade(&self) -> Option<NetworkTask> {
        self.0.upgrade().map(|shared| NetworkTask { shared })
    }
}

impl std::fmt::Debug for NetworkTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkTask")
            .field("id", &self.shared.id)
            .field("url", &self.shared.request.url)
            .field("state", &self.state())
            .finish()
    }
}

impl NetworkTask {
    pub(crate) fn new(request: RequestDescriptor, context: TaskContext) -> Self {
        let (state, _) = watch::channel(TaskState::Idle);
        NetworkTask {
            shared: Arc::new(TaskShared {
                id: TaskId::new(),
                request,
                context,
                state,
                cancel: CancellationToken::new(),
                inner: Mutex::new(TaskInner::default()),
            }),
        }
    }

    pub(crate) fn downgrade(&self) -> WeakTask {
        WeakTask(Arc::downgrade(&self.shared))
    }

    // ========== Configuration ==========

    /// Rewrite redirects.
    ///
    /// The policy receives the request that was redirected and the redirect
    /// response, and returns the request to issue instead. Without a policy
    /// the transport's proposed request is followed unchanged.
    pub fn redirect<F>(self, policy: F) -> Result<Self>
    where
        F: Fn(&RequestDescriptor, &RedirectResponse) -> RequestDescriptor + Send + Sync + 'static,
    {
        let policy: RedirectPolicy = Arc::new(policy);
        self.configure(|inner| set_once(&mut inner.redirect, policy, "redirect policy"))
    }

    /// Receive the raw response body.
    pub fn on_data<F>(self, f: F) -> Result<Self>
    where
        F: FnOnce(&ResponseHead, Bytes) + Send + 'static,
    {
        self.configure(|inner| {
            set_once(&mut inner.interpreters.data, data_interpreter(f), "data interpreter")
        })
    }

    /// Receive the body decoded as UTF-8 text (empty if it is not valid UTF-8).
    pub fn on_text<F>(self, f: F) -> Result<Self>
    where
        F: FnOnce(&ResponseHead, String) + Send + 'static,
    {
        self.configure(|inner| {
            set_once(&mut inner.interpreters.text, text_interpreter(f), "text interpreter")
        })
    }

    /// Receive the body parsed as JSON.
    ///
    /// A parse failure is passed to this interpreter as `Err`; the task
    /// itself still succeeds.
    pub fn on_json<T, F>(self, f: F) -> Result<Self>
    where
        T: DeserializeOwned + 'static,
        F: FnOnce(&ResponseHead, std::result::Result<T, serde_json::Error>) + Send + 'static,
    {
        self.configure(|inner| {
            set_once(&mut inner.interpreters.json, json_interpreter(f), "JSON interpreter")
        })
    }

    /// Receive the terminal error once retries are exhausted.
    ///
    /// Without a failure interpreter terminal errors are silently dropped.
    pub fn on_failure<F>(self, f: F) -> Result<Self>
    where
        F: FnOnce(TaskError) + Send + 'static,
    {
        let failure: FailureInterpreter = Box::new(f);
        self.configure(|inner| set_once(&mut inner.interpreters.failure, failure, "failure interpreter"))
    }

    /// Allow up to `count` attempts (1, 2 or 3). Defaults to 1.
    pub fn retry_count(self, count: u8) -> Result<Self> {
        self.configure(|inner| {
            if !(1..=3).contains(&count) {
                return Err(ContractError::InvalidRetryBudget(count));
            }
            set_once(&mut inner.retry_budget, count, "retry count")
        })
    }

    /// Chain a follow-up request on success.
    ///
    /// After the interpreters have run, `follow_up` is given `manager` and the
    /// finished response; a task it returns is started. The manager is held
    /// weakly: if it has been dropped by then, the follow-up is skipped.
    pub fn next<F>(self, manager: &NetworkManager, follow_up: F) -> Result<Self>
    where
        F: FnOnce(&NetworkManager, &ResponseHead, &Bytes) -> Option<NetworkTask> + Send + 'static,
    {
        let hop = NextHop {
            manager: manager.downgrade(),
            follow_up: Box::new(follow_up),
        };
        self.configure(|inner| set_once(&mut inner.next, hop, "next hop"))
    }

    fn configure<F>(self, apply: F) -> Result<Self>
    where
        F: FnOnce(&mut TaskInner) -> std::result::Result<(), ContractError>,
    {
        {
            let mut inner = self.shared.inner.lock();
            if inner.started || inner.resolved {
                return Err(ContractError::AlreadyStarted.into());
            }
            apply(&mut inner)?;
        }
        Ok(self)
    }

    // ========== Lifecycle ==========

    /// Begin the first attempt.
    ///
    /// Starting twice, or starting a cancelled task, is a contract error.
    pub fn start(&self) -> Result<()> {
        let (policy, budget) = {
            let mut inner = self.shared.inner.lock();
            if inner.started || inner.resolved {
                return Err(ContractError::AlreadyStarted.into());
            }
            inner.started = true;
            (inner.redirect.clone(), inner.retry_budget.unwrap_or(1))
        };

        tracing::debug!(
            task_id = %self.shared.id,
            url = %self.shared.request.url,
            retry_budget = budget,
            "Starting task"
        );

        let shared = Arc::clone(&self.shared);
        self.shared
            .context
            .runtime
            .spawn(async move { shared.drive(policy, budget).await });
        Ok(())
    }

    /// Cancel the task.
    ///
    /// Idempotent; a no-op once the task is terminal.
    pub fn cancel(&self) {
        let pending = {
            let mut inner = self.shared.inner.lock();
            if inner.resolved || inner.cancel_requested {
                return;
            }
            inner.cancel_requested = true;
            if inner.started {
                None
            } else {
                inner.resolved = true;
                Some(std::mem::take(&mut inner.interpreters))
            }
        };

        tracing::debug!(task_id = %self.shared.id, "Cancelling task");
        match pending {
            // The driver observes the token and resolves the task.
            None => self.shared.cancel.cancel(),
            Some(interpreters) => {
                interpreters.deliver_failure(self.shared.id, TaskError::Cancelled);
                self.shared.finish(TaskState::Exhausted);
            }
        }
    }

    /// Wait until the task is terminal and return its final state.
    pub async fn wait(&self) -> TaskState {
        let mut rx = self.shared.state.subscribe();
        if let Ok(state) = rx.wait_for(|state| state.is_terminal()).await {
            return *state;
        }
        let state = *rx.borrow();
        state
    }

    // ========== Introspection ==========

    /// Task identity.
    pub fn id(&self) -> TaskId {
        self.shared.id
    }

    /// The request this task was created with.
    pub fn request(&self) -> &RequestDescriptor {
        &self.shared.request
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TaskState {
        *self.shared.state.borrow()
    }

    /// Attempts made so far (redirects are not attempts).
    pub fn attempts(&self) -> u8 {
        self.shared.inner.lock().attempts
    }

    /// Whether [`start`](Self::start) has been called.
    pub fn is_started(&self) -> bool {
        self.shared.inner.lock().started
    }

    /// The manager that created this task, if it is still alive.
    pub fn manager(&self) -> Option<NetworkManager> {
        self.shared
            .context
            .manager
            .upgrade()
            .map(NetworkManager::from_inner)
    }

    pub(crate) fn join_group(&self, group: GroupId) -> std::result::Result<(), ContractError> {
        let mut inner = self.shared.inner.lock();
        if inner.started || inner.resolved {
            return Err(ContractError::AlreadyStarted);
        }
        if inner.group.is_some() {
            return Err(ContractError::AlreadyGrouped);
        }
        inner.group = Some(group);
        Ok(())
    }

    pub(crate) fn leave_group(&self, group: GroupId) {
        let mut inner = self.shared.inner.lock();
        if inner.group == Some(group) {
            inner.group = None;
        }
    }
}

fn set_once<T>(
    slot: &mut Option<T>,
    value: T,
    name: &'static str,
) -> std::result::Result<(), ContractError> {
    if slot.is_some() {
        return Err(ContractError::AlreadyRegistered(name));
    }
    *slot = Some(value);
    Ok(())
}

type AttemptResult = std::result::Result<(ResponseHead, Bytes), TaskError>;

impl TaskShared {
    async fn drive(self: Arc<Self>, policy: Option<RedirectPolicy>, budget: u8) {
        let outcome = loop {
            let attempt = {
                let mut inner = self.inner.lock();
                inner.attempts += 1;
                inner.attempts
            };
            self.set_state(TaskState::InFlight);
            tracing::debug!(task_id = %self.id, attempt, "Attempt started");

            let error = match self.run_attempt(policy.as_ref()).await {
                Ok(response) => break Ok(response),
                Err(error) => error,
            };

            self.set_state(TaskState::Failed);
            if self.cancel.is_cancelled() || !error.is_retryable() || attempt >= budget {
                break Err(error);
            }

            let delay = self.context.backoff.delay(u32::from(attempt) - 1);
            if self.context.enable_logging {
                tracing::warn!(
                    task_id = %self.id,
                    url = %self.request.url,
                    attempt,
                    retry_budget = budget,
                    ?delay,
                    error = %error,
                    "Request failed, retrying"
                );
            }
            self.set_state(TaskState::Retrying);

            if !delay.is_zero() {
                let cancelled = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => true,
                    _ = tokio::time::sleep(delay) => false,
                };
                if cancelled {
                    break Err(TaskError::Cancelled);
                }
            }
        };

        self.resolve(outcome);
    }

    async fn run_attempt(&self, policy: Option<&RedirectPolicy>) -> AttemptResult {
        let permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            permit = self.context.limiter.acquire() => Some(permit),
        };
        let Some(permit) = permit else {
            return Err(TaskError::Cancelled);
        };
        let _permit =
            permit.map_err(|_| TaskError::Transport("scheduling queue closed".to_string()))?;

        let mut request = self.request.clone();
        let mut buffer = BytesMut::new();
        let mut redirects = 0;
        let mut events = self.context.transport.send(&request);

        loop {
            let event = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                event = events.next() => Some(event),
            };
            let Some(event) = event else {
                return Err(TaskError::Cancelled);
            };

            match event {
                Some(TransportEvent::Data(chunk)) => buffer.extend_from_slice(&chunk),
                Some(TransportEvent::Redirect(redirect)) => {
                    self.set_state(TaskState::Redirecting);
                    redirects += 1;
                    if redirects > MAX_REDIRECTS {
                        return Err(TaskError::TooManyRedirects(MAX_REDIRECTS));
                    }

                    let next = match policy {
                        Some(policy) => policy(&request, &redirect),
                        None => redirect.proposed,
                    };
                    if let Err(e) = next.validate() {
                        tracing::debug!(task_id = %self.id, error = %e, "Redirect policy returned an invalid request");
                        return Err(TaskError::InvalidRedirect(e.to_string()));
                    }

                    tracing::debug!(
                        task_id = %self.id,
                        status = redirect.status,
                        from = %request.url,
                        to = %next.url,
                        "Following redirect"
                    );
                    buffer.clear();
                    request = next;
                    events = self.context.transport.send(&request);
                    self.set_state(TaskState::InFlight);
                }
                Some(TransportEvent::Complete(Ok(head))) => return Ok((head, buffer.freeze())),
                Some(TransportEvent::Complete(Err(error))) => return Err(error),
                None => return Err(TaskError::Incomplete),
            }
        }
    }

    /// Commit the terminal outcome and notify interpreters, observers and the
    /// follow-up hop, in that order.
    fn resolve(&self, outcome: AttemptResult) {
        let (interpreters, next, outcome) = {
            let mut inner = self.inner.lock();
            if inner.resolved {
                return;
            }
            inner.resolved = true;
            let outcome = if inner.cancel_requested {
                Err(TaskError::Cancelled)
            } else {
                outcome
            };
            (
                std::mem::take(&mut inner.interpreters),
                inner.next.take(),
                outcome,
            )
        };

        match outcome {
            Ok((head, body)) => {
                tracing::debug!(
                    task_id = %self.id,
                    status = head.status,
                    size = body.len(),
                    "Task succeeded"
                );
                interpreters.deliver_success(&head, &body);
                self.finish(TaskState::Succeeded);
                if let Some(next) = next {
                    self.follow(next, &head, &body);
                }
            }
            Err(error) => {
                tracing::debug!(task_id = %self.id, error = %error, "Task exhausted");
                interpreters.deliver_failure(self.id, error);
                self.finish(TaskState::Exhausted);
            }
        }
    }

    fn follow(&self, next: NextHop, head: &ResponseHead, body: &Bytes) {
        let Some(inner) = next.manager.upgrade() else {
            tracing::warn!(task_id = %self.id, "Next manager was dropped, skipping follow-up request");
            return;
        };
        let manager = NetworkManager::from_inner(inner);
        if let Some(task) = (next.follow_up)(&manager, head, body) {
            tracing::debug!(task_id = %self.id, next_task_id = %task.id(), "Starting follow-up task");
            if let Err(e) = task.start() {
                tracing::warn!(task_id = %self.id, error = %e, "Follow-up task could not be started");
            }
        }
    }

    fn finish(&self, state: TaskState) {
        if let Some(manager) = self.context.manager.upgrade() {
            manager.deregister(self.id);
        }
        self.set_state(state);
    }

    fn set_state(&self, state: TaskState) {
        self.state.send_replace(state);
    }
}
