//! Batch completion for sets of request tasks.
//!
//! A [`TaskGroup`] starts a fixed set of tasks and runs one callback after
//! every member is terminal, whatever order they finish in and however many
//! retries each one needs. Individual errors are not aggregated: each task
//! reports through its own interpreters, the group reports only completion.
//!
//! # Completion Signal
//!
//! One watcher per member waits for that member's terminal state and then
//! decrements an atomic countdown. The watcher that takes the count to zero
//! runs the callback, so it fires exactly once even when members finish
//! concurrently on different worker threads.
//!
//! # Examples
//!
//! ```ignore
//! let a = manager.get("https://example.com/a", None)?;
//! let b = manager.get("https://example.com/b", None)?.retry_count(2)?;
//! let group = manager.group(vec![a, b], || println!("both done"))?;
//! group.wait().await;
//! ```

use crate::client::task::NetworkTask;
use crate::error::{ContractError, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::watch;
use uuid::Uuid;

/// Identity of a task group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupId(Uuid);

impl GroupId {
    fn new() -> Self {
        GroupId(Uuid::new_v4())
    }
}

type FinishCallback = Box<dyn FnOnce() + Send>;

struct GroupShared {
    id: GroupId,
    remaining: AtomicUsize,
    on_finish: Mutex<Option<FinishCallback>>,
    finished: watch::Sender<bool>,
}

impl GroupShared {
    fn member_finished(&self) {
        let left = self.remaining.fetch_sub(1, Ordering::AcqRel) - 1;
        tracing::trace!(group_id = ?self.id, remaining = left, "Group member finished");
        if left > 0 {
            return;
        }

        let on_finish = self.on_finish.lock().take();
        if let Some(on_finish) = on_finish {
            tracing::debug!(group_id = ?self.id, "All group members finished");
            on_finish();
        }
        self.finished.send_replace(true);
    }
}

/// A started set of tasks with a single completion callback.
#[derive(Clone)]
pub struct TaskGroup {
    shared: Arc<GroupShared>,
    members: Vec<NetworkTask>,
}

impl std::fmt::Debug for TaskGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskGroup")
            .field("id", &self.shared.id)
            .field("members", &self.members.len())
            .field("remaining", &self.remaining())
            .finish()
    }
}

impl TaskGroup {
    /// Join `tasks` into a group and start them.
    ///
    /// Rejects an empty set, and any task that is already started or
    /// already grouped; on rejection no task is modified.
    pub(crate) fn start<F>(tasks: Vec<NetworkTask>, on_finish: F, runtime: &Handle) -> Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        if tasks.is_empty() {
            return Err(ContractError::EmptyGroup.into());
        }

        let id = GroupId::new();
        for (index, task) in tasks.iter().enumerate() {
            if let Err(e) = task.join_group(id) {
                for joined in &tasks[..index] {
                    joined.leave_group(id);
                }
                return Err(e.into());
            }
        }

        let on_finish: FinishCallback = Box::new(on_finish);
        let (finished, _) = watch::channel(false);
        let shared = Arc::new(GroupShared {
            id,
            remaining: AtomicUsize::new(tasks.len()),
            on_finish: Mutex::new(Some(on_finish)),
            finished,
        });

        tracing::debug!(group_id = ?id, members = tasks.len(), "Starting task group");

        for task in &tasks {
            let member = task.clone();
            let shared = Arc::clone(&shared);
            runtime.spawn(async move {
                member.wait().await;
                shared.member_finished();
            });
        }

        for task in &tasks {
            // A member started elsewhere after joining still finishes and is still counted.
            if let Err(e) = task.start() {
                tracing::debug!(group_id = ?id, task_id = %task.id(), error = %e, "Group member was already started");
            }
        }

        Ok(TaskGroup {
            shared,
            members: tasks,
        })
    }

    /// Group identity.
    pub fn id(&self) -> GroupId {
        self.shared.id
    }

    /// Member tasks, in the order given.
    pub fn tasks(&self) -> &[NetworkTask] {
        &self.members
    }

    /// Members not yet terminal.
    pub fn remaining(&self) -> usize {
        self.shared.remaining.load(Ordering::Acquire)
    }

    /// Whether the completion callback has run.
    pub fn is_finished(&self) -> bool {
        *self.shared.finished.borrow()
    }

    /// Cancel every member that is not yet terminal.
    ///
    /// Cancelled members still count towards completion, so the callback
    /// still fires once.
    pub fn cancel(&self) {
        tracing::debug!(group_id = ?self.shared.id, "Cancelling task group");
        for task in &self.members {
            task.cancel();
        }
    }

    /// Wait until the completion callback has run.
    pub async fn wait(&self) {
        let mut rx = self.shared.finished.subscribe();
        let _ = rx.wait_for(|finished| *finished).await;
    }
}
