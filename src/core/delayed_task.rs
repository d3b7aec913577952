//! Cancellable one-shot delayed tasks and a named registry of them.
//!
//! A [`DelayedTask`] races its timer against [`DelayedTask::cancel`] for a
//! single claim on an atomic state word. Whoever moves the state out of
//! `Pending` first decides the outcome:
//!
//! - timer wins: the callback runs, later `cancel()` calls return `false`
//! - `cancel()` wins: the callback never runs and the timer is woken early
//!
//! Exactly one of the two happens.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::{ConcurrentRegistry, Spawn};
use crate::runtime::TokioSpawner;

const PENDING: u8 = 0;
const FIRED: u8 = 1;
const CANCELLED: u8 = 2;

/// Observable state of a [`DelayedTask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Waiting for the delay to elapse.
    Pending,
    /// The callback was claimed by the timer.
    Fired,
    /// Cancelled before the timer fired.
    Cancelled,
}

#[derive(Debug)]
struct TaskInner {
    state: AtomicU8,
    cancel: CancellationToken,
}

impl TaskInner {
    /// Move out of `Pending` into `outcome`; true only for the first caller.
    fn claim(&self, outcome: u8) -> bool {
        self.state
            .compare_exchange(PENDING, outcome, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Callback scheduled to run once after a delay unless cancelled first.
///
/// Cloning yields another handle onto the same task.
#[derive(Debug, Clone)]
pub struct DelayedTask {
    inner: Arc<TaskInner>,
}

impl DelayedTask {
    /// Schedule `callback` on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime context.
    pub fn new<F>(delay: Duration, callback: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::with_spawner(&TokioSpawner::current(), delay, callback)
    }

    /// Schedule `callback` through `spawner`.
    pub fn with_spawner<S, F>(spawner: &S, delay: Duration, callback: F) -> Self
    where
        S: Spawn,
        F: FnOnce() + Send + 'static,
    {
        let inner = Arc::new(TaskInner {
            state: AtomicU8::new(PENDING),
            cancel: CancellationToken::new(),
        });

        let timer = Arc::clone(&inner);
        spawner.spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = timer.cancel.cancelled() => return,
            }
            if timer.claim(FIRED) {
                callback();
            }
        });

        Self { inner }
    }

    /// Prevent the callback from running.
    ///
    /// Returns `true` iff this call stopped the callback; `false` if it had
    /// already fired or the task was already cancelled.
    pub fn cancel(&self) -> bool {
        if self.inner.claim(CANCELLED) {
            self.inner.cancel.cancel();
            true
        } else {
            false
        }
    }

    /// Current state of the task.
    #[must_use]
    pub fn state(&self) -> TaskState {
        match self.inner.state.load(Ordering::Acquire) {
            PENDING => TaskState::Pending,
            FIRED => TaskState::Fired,
            _ => TaskState::Cancelled,
        }
    }

    /// True once the task has fired or been cancelled.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.state() != TaskState::Pending
    }
}

/// Named registry of delayed tasks supporting bulk cancellation.
#[derive(Debug, Default)]
pub struct TaskManager {
    tasks: ConcurrentRegistry<String, DelayedTask>,
}

impl TaskManager {
    /// Create an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `task` under `id`.
    ///
    /// An existing entry under the same id is overwritten **without** being
    /// cancelled; its timer keeps running untracked.
    pub fn add_task(&self, id: impl Into<String>, task: DelayedTask) {
        let id = id.into();
        if let Some(previous) = self.tasks.replace(id.clone(), task) {
            if !previous.is_finished() {
                warn!(task = %id, "replaced a pending task without cancelling it");
            }
        }
        debug!(task = %id, "task added");
    }

    /// Schedule `callback` after `delay` on the current runtime and track it
    /// under `id`.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime context.
    pub fn schedule<F>(&self, id: impl Into<String>, delay: Duration, callback: F) -> DelayedTask
    where
        F: FnOnce() + Send + 'static,
    {
        let task = DelayedTask::new(delay, callback);
        self.add_task(id, task.clone());
        task
    }

    /// Cancel and forget the task under `id`. Returns whether the callback
    /// was prevented from running.
    pub fn cancel_task(&self, id: &str) -> bool {
        let Some(task) = self.tasks.delete(id) else {
            return false;
        };
        let cancelled = task.cancel();
        info!(task = %id, cancelled, "task removed");
        cancelled
    }

    /// Cancel every tracked task and clear the registry. Returns how many
    /// callbacks were prevented from running.
    pub fn cancel_all(&self) -> usize {
        let cancelled = self
            .tasks
            .drain()
            .into_iter()
            .filter(|(_, task)| task.cancel())
            .count();
        info!(cancelled, "all tasks cancelled");
        cancelled
    }

    /// Forget tasks that already fired or were cancelled. Returns how many
    /// entries were removed.
    pub fn prune_finished(&self) -> usize {
        self.tasks.retain(|_, task| !task.is_finished())
    }

    /// True if a task is tracked under `id`.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.tasks.contains_key(id)
    }

    /// Number of tracked tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// True if no tasks are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
