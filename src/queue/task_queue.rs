//! Task Queue
//!
//! Serial, priority-aware task scheduler. Exactly one task runs at a time;
//! new tasks may arrive at any moment but never interrupt the running one.
//!
//! ## Ordering
//!
//! ```text
//! priority desc ──► [5] [3] [1] [None] [None]
//!                                 └─ insertion order ─┘
//! ```
//!
//! A privileged task clears the pending list and switches the queue into
//! privileged mode, where only further privileged tasks are accepted. The
//! queue drops back to normal mode once it drains.

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::watch;

use crate::services::spawn_named;

/// Scheduling metadata every queued task exposes
pub trait QueueTask: Send + 'static {
    /// Higher runs first; tasks without a priority run after all prioritized ones
    fn priority(&self) -> Option<i32> {
        None
    }

    /// Privileged tasks preempt and exclusively occupy the queue
    fn privileged(&self) -> bool {
        false
    }
}

/// Queue admission mode
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum QueueMode {
    /// Any task is accepted
    #[default]
    Normal,
    /// Only privileged tasks are accepted
    Privileged,
}

/// Executes one task to completion
pub type ExecuteTask<T> = Arc<dyn Fn(T) -> BoxFuture<'static, ()> + Send + Sync>;

struct QueueInner<T> {
    pending: Vec<T>,
    mode: QueueMode,
    in_progress: bool,
}

/// Serial task queue
pub struct TaskQueue<T: QueueTask> {
    name: &'static str,
    inner: Arc<Mutex<QueueInner<T>>>,
    execute: ExecuteTask<T>,
    busy: Arc<watch::Sender<bool>>,
}

impl<T: QueueTask> Clone for TaskQueue<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            inner: self.inner.clone(),
            execute: self.execute.clone(),
            busy: self.busy.clone(),
        }
    }
}

fn by_priority(a: Option<i32>, b: Option<i32>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

impl<T: QueueTask> TaskQueue<T> {
    /// Create a queue driven by `execute`
    pub fn new<F>(name: &'static str, execute: F) -> Self
    where
        F: Fn(T) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        let (busy, _rx) = watch::channel(false);
        Self {
            name,
            inner: Arc::new(Mutex::new(QueueInner {
                pending: Vec::new(),
                mode: QueueMode::Normal,
                in_progress: false,
            })),
            execute: Arc::new(execute),
            busy: Arc::new(busy),
        }
    }

    // ==================== Enqueue ====================

    /// Enqueue a task
    ///
    /// Returns `false` when the task was rejected because the queue is in
    /// privileged mode and the task is not privileged.
    pub fn set_task(&self, task: T) -> bool {
        self.insert(task, None)
    }

    /// Enqueue a task at `index` before the stable priority sort
    pub fn set_task_at(&self, task: T, index: usize) -> bool {
        self.insert(task, Some(index))
    }

    fn insert(&self, task: T, index: Option<usize>) -> bool {
        {
            let mut inner = self.inner.lock();

            if inner.mode == QueueMode::Privileged && !task.privileged() {
                tracing::debug!("{}: rejected non-privileged task in privileged mode", self.name);
                return false;
            }

            if task.privileged() {
                if !inner.pending.is_empty() {
                    tracing::debug!(
                        "{}: privileged task discards {} pending task(s)",
                        self.name,
                        inner.pending.len()
                    );
                }
                inner.mode = QueueMode::Privileged;
                inner.pending.clear();
                inner.pending.push(task);
            } else {
                match index {
                    Some(i) => {
                        let i = i.min(inner.pending.len());
                        inner.pending.insert(i, task);
                    }
                    None => inner.pending.push(task),
                }
                // stable: equal priorities keep their relative order
                inner
                    .pending
                    .sort_by(|a, b| by_priority(a.priority(), b.priority()));
            }
        }

        self.execute();
        true
    }

    /// Reset, replace the pending list verbatim and start draining
    ///
    /// The queue is left in normal mode even if some of `tasks` are
    /// privileged; only `set_task` enters privileged mode.
    pub fn set_queue(&self, tasks: Vec<T>) {
        self.reset();
        self.inner.lock().pending = tasks;
        self.execute();
    }

    /// Drop all pending tasks and return to normal mode
    ///
    /// A task already running is not interrupted.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.pending.clear();
        inner.mode = QueueMode::Normal;
    }

    // ==================== Inspection ====================

    /// Current admission mode
    pub fn mode(&self) -> QueueMode {
        self.inner.lock().mode
    }

    /// Number of pending (not yet started) tasks
    pub fn len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Check if nothing is pending
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if nothing is pending and nothing is running
    pub fn is_idle(&self) -> bool {
        let inner = self.inner.lock();
        !inner.in_progress && inner.pending.is_empty()
    }

    /// Wait until the queue has drained
    pub async fn idle(&self) {
        let mut rx = self.busy.subscribe();
        let _ = rx.wait_for(|busy| !*busy).await;
    }

    // ==================== Execution ====================

    fn execute(&self) {
        {
            let mut inner = self.inner.lock();
            if inner.in_progress || inner.pending.is_empty() {
                return;
            }
            inner.in_progress = true;
            self.busy.send_replace(true);
        }

        let queue = self.clone();
        if spawn_named("task-queue", queue.drain()).is_none() {
            let mut inner = self.inner.lock();
            inner.in_progress = false;
            self.busy.send_replace(false);
        }
    }

    async fn drain(self) {
        loop {
            let task = {
                let mut inner = self.inner.lock();
                if inner.pending.is_empty() {
                    inner.in_progress = false;
                    if inner.mode == QueueMode::Privileged {
                        tracing::debug!("{}: privileged work done, back to normal mode", self.name);
                        inner.mode = QueueMode::Normal;
                    }
                    self.busy.send_replace(false);
                    return;
                }
                inner.pending.remove(0)
            };

            let run = AssertUnwindSafe((self.execute)(task)).catch_unwind();
            if run.await.is_err() {
                tracing::error!("{}: task panicked, continuing with next task", self.name);
            }
        }
    }
}

impl<T: QueueTask + Clone> TaskQueue<T> {
    /// Snapshot of the pending tasks in execution order
    pub fn tasks(&self) -> Vec<T> {
        self.inner.lock().pending.clone()
    }

    /// First pending task matching `predicate`
    pub fn find_task(&self, predicate: impl Fn(&T) -> bool) -> Option<T> {
        self.inner.lock().pending.iter().find(|t| predicate(t)).cloned()
    }
}

impl<T: QueueTask> fmt::Debug for TaskQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("TaskQueue")
            .field("name", &self.name)
            .field("mode", &inner.mode)
            .field("pending", &inner.pending.len())
            .field("in_progress", &inner.in_progress)
            .finish()
    }
}
