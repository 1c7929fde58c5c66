//! The session dispatcher: per-session FIFO of processing tasks, with each
//! new task cancelling every task still queued ahead of it.
//!
//! Grounded in `core/mc.py`'s `MC` class: `_dispatch_processing_task`
//! cancels every existing task in the target session's queue before
//! appending the new one (spec §4.1 — a session processes at most one
//! "current" task; superseded predecessors are cancelled, not queued behind
//! it), and `_collect_garbage` periodically (every `gc_interval`, default 5s)
//! or forcibly (on shutdown) drops finished tasks from every session's
//! queue.

use crate::config::RuntimeConfig;
use crate::types::SessionId;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

struct TaskHandle {
    join_handle: JoinHandle<()>,
    cancellation_token: CancellationToken,
}

/// Dispatches per-session processing tasks, ensuring at most one is ever
/// actively driving a session's reply: dispatching a new task cancels every
/// task already queued for that session.
pub struct SessionDispatcher {
    tasks_by_session: RwLock<HashMap<SessionId, VecDeque<TaskHandle>>>,
    gc_interval: Duration,
    last_gc: Mutex<Instant>,
}

impl SessionDispatcher {
    pub fn new(config: &RuntimeConfig) -> Self {
        Self {
            tasks_by_session: RwLock::new(HashMap::new()),
            gc_interval: config.gc_interval,
            last_gc: Mutex::new(Instant::now()),
        }
    }

    /// Cancels every task currently queued for `session_id`, then spawns
    /// `make_task` with a fresh [`CancellationToken`] it should poll
    /// cooperatively. Returns immediately; the spawned task runs in the
    /// background.
    pub async fn dispatch<F, Fut>(&self, session_id: SessionId, make_task: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();

        {
            let mut tasks = self.tasks_by_session.write().await;
            let queue = tasks.entry(session_id).or_default();

            for existing in queue.iter() {
                existing.cancellation_token.cancel();
            }

            let join_handle = tokio::spawn(make_task(token.clone()));
            queue.push_back(TaskHandle {
                join_handle,
                cancellation_token: token,
            });

            debug!(%session_id, queue_len = queue.len(), "dispatched processing task, cancelled predecessors");
        }

        self.maybe_collect_garbage(false).await;
    }

    /// Runs garbage collection if `force` or the configured interval has
    /// elapsed since the last pass; a no-op otherwise.
    async fn maybe_collect_garbage(&self, force: bool) {
        let mut last_gc = self.last_gc.lock().await;
        if !force && last_gc.elapsed() < self.gc_interval {
            return;
        }
        *last_gc = Instant::now();
        drop(last_gc);

        self.collect_garbage(force).await;
    }

    /// Drops finished tasks from every session's queue. When `force`, also
    /// cancels and awaits every still-running task first (used at shutdown).
    pub async fn collect_garbage(&self, force: bool) {
        let mut tasks = self.tasks_by_session.write().await;

        for (session_id, queue) in tasks.iter_mut() {
            if force {
                for task in queue.iter() {
                    task.cancellation_token.cancel();
                }
                for task in queue.iter_mut() {
                    let _ = (&mut task.join_handle).await;
                }
                queue.clear();
            } else {
                let before = queue.len();
                queue.retain(|task| !task.join_handle.is_finished());
                if queue.len() != before {
                    trace!(%session_id, removed = before - queue.len(), "garbage-collected finished tasks");
                }
            }
        }

        tasks.retain(|_, queue| !queue.is_empty());
    }

    /// Number of tasks currently tracked for `session_id` (finished or not,
    /// until the next GC pass removes them). Exposed for tests and
    /// diagnostics.
    pub async fn queue_len(&self, session_id: SessionId) -> usize {
        self.tasks_by_session
            .read()
            .await
            .get(&session_id)
            .map(VecDeque::len)
            .unwrap_or(0)
    }
}
