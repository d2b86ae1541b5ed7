//! Named execution context
//!
//! A `TaskContext` is an independently scheduled, single-consumer FIFO task
//! queue. All state that belongs to a context is only ever touched from
//! tasks posted to it; cross-context communication is always a posted task,
//! never a synchronous call.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Handle to a named execution context
///
/// Cheap to clone; all clones feed the same FIFO queue. Tasks posted from
/// one caller run in post order. Tasks posted from different callers have
/// no relative ordering guarantee beyond queue arrival.
#[derive(Clone)]
pub struct TaskContext {
    name: Arc<str>,
    tx: mpsc::UnboundedSender<Job>,
}

impl TaskContext {
    /// Start a new context and return its handle plus the drain task
    pub(crate) fn start(name: &str) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let task_name: Arc<str> = Arc::from(name);

        let drain_name = Arc::clone(&task_name);
        let handle = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                job();
            }
            tracing::debug!(context = %drain_name, "Execution context stopped");
        });

        (
            Self {
                name: task_name,
                tx,
            },
            handle,
        )
    }

    /// Get the context name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Post a task onto this context's queue
    ///
    /// Never blocks. Returns `false` if the context has already been
    /// stopped, in which case the task is dropped.
    pub fn post<F>(&self, f: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        if self.tx.send(Box::new(f)).is_err() {
            tracing::debug!(context = %self.name, "Task dropped: context stopped");
            return false;
        }
        true
    }
}

impl std::fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskContext")
            .field("name", &self.name)
            .finish()
    }
}
