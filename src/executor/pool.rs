//! Execution context pool
//!
//! Creates a fixed set of named contexts once at initialization; lookup is
//! read-only afterwards. Shutdown is best-effort: contexts are stopped
//! without draining work that is already queued.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use super::context::TaskContext;

/// Fixed pool of named execution contexts
pub struct ContextPool {
    contexts: HashMap<String, TaskContext>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl ContextPool {
    /// Create and start one context per name
    ///
    /// Duplicate names collapse to a single context.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut contexts = HashMap::new();
        let mut handles = Vec::new();

        for name in names {
            let name = name.into();
            if contexts.contains_key(&name) {
                tracing::warn!(context = %name, "Duplicate context name ignored");
                continue;
            }
            let (ctx, handle) = TaskContext::start(&name);
            contexts.insert(name, ctx);
            handles.push(handle);
        }

        Self {
            contexts,
            handles: Mutex::new(handles),
        }
    }

    /// Look up a context by name
    ///
    /// Returns `None` for unregistered names; contexts are never created
    /// lazily.
    pub fn context(&self, name: &str) -> Option<TaskContext> {
        self.contexts.get(name).cloned()
    }

    /// Number of contexts in the pool
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    /// Whether the pool is empty
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Stop all contexts
    ///
    /// Best-effort: tasks already posted but not yet run may be dropped.
    pub fn stop_all(&self) {
        for handle in self.handles.lock().drain(..) {
            handle.abort();
        }
    }
}

impl Drop for ContextPool {
    fn drop(&mut self) {
        self.stop_all();
    }
}
