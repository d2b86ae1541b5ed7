//! Transaction broker
//!
//! Assigns process-unique correlation ids to outbound requests and matches
//! asynchronous replies back to the originating caller. Each pending
//! transaction holds exactly one single-shot continuation; it is settled on
//! the first matching reply or on session teardown, never retried, and
//! never timed out at this layer (staleness is the transport's concern).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde_json::Value;

use crate::error::Error;

/// Outcome of a transaction: the response `data` on success, the server or
/// transport failure otherwise
pub type TransactionReply = std::result::Result<Value, Error>;

type Continuation = Box<dyn FnOnce(TransactionReply) + Send + 'static>;

/// Correlates outbound requests with their asynchronous replies
pub struct TransactionBroker {
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, Continuation>>,
}

impl TransactionBroker {
    /// Create an empty broker
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Allocate a fresh correlation id
    ///
    /// Ids are process-unique; an id is never handed out twice while a
    /// transaction with that id is outstanding.
    pub fn allocate(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Record the pending continuation for an allocated id
    pub fn register<F>(&self, id: u64, continuation: F)
    where
        F: FnOnce(TransactionReply) + Send + 'static,
    {
        let previous = self.pending.lock().insert(id, Box::new(continuation));
        debug_assert!(previous.is_none(), "correlation id reused: {}", id);
    }

    /// Settle the transaction with the given id
    ///
    /// Invokes the continuation exactly once and removes the entry. A reply
    /// with no matching pending transaction is dropped and logged; returns
    /// whether a pending entry was found.
    pub fn settle(&self, id: u64, reply: TransactionReply) -> bool {
        let continuation = self.pending.lock().remove(&id);
        match continuation {
            Some(continuation) => {
                continuation(reply);
                true
            }
            None => {
                tracing::debug!(transaction_id = id, "Reply with no pending transaction dropped");
                false
            }
        }
    }

    /// Settle every pending transaction with a failure
    ///
    /// Used on session teardown so no continuation is left dangling.
    pub fn fail_all(&self, error: Error) {
        let drained: Vec<Continuation> = {
            let mut pending = self.pending.lock();
            pending.drain().map(|(_, c)| c).collect()
        };
        if !drained.is_empty() {
            tracing::debug!(count = drained.len(), "Failing all pending transactions");
        }
        for continuation in drained {
            continuation(Err(error.clone()));
        }
    }

    /// Number of outstanding transactions
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

impl Default for TransactionBroker {
    fn default() -> Self {
        Self::new()
    }
}
