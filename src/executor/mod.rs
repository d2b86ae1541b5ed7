//! Execution contexts
//!
//! The concurrency model of this crate: a fixed set of named,
//! independently scheduled FIFO task queues. State machines confine their
//! mutation to one owning context and talk to each other only by posting
//! tasks.

mod context;
mod pool;

pub use context::TaskContext;
pub use pool::ContextPool;
