//! Observer notification
//!
//! Weakly-held, context-bound observer registrations and the bus that
//! fans notifications out onto each observer's own execution context.

mod bus;

pub use bus::ObserverBus;
