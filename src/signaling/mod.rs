//! Signaling layer
//!
//! Wire model, transaction correlation, the session over the duplex
//! transport, and the typed SFU request surface.

pub mod api;
pub mod broker;
pub mod message;
pub mod session;
pub mod transport;

pub use api::SfuApi;
pub use broker::{TransactionBroker, TransactionReply};
pub use message::{IncomingMessage, RequestFrame, ResponseFrame, TransportInfo};
pub use session::{SignalingEventHandler, SignalingSession};
pub use transport::{SignalingTransport, TransportEvent, TransportLink};
