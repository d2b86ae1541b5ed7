//! Duplex transport collaborator
//!
//! The raw message channel (websocket or otherwise) is external to this
//! crate: framing, TLS and reconnect policy live with the embedding
//! application. The orchestration layer only needs a way to open a link
//! and exchange text frames over a channel pair.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;

/// Event delivered by the transport's read side
#[derive(Debug)]
pub enum TransportEvent {
    /// A complete inbound text frame
    Message(String),
    /// The link was closed by the remote end or the transport itself
    Closed,
}

/// A connected duplex link
///
/// Outbound frames are queued on `outbound`; the transport drains the queue
/// in order. Inbound frames and the final close arrive on `inbound`.
pub struct TransportLink {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Factory for duplex signaling links
#[async_trait]
pub trait SignalingTransport: Send + Sync {
    /// Open a link to the given url with the given subprotocol
    async fn connect(&self, url: &str, subprotocol: &str) -> Result<TransportLink>;
}
