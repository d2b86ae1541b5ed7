//! Signaling session
//!
//! Owns one duplex link to the SFU: sends correlated requests through the
//! transaction broker, answers server-initiated requests, and routes
//! server pushes to a delegated event handler. The read pump task is the
//! "signaling context": everything inbound is classified there and then
//! re-posted toward whichever context owns the affected state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};

use super::broker::{TransactionBroker, TransactionReply};
use super::message::{IncomingMessage, RequestFrame, ResponseFrame};
use super::transport::{SignalingTransport, TransportEvent};

/// Server-push delegate
///
/// Implemented by a dedicated handler object composed into the room
/// session, not by the session type itself.
pub trait SignalingEventHandler: Send + Sync {
    /// The link was closed by the remote end
    fn on_closed(&self);

    /// Server-initiated request; must be answered via [`SignalingSession::respond`]
    fn on_server_request(&self, id: u64, method: &str, data: Value);

    /// Fire-and-forget server notification
    fn on_notification(&self, method: &str, data: Value);
}

/// Correlated request/response channel to the SFU
pub struct SignalingSession {
    transport: Arc<dyn SignalingTransport>,
    broker: Arc<TransactionBroker>,
    handler: Mutex<Option<Arc<dyn SignalingEventHandler>>>,
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    pump: Mutex<Option<JoinHandle<()>>>,
    connected: AtomicBool,
}

impl SignalingSession {
    /// Create a session over the given transport
    pub fn new(transport: Arc<dyn SignalingTransport>) -> Self {
        Self {
            transport,
            broker: Arc::new(TransactionBroker::new()),
            handler: Mutex::new(None),
            outbound: Mutex::new(None),
            pump: Mutex::new(None),
            connected: AtomicBool::new(false),
        }
    }

    /// Install the server-push delegate
    pub fn set_handler(&self, handler: Arc<dyn SignalingEventHandler>) {
        *self.handler.lock() = Some(handler);
    }

    /// The broker correlating this session's transactions
    pub fn broker(&self) -> &Arc<TransactionBroker> {
        &self.broker
    }

    /// Whether the link is currently open
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Open the link and start the read pump
    pub async fn connect(&self, url: &str, subprotocol: &str) -> Result<()> {
        if self.is_connected() {
            tracing::debug!(url = %url, "Signaling already connected");
            return Ok(());
        }

        let link = self.transport.connect(url, subprotocol).await?;
        *self.outbound.lock() = Some(link.outbound);
        self.connected.store(true, Ordering::Release);

        let mut inbound = link.inbound;
        let broker = Arc::clone(&self.broker);
        let handler = self.handler.lock().clone();

        let pump = tokio::spawn(async move {
            while let Some(event) = inbound.recv().await {
                match event {
                    TransportEvent::Message(text) => {
                        Self::route(&broker, handler.as_deref(), &text);
                    }
                    TransportEvent::Closed => {
                        tracing::info!("Signaling link closed by remote");
                        broker.fail_all(Error::NotConnected);
                        if let Some(handler) = &handler {
                            handler.on_closed();
                        }
                        break;
                    }
                }
            }
        });
        *self.pump.lock() = Some(pump);

        tracing::info!(url = %url, "Signaling connected");
        Ok(())
    }

    /// Tear the link down
    ///
    /// Idempotent. Pending transactions are settled with a failure; the
    /// remote-close delegate does not fire for a local disconnect.
    pub fn disconnect(&self) {
        if !self.connected.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(pump) = self.pump.lock().take() {
            pump.abort();
        }
        *self.outbound.lock() = None;
        self.broker.fail_all(Error::NotConnected);
        tracing::info!("Signaling disconnected");
    }

    /// Send a correlated request
    ///
    /// Non-blocking: the continuation fires from the signaling context when
    /// the matching reply (or a transport failure) arrives.
    pub fn request<F>(&self, method: &str, data: Value, continuation: F)
    where
        F: FnOnce(TransactionReply) + Send + 'static,
    {
        let id = self.broker.allocate();
        let frame = RequestFrame::new(id, method, data);
        let payload = match serde_json::to_string(&frame) {
            Ok(payload) => payload,
            Err(e) => {
                continuation(Err(Error::Payload(e.to_string())));
                return;
            }
        };

        self.broker.register(id, continuation);
        tracing::trace!(transaction_id = id, method = %frame.method, "Sending request");

        if !self.send_raw(payload) {
            self.broker.settle(id, Err(Error::NotConnected));
        }
    }

    /// Answer a server-initiated request
    pub fn respond(&self, frame: ResponseFrame) {
        match serde_json::to_string(&frame) {
            Ok(payload) => {
                self.send_raw(payload);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize response frame");
            }
        }
    }

    fn send_raw(&self, payload: String) -> bool {
        let outbound = self.outbound.lock();
        match outbound.as_ref() {
            Some(tx) => tx.send(payload).is_ok(),
            None => false,
        }
    }

    fn route(broker: &TransactionBroker, handler: Option<&dyn SignalingEventHandler>, text: &str) {
        match IncomingMessage::parse(text) {
            Some(IncomingMessage::Response {
                id,
                ok,
                data,
                error_code,
                error_reason,
            }) => {
                let reply = if ok {
                    Ok(data)
                } else {
                    Err(Error::transaction(
                        error_code.unwrap_or(0),
                        error_reason.unwrap_or_default(),
                    ))
                };
                broker.settle(id, reply);
            }
            Some(IncomingMessage::ServerRequest { id, method, data }) => {
                if let Some(handler) = handler {
                    handler.on_server_request(id, &method, data);
                } else {
                    tracing::debug!(method = %method, "Server request with no handler dropped");
                }
            }
            Some(IncomingMessage::Notification { method, data }) => {
                if let Some(handler) = handler {
                    handler.on_notification(&method, data);
                } else {
                    tracing::debug!(method = %method, "Notification with no handler dropped");
                }
            }
            None => {
                tracing::debug!("Unparseable signaling frame dropped");
            }
        }
    }
}

impl Drop for SignalingSession {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.lock().take() {
            pump.abort();
        }
    }
}
