//! Typed SFU request surface
//!
//! Thin builders over [`SignalingSession`] for every request the room
//! orchestration issues, so method names and payload shapes live in one
//! place. All calls are non-blocking; fire-and-forget callers pass a
//! logging continuation, the join driver awaits the async variants.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::error::Error;

use super::broker::TransactionReply;
use super::message::ResponseFrame;
use super::session::SignalingSession;

/// Typed request builders over one signaling session
#[derive(Clone)]
pub struct SfuApi {
    session: Arc<SignalingSession>,
}

impl SfuApi {
    /// Wrap a signaling session
    pub fn new(session: Arc<SignalingSession>) -> Self {
        Self { session }
    }

    /// Await-style request used by the join driver
    pub async fn request(&self, method: &str, data: Value) -> TransactionReply {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.session.request(method, data, move |reply| {
            let _ = tx.send(reply);
        });
        rx.await.unwrap_or(Err(Error::SessionClosed))
    }

    /// Callback-style request used by fire-and-forget registry operations
    pub fn request_with<F>(&self, method: &str, data: Value, continuation: F)
    where
        F: FnOnce(TransactionReply) + Send + 'static,
    {
        self.session.request(method, data, continuation);
    }

    /// Fire a request whose failure is only worth a log line
    fn request_logged(&self, method: &'static str, data: Value) {
        self.session.request(method, data, move |reply| {
            if let Err(e) = reply {
                tracing::debug!(method = method, error = %e, "Request rejected");
            }
        });
    }

    /// Fetch the router's RTP capabilities
    pub async fn get_router_rtp_capabilities(&self) -> TransactionReply {
        self.request("getRouterRtpCapabilities", json!({})).await
    }

    /// Ask the server to create a send- or receive-direction transport
    pub async fn create_webrtc_transport(
        &self,
        force_tcp: bool,
        producing: bool,
        consuming: bool,
    ) -> TransactionReply {
        self.request(
            "createWebRtcTransport",
            json!({
                "forceTcp": force_tcp,
                "producing": producing,
                "consuming": consuming,
                "sctpCapabilities": Value::Null,
            }),
        )
        .await
    }

    /// Join the room after transports are up
    pub async fn join(&self, display_name: &str, rtp_capabilities: Value) -> TransactionReply {
        self.request(
            "join",
            json!({
                "displayName": display_name,
                "device": {"name": "sfu-client"},
                "rtpCapabilities": rtp_capabilities,
                "sctpCapabilities": Value::Null,
            }),
        )
        .await
    }

    /// Provide DTLS parameters for a transport the engine is connecting
    pub fn connect_webrtc_transport<F>(
        &self,
        transport_id: &str,
        dtls_parameters: Value,
        continuation: F,
    ) where
        F: FnOnce(TransactionReply) + Send + 'static,
    {
        self.request_with(
            "connectWebRtcTransport",
            json!({
                "transportId": transport_id,
                "dtlsParameters": dtls_parameters,
            }),
            continuation,
        );
    }

    /// Announce a new producer; the reply carries the server-assigned id
    pub fn produce<F>(
        &self,
        transport_id: &str,
        kind: &str,
        rtp_parameters: Value,
        app_data: Value,
        continuation: F,
    ) where
        F: FnOnce(TransactionReply) + Send + 'static,
    {
        self.request_with(
            "produce",
            json!({
                "transportId": transport_id,
                "kind": kind,
                "rtpParameters": rtp_parameters,
                "appData": app_data,
            }),
            continuation,
        );
    }

    /// Close a producer on the server
    pub fn close_producer(&self, producer_id: &str) {
        self.request_logged("closeProducer", json!({ "producerId": producer_id }));
    }

    /// Pause a producer on the server
    pub fn pause_producer(&self, producer_id: &str) {
        self.request_logged("pauseProducer", json!({ "producerId": producer_id }));
    }

    /// Resume a producer on the server
    pub fn resume_producer(&self, producer_id: &str) {
        self.request_logged("resumeProducer", json!({ "producerId": producer_id }));
    }

    /// Pause a consumer on the server
    pub fn pause_consumer(&self, consumer_id: &str) {
        self.request_logged("pauseConsumer", json!({ "consumerId": consumer_id }));
    }

    /// Resume a consumer on the server
    pub fn resume_consumer(&self, consumer_id: &str) {
        self.request_logged("resumeConsumer", json!({ "consumerId": consumer_id }));
    }

    /// Set a consumer's preferred simulcast layers
    pub fn set_consumer_preferred_layers(&self, consumer_id: &str, spatial: u8, temporal: u8) {
        self.request_logged(
            "setConsumerPreferredLayers",
            json!({
                "consumerId": consumer_id,
                "spatialLayer": spatial,
                "temporalLayer": temporal,
            }),
        );
    }

    /// Acknowledge a server-initiated request
    pub fn respond_ok(&self, request_id: u64) {
        self.session.respond(ResponseFrame::ack(request_id));
    }

    /// Reject a server-initiated request
    pub fn respond_error(&self, request_id: u64, code: i32, reason: &str) {
        self.session
            .respond(ResponseFrame::reject(request_id, code, reason));
    }
}
