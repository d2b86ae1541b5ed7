//! Signaling wire model
//!
//! The SFU speaks a JSON protocol with three frame shapes: client requests
//! expecting exactly one correlated response, server-to-client requests the
//! client must answer, and fire-and-forget notifications. This module only
//! models the frames the orchestration layer consumes; payloads it merely
//! forwards (RTP parameters, DTLS parameters, app data) stay opaque
//! `serde_json::Value`s.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::media::MediaKind;

/// Outbound request frame
#[derive(Debug, Clone, Serialize)]
pub struct RequestFrame {
    pub request: bool,
    pub id: u64,
    pub method: String,
    pub data: Value,
}

impl RequestFrame {
    /// Build a request with a fresh correlation id
    pub fn new(id: u64, method: impl Into<String>, data: Value) -> Self {
        Self {
            request: true,
            id,
            method: method.into(),
            data,
        }
    }
}

/// Outbound response frame, used to answer server-initiated requests
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseFrame {
    pub response: bool,
    pub id: u64,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
}

impl ResponseFrame {
    /// Acknowledge a server request
    pub fn ack(id: u64) -> Self {
        Self {
            response: true,
            id,
            ok: true,
            error_code: None,
            error_reason: None,
        }
    }

    /// Reject a server request
    pub fn reject(id: u64, code: i32, reason: impl Into<String>) -> Self {
        Self {
            response: true,
            id,
            ok: false,
            error_code: Some(code),
            error_reason: Some(reason.into()),
        }
    }
}

/// A parsed inbound frame
#[derive(Debug)]
pub enum IncomingMessage {
    /// Correlated reply to one of our requests
    Response {
        id: u64,
        ok: bool,
        data: Value,
        error_code: Option<i32>,
        error_reason: Option<String>,
    },
    /// Server-initiated request that expects a response from us
    ServerRequest { id: u64, method: String, data: Value },
    /// Fire-and-forget server notification
    Notification { method: String, data: Value },
}

impl IncomingMessage {
    /// Classify a raw frame
    ///
    /// Returns `None` for frames that are not valid JSON objects or match
    /// none of the three shapes; callers drop and log those.
    pub fn parse(text: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(text).ok()?;
        let obj = value.as_object()?;

        if obj.get("response").and_then(Value::as_bool) == Some(true) {
            let id = obj.get("id").and_then(Value::as_u64)?;
            return Some(IncomingMessage::Response {
                id,
                ok: obj.get("ok").and_then(Value::as_bool).unwrap_or(false),
                data: obj.get("data").cloned().unwrap_or(Value::Null),
                error_code: obj
                    .get("errorCode")
                    .and_then(Value::as_i64)
                    .map(|c| c as i32),
                error_reason: obj
                    .get("errorReason")
                    .and_then(Value::as_str)
                    .map(str::to_owned),
            });
        }

        let method = obj.get("method").and_then(Value::as_str)?.to_owned();
        let data = obj.get("data").cloned().unwrap_or(Value::Null);

        if obj.get("request").and_then(Value::as_bool) == Some(true) {
            let id = obj.get("id").and_then(Value::as_u64)?;
            return Some(IncomingMessage::ServerRequest { id, method, data });
        }

        if obj.get("notification").and_then(Value::as_bool) == Some(true) {
            return Some(IncomingMessage::Notification { method, data });
        }

        None
    }
}

/// Transport parameters from a `createWebRtcTransport` response
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportInfo {
    pub id: String,
    #[serde(default)]
    pub ice_parameters: Value,
    #[serde(default)]
    pub ice_candidates: Value,
    #[serde(default)]
    pub dtls_parameters: Value,
    #[serde(default)]
    pub sctp_parameters: Value,
}

/// Payload of a server `newConsumer` request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewConsumerData {
    pub id: String,
    pub producer_id: String,
    pub kind: MediaKind,
    #[serde(default)]
    pub rtp_parameters: Value,
    #[serde(default)]
    pub app_data: Value,
    #[serde(default)]
    pub peer_id: String,
    #[serde(default)]
    pub producer_paused: bool,
}

/// Payload of a server `newDataConsumer` request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDataConsumerData {
    pub id: String,
    pub data_producer_id: String,
    #[serde(default)]
    pub sctp_stream_parameters: SctpStreamParameters,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub app_data: Value,
    #[serde(default)]
    pub peer_id: String,
}

/// SCTP stream parameters carried by data-consumer payloads
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SctpStreamParameters {
    #[serde(default)]
    pub stream_id: u16,
    #[serde(default)]
    pub ordered: bool,
}

/// Payload of consumer pause/resume/close notifications
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerStateData {
    #[serde(default)]
    pub consumer_id: String,
}

/// Payload of an `activeSpeaker` notification
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSpeakerData {
    #[serde(default)]
    pub peer_id: Option<String>,
    #[serde(default)]
    pub volume: i32,
}

/// Decode a typed payload, mapping failures to a protocol error
pub fn decode<T: serde::de::DeserializeOwned>(data: Value) -> Result<T> {
    serde_json::from_value(data).map_err(|e| Error::Payload(e.to_string()))
}
