//! Media engine collaborator interface
//!
//! The engine that performs ICE/DTLS negotiation, encoding and the actual
//! SFU producer/consumer objects lives outside this crate. These traits
//! pin down the boundary the orchestration layer drives: device loading,
//! transport creation, produce/consume, and the two-phase hooks the engine
//! uses to ask the session for signaling round trips.
//!
//! Engine methods are synchronous: they are only ever invoked from tasks
//! posted to the media-engine context, mirroring how the underlying stacks
//! expect to be called from one owning thread.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::Result;
use crate::signaling::TransportInfo;

use super::source::{MediaSource, TrackHandle};

/// Media kind of a producer or consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    /// Wire name of the kind
    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One simulcast encoding layer
#[derive(Debug, Clone)]
pub struct EncodingLayer {
    /// Restriction identifier ("h", "m", "l")
    pub rid: &'static str,
    /// Maximum bitrate in bits per second
    pub max_bitrate_bps: u32,
    /// Downscale factor relative to the source resolution
    pub scale_resolution_down_by: u32,
}

/// Everything the engine needs to create a local producer
pub struct ProduceSpec {
    pub kind: MediaKind,
    /// Logical track name; the microphone uses an implicit fixed name
    pub track_name: String,
    /// Simulcast ladder; empty for single-layer or audio
    pub encodings: Vec<EncodingLayer>,
    /// Codec options forwarded verbatim
    pub codec_options: Value,
    /// Application data forwarded verbatim
    pub app_data: Value,
    /// Raw-frame source backing the track, when the caller injects frames
    pub source: Option<Arc<dyn MediaSource>>,
}

/// Everything the engine needs to create a remote consumer
pub struct ConsumeSpec {
    pub consumer_id: String,
    pub producer_id: String,
    pub kind: MediaKind,
    pub rtp_parameters: Value,
    pub app_data: Value,
}

/// Everything the engine needs to create a remote data consumer
pub struct ConsumeDataSpec {
    pub consumer_id: String,
    pub data_producer_id: String,
    pub stream_id: u16,
    pub label: String,
    pub protocol: String,
    pub app_data: Value,
}

/// Local send resource created by the engine
pub trait ProducerHandle: Send + Sync {
    fn id(&self) -> String;
    fn kind(&self) -> MediaKind;
    fn pause(&self);
    fn resume(&self);
    fn is_paused(&self) -> bool;
    fn close(&self);
}

/// Remote receive resource created by the engine
pub trait ConsumerHandle: Send + Sync {
    fn id(&self) -> String;
    fn producer_id(&self) -> String;
    fn kind(&self) -> MediaKind;
    fn track(&self) -> TrackHandle;
    fn pause(&self);
    fn resume(&self);
    fn is_paused(&self) -> bool;
    fn close(&self);
}

/// Remote data-channel receive resource
pub trait DataConsumerHandle: Send + Sync {
    fn id(&self) -> String;
    fn label(&self) -> String;
    fn close(&self);
}

/// Engine-to-session callbacks for signaling round trips
///
/// Both calls return immediately; the result is supplied later through the
/// `done` sender, resolved from a task on whichever context completes the
/// round trip. The engine must never block its calling context on these.
pub trait TransportHooks: Send + Sync {
    /// The transport needs its DTLS parameters relayed to the server
    fn on_connect(&self, transport_id: &str, dtls_parameters: Value, done: oneshot::Sender<Result<()>>);

    /// A produce call needs the server-assigned producer id
    fn on_produce(
        &self,
        transport_id: &str,
        kind: MediaKind,
        rtp_parameters: Value,
        app_data: Value,
        done: oneshot::Sender<Result<String>>,
    );
}

/// Send-direction transport handle
pub trait SendTransport: Send + Sync {
    fn id(&self) -> String;
    fn produce(&self, spec: ProduceSpec) -> Result<Arc<dyn ProducerHandle>>;
    fn close(&self);
}

/// Receive-direction transport handle
pub trait RecvTransport: Send + Sync {
    fn id(&self) -> String;
    fn consume(&self, spec: ConsumeSpec) -> Result<Arc<dyn ConsumerHandle>>;
    fn consume_data(&self, spec: ConsumeDataSpec) -> Result<Arc<dyn DataConsumerHandle>>;
    fn close(&self);
}

/// The media engine boundary
pub trait MediaEngine: Send + Sync {
    /// Load the device with the router's RTP capabilities
    fn load_device(&self, router_rtp_capabilities: &Value) -> Result<()>;

    /// Whether the device has been loaded
    fn is_loaded(&self) -> bool;

    /// Whether the loaded device can produce the given kind
    fn can_produce(&self, kind: MediaKind) -> bool;

    /// The device's own RTP capabilities, sent with the join request
    fn rtp_capabilities(&self) -> Value;

    /// Create the send-direction transport
    fn create_send_transport(
        &self,
        info: &TransportInfo,
        hooks: Arc<dyn TransportHooks>,
    ) -> Result<Arc<dyn SendTransport>>;

    /// Create the receive-direction transport
    fn create_recv_transport(
        &self,
        info: &TransportInfo,
        hooks: Arc<dyn TransportHooks>,
    ) -> Result<Arc<dyn RecvTransport>>;

    /// Create a raw-frame video source with the given dimensions
    fn create_video_source(&self, width: u32, height: u32) -> Result<Arc<dyn MediaSource>>;
}
