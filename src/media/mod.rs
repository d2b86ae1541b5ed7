//! Media engine boundary
//!
//! Collaborator traits for the external engine that owns codecs, ICE/DTLS
//! and the real producer/consumer objects, plus the raw-frame source
//! abstraction.

pub mod engine;
pub mod source;

pub use engine::{
    ConsumeDataSpec, ConsumeSpec, ConsumerHandle, DataConsumerHandle, EncodingLayer, MediaEngine,
    MediaKind, ProduceSpec, ProducerHandle, RecvTransport, SendTransport, TransportHooks,
};
pub use source::{MediaSource, TrackHandle};
