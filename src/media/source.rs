//! Media sources and tracks
//!
//! A `MediaSource` feeds application-supplied raw frames into a local
//! track. The resource registry is its sole owner for the lifetime of the
//! associated producer. Disabling the producer drops the registry's `Arc`
//! entirely, since the engine may hold internal references whose lifetime
//! must not outlive the factory.

use bytes::Bytes;

use super::engine::MediaKind;

/// Raw-frame injection point for a local track
pub trait MediaSource: Send + Sync {
    /// Push one raw frame into the track
    fn input_frame(&self, data: Bytes);

    /// Source width in pixels
    fn width(&self) -> u32;

    /// Source height in pixels
    fn height(&self) -> u32;
}

/// Lightweight reference to an engine-owned track
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackHandle {
    /// Engine-assigned track id
    pub id: String,
    /// Media kind of the track
    pub kind: MediaKind,
}

impl TrackHandle {
    /// Create a track handle
    pub fn new(id: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }
}
