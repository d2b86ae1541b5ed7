//! Room options
//!
//! Immutable configuration snapshot captured at join time. Never mutated
//! after `join`; a new join takes a new snapshot.

/// Options captured when joining a room
#[derive(Debug, Clone)]
pub struct RoomOptions {
    /// Send video with a simulcast encoding ladder
    pub use_simulcast: bool,

    /// Use simulcast for screen-sharing tracks
    pub use_sharing_simulcast: bool,

    /// Force relayed TCP candidates for both transports
    pub force_tcp: bool,

    /// Create the send transport and allow producing
    pub produce: bool,

    /// Create the receive transport and accept consumers
    pub consume: bool,

    /// Accept data-channel consumers
    pub use_datachannel: bool,

    /// Force the H264 codec
    pub force_h264: bool,

    /// Force the VP9 codec
    pub force_vp9: bool,

    /// SVC scalability mode, when the codec supports it
    pub svc: Option<String>,

    /// End-to-end encryption key
    pub e2e_key: Option<String>,
}

impl Default for RoomOptions {
    fn default() -> Self {
        Self {
            use_simulcast: false,
            use_sharing_simulcast: false,
            force_tcp: false,
            produce: true,
            consume: true,
            use_datachannel: true,
            force_h264: false,
            force_vp9: false,
            svc: None,
            e2e_key: None,
        }
    }
}

impl RoomOptions {
    /// Enable or disable simulcast
    pub fn use_simulcast(mut self, enabled: bool) -> Self {
        self.use_simulcast = enabled;
        self
    }

    /// Force relayed TCP candidates
    pub fn force_tcp(mut self, enabled: bool) -> Self {
        self.force_tcp = enabled;
        self
    }

    /// Enable or disable producing
    pub fn produce(mut self, enabled: bool) -> Self {
        self.produce = enabled;
        self
    }

    /// Enable or disable consuming
    pub fn consume(mut self, enabled: bool) -> Self {
        self.consume = enabled;
        self
    }

    /// Enable or disable data channels
    pub fn use_datachannel(mut self, enabled: bool) -> Self {
        self.use_datachannel = enabled;
        self
    }

    /// Set the end-to-end encryption key
    pub fn e2e_key(mut self, key: impl Into<String>) -> Self {
        self.e2e_key = Some(key.into());
        self
    }
}
