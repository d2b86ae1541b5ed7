//! Room lifecycle state

/// Room lifecycle state
///
/// `Unknown` → `Connecting` on `join`, `Connecting` → `Connected` once the
/// device is loaded and every requested transport is up, and any state →
/// `Closed` on `leave`, signaling disconnect, or unrecoverable join
/// failure. There is no transition out of `Closed` except through a new
/// `join`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomState {
    /// No join attempted yet
    Unknown,
    /// Join in progress
    Connecting,
    /// Joined; produce/consume surface is live
    Connected,
    /// Left, disconnected, or join failed
    Closed,
}

impl std::fmt::Display for RoomState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RoomState::Unknown => "unknown",
            RoomState::Connecting => "connecting",
            RoomState::Connected => "connected",
            RoomState::Closed => "closed",
        };
        f.write_str(name)
    }
}
