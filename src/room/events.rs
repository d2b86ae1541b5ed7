//! Application-facing observer traits
//!
//! Split into one capability interface per concern; applications implement
//! only what they care about. All methods default to no-ops except the
//! room-state callback, which is the one signal every observer needs.
//! Callbacks run on the execution context chosen at registration.

use serde_json::Value;

use crate::media::TrackHandle;

use super::state::RoomState;

/// Room lifecycle events
pub trait RoomObserver: Send + Sync {
    /// The room moved to a new lifecycle state
    fn on_room_state_changed(&self, state: RoomState);

    /// The local participant's speaking volume changed
    fn on_local_active_speaker(&self, volume: i32) {
        let _ = volume;
    }
}

/// Remote media events
pub trait MediaObserver: Send + Sync {
    /// A remote peer's audio track became available
    fn on_create_remote_audio_track(&self, peer_id: &str, consumer_id: &str, track: &TrackHandle) {
        let _ = (peer_id, consumer_id, track);
    }

    /// A remote peer's audio track went away
    fn on_remove_remote_audio_track(&self, peer_id: &str, consumer_id: &str) {
        let _ = (peer_id, consumer_id);
    }

    /// A remote peer's video track became available
    ///
    /// `app_data` carries the producer's application data, including the
    /// sharing track name.
    fn on_create_remote_video_track(
        &self,
        peer_id: &str,
        consumer_id: &str,
        track: &TrackHandle,
        app_data: &Value,
    ) {
        let _ = (peer_id, consumer_id, track, app_data);
    }

    /// A remote peer's video track went away
    fn on_remove_remote_video_track(&self, peer_id: &str, consumer_id: &str) {
        let _ = (peer_id, consumer_id);
    }

    /// A remote peer's audio mute state changed
    fn on_remote_audio_state_changed(&self, peer_id: &str, muted: bool) {
        let _ = (peer_id, muted);
    }

    /// A remote peer's video mute state changed
    fn on_remote_video_state_changed(&self, peer_id: &str, muted: bool) {
        let _ = (peer_id, muted);
    }
}
