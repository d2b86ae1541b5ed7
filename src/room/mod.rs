//! Room orchestration
//!
//! The room module ties the crate together: a [`RoomSession`] drives the
//! join handshake over signaling, owns the [`ResourceRegistry`] of local
//! producers and remote consumers, and fans state changes out to observers.
//!
//! # Architecture
//!
//! ```text
//!    [application]                         [SFU server]
//!         │ join/enable*/mute*                  ▲
//!         ▼                                     │ JSON frames
//!    RoomSession ──► SfuApi ──► SignalingSession┘
//!         │                          │ server pushes
//!         │ post()                   ▼
//!         │                 SessionSignalingHandler
//!         ▼                          │ post()
//!    media-engine context ◄──────────┘
//!         │
//!         ▼
//!    ResourceRegistry ──► MediaEngine (transports, producers, consumers)
//!         │
//!         ▼
//!    ObserverBus ──► application observers, each on its own context
//! ```
//!
//! Every piece of mutable room state is touched only from tasks posted to
//! the media-engine context; its FIFO order is what serializes racing
//! server notifications against local operations.

pub mod events;
pub mod options;
pub mod registry;
pub mod session;
pub mod state;

pub use events::{MediaObserver, RoomObserver};
pub use options::RoomOptions;
pub use registry::ResourceRegistry;
pub use session::{RoomSession, MEDIA_CONTEXT, OBSERVER_CONTEXT};
pub use state::RoomState;
