//! Client-side room orchestration for an SFU.
//!
//! This crate drives one participant's membership in a selective-forwarding
//! media room: it speaks the server's JSON signaling protocol, walks the
//! join handshake (router capabilities, WebRTC transports, join), and keeps
//! an authoritative registry of local producers and remote consumers while
//! the server pushes lifecycle events at it. The actual media stack (ICE,
//! DTLS, codecs, the real producer and consumer objects) lives behind the
//! [`media::MediaEngine`] trait and is supplied by the embedding
//! application.
//!
//! # Concurrency model
//!
//! State is confined, not shared: every mutable structure has one owning
//! execution context (a named FIFO task queue, see [`executor`]), and other
//! contexts reach it only by posting tasks. Observer callbacks run on the
//! context chosen at registration, never inline on the notifying one.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use sfu_client::room::{RoomObserver, RoomOptions, RoomSession, RoomState, OBSERVER_CONTEXT};
//!
//! struct StateLogger;
//!
//! impl RoomObserver for StateLogger {
//!     fn on_room_state_changed(&self, state: RoomState) {
//!         println!("room is now {state}");
//!     }
//! }
//!
//! # fn demo(transport: Arc<dyn sfu_client::signaling::SignalingTransport>,
//! #         engine: Arc<dyn sfu_client::media::MediaEngine>) -> sfu_client::Result<()> {
//! let session = RoomSession::new(transport, engine);
//!
//! let observer: Arc<dyn RoomObserver> = Arc::new(StateLogger);
//! session.add_room_observer(&observer, OBSERVER_CONTEXT)?;
//!
//! session.join(
//!     "sfu.example.com",
//!     4443,
//!     "demo",
//!     "alice",
//!     "Alice",
//!     RoomOptions::default().use_simulcast(true),
//! );
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod executor;
pub mod media;
pub mod observer;
pub mod room;
pub mod signaling;

pub use error::{Error, Result};
pub use room::{RoomOptions, RoomSession, RoomState};
