//! Resource registry
//!
//! Authoritative owner of the room's local producers, media sources,
//! remote consumers, data consumers, and the consumer-id→peer-id index.
//! Applies local and remote lifecycle transitions and emits observer
//! notifications for each state change.
//!
//! All mutation is confined to tasks posted to the media-engine context;
//! the internal lock exists for soundness and is short-held and
//! uncontended under that discipline. The FIFO order of the media context
//! is what makes racing remote notifications (pause after close, resume
//! after pause) apply in arrival order.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::json;

use crate::media::{
    ConsumeDataSpec, ConsumeSpec, ConsumerHandle, DataConsumerHandle, EncodingLayer, MediaEngine,
    MediaKind, MediaSource, ProduceSpec, ProducerHandle, RecvTransport, SendTransport, TrackHandle,
};
use crate::observer::ObserverBus;
use crate::signaling::SfuApi;

use super::events::MediaObserver;
use super::options::RoomOptions;

/// Track name used for the implicit microphone producer
const MIC_TRACK_NAME: &str = "mic-track";

/// Default preferred simulcast layers requested for every new consumer
const PREFERRED_SPATIAL_LAYER: u8 = 1;
const PREFERRED_TEMPORAL_LAYER: u8 = 1;

/// Simulcast ladder for locally produced video
fn simulcast_encodings() -> Vec<EncodingLayer> {
    vec![
        EncodingLayer {
            rid: "h",
            max_bitrate_bps: 5_000_000,
            scale_resolution_down_by: 1,
        },
        EncodingLayer {
            rid: "m",
            max_bitrate_bps: 1_000_000,
            scale_resolution_down_by: 2,
        },
        EncodingLayer {
            rid: "l",
            max_bitrate_bps: 500_000,
            scale_resolution_down_by: 4,
        },
    ]
}

#[derive(Default)]
struct RegistryState {
    send_transport: Option<Arc<dyn SendTransport>>,
    recv_transport: Option<Arc<dyn RecvTransport>>,

    mic_producer: Option<Arc<dyn ProducerHandle>>,

    /// Local video producers keyed by track name
    producers: HashMap<String, Arc<dyn ProducerHandle>>,

    /// Raw-frame sources keyed by track name
    sources: HashMap<String, Arc<dyn MediaSource>>,

    /// Remote consumers keyed by server-assigned consumer id
    consumers: HashMap<String, Arc<dyn ConsumerHandle>>,

    /// Remote data consumers keyed by server-assigned consumer id
    data_consumers: HashMap<String, Arc<dyn DataConsumerHandle>>,

    /// Side index: consumer id → owning peer id
    consumer_to_peer: HashMap<String, String>,
}

/// Per-room resource registry
pub struct ResourceRegistry {
    options: RoomOptions,
    engine: Arc<dyn MediaEngine>,
    api: SfuApi,
    observers: Arc<ObserverBus<dyn MediaObserver>>,
    state: Mutex<RegistryState>,
}

impl ResourceRegistry {
    /// Create an empty registry
    pub fn new(
        options: RoomOptions,
        engine: Arc<dyn MediaEngine>,
        api: SfuApi,
        observers: Arc<ObserverBus<dyn MediaObserver>>,
    ) -> Self {
        Self {
            options,
            engine,
            api,
            observers,
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// Install the send transport after the join handshake creates it
    pub fn set_send_transport(&self, transport: Arc<dyn SendTransport>) {
        self.state.lock().send_transport = Some(transport);
    }

    /// Install the receive transport after the join handshake creates it
    pub fn set_recv_transport(&self, transport: Arc<dyn RecvTransport>) {
        self.state.lock().recv_transport = Some(transport);
    }

    // ---- local producers -------------------------------------------------

    /// Enable or disable the microphone producer
    pub fn enable_audio(&self, enabled: bool) {
        if !self.engine.is_loaded() {
            tracing::warn!("enableAudio: device not loaded");
            return;
        }
        if !self.engine.can_produce(MediaKind::Audio) {
            tracing::warn!("enableAudio: device cannot produce audio");
            return;
        }

        let mut state = self.state.lock();
        let Some(send_transport) = state.send_transport.clone() else {
            tracing::warn!("enableAudio: send transport is absent");
            return;
        };

        if enabled {
            if state.mic_producer.is_some() {
                tracing::debug!("enableAudio: already has a mic producer");
                return;
            }

            let spec = ProduceSpec {
                kind: MediaKind::Audio,
                track_name: MIC_TRACK_NAME.to_owned(),
                encodings: Vec::new(),
                codec_options: json!({ "opusStereo": true, "opusDtx": true }),
                app_data: json!({}),
                source: None,
            };
            match send_transport.produce(spec) {
                Ok(producer) => {
                    tracing::info!(producer_id = %producer.id(), "Mic producer created");
                    state.mic_producer = Some(producer);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "enableAudio: produce failed");
                }
            }
        } else {
            let Some(producer) = state.mic_producer.take() else {
                tracing::debug!("enableAudio: no mic producer to close");
                return;
            };
            self.api.close_producer(&producer.id());
            producer.close();
            tracing::info!("Mic producer closed");
        }
    }

    /// Pause or resume the microphone producer
    pub fn mute_audio(&self, muted: bool) {
        let state = self.state.lock();
        let Some(producer) = state.mic_producer.as_ref() else {
            tracing::debug!("muteAudio: no mic producer");
            return;
        };

        if muted {
            producer.pause();
            self.api.pause_producer(&producer.id());
        } else {
            producer.resume();
            self.api.resume_producer(&producer.id());
        }
    }

    /// Whether the microphone is muted; `true` when there is no producer
    pub fn is_audio_muted(&self) -> bool {
        let state = self.state.lock();
        match state.mic_producer.as_ref() {
            Some(producer) => producer.is_paused(),
            None => true,
        }
    }

    /// Enable or disable a named local video producer
    pub fn enable_video(&self, enabled: bool, track_name: &str, width: u32, height: u32) {
        if !self.engine.is_loaded() {
            tracing::warn!("enableVideo: device not loaded");
            return;
        }
        if !self.engine.can_produce(MediaKind::Video) {
            tracing::warn!("enableVideo: device cannot produce video");
            return;
        }

        let mut state = self.state.lock();
        let Some(send_transport) = state.send_transport.clone() else {
            tracing::warn!("enableVideo: send transport is absent");
            return;
        };

        if enabled {
            if state.producers.contains_key(track_name) {
                tracing::debug!(track = %track_name, "enableVideo: producer already exists");
                return;
            }
            if state.sources.contains_key(track_name) {
                tracing::debug!(track = %track_name, "enableVideo: source already exists");
                return;
            }

            let source = match self.engine.create_video_source(width, height) {
                Ok(source) => source,
                Err(e) => {
                    tracing::warn!(track = %track_name, error = %e, "enableVideo: source creation failed");
                    return;
                }
            };

            let spec = ProduceSpec {
                kind: MediaKind::Video,
                track_name: track_name.to_owned(),
                encodings: if self.options.use_simulcast {
                    simulcast_encodings()
                } else {
                    Vec::new()
                },
                codec_options: json!({
                    "videoGoogleStartBitrate": 20 * 1024,
                    "videoGoogleMaxBitrate": 20 * 1024,
                    "videoGoogleMinBitrate": 0,
                }),
                app_data: json!({ "sharing": { "trackName": track_name } }),
                source: Some(Arc::clone(&source)),
            };
            match send_transport.produce(spec) {
                Ok(producer) => {
                    tracing::info!(track = %track_name, producer_id = %producer.id(), "Video producer created");
                    state.sources.insert(track_name.to_owned(), source);
                    state.producers.insert(track_name.to_owned(), producer);
                }
                Err(e) => {
                    tracing::warn!(track = %track_name, error = %e, "enableVideo: produce failed");
                }
            }
        } else {
            // Release the source first: the engine must not keep feeding a
            // track that is about to close.
            state.sources.remove(track_name);

            let Some(producer) = state.producers.remove(track_name) else {
                tracing::debug!(track = %track_name, "enableVideo: no producer to close");
                return;
            };
            self.api.close_producer(&producer.id());
            producer.close();
            tracing::info!(track = %track_name, "Video producer closed");
        }
    }

    /// Inject one raw frame into a named track's source
    ///
    /// Unknown track names are silently ignored.
    pub fn input_frame(&self, track_name: &str, data: Bytes) {
        let source = self.state.lock().sources.get(track_name).cloned();
        if let Some(source) = source {
            source.input_frame(data);
        }
    }

    // ---- remote consumers ------------------------------------------------

    /// Create a consumer from a server `newConsumer` request
    ///
    /// Local state is committed before the request is acknowledged, so a
    /// pause notification racing right behind the ack always finds the
    /// consumer registered.
    pub fn create_consumer(&self, request_id: u64, data: crate::signaling::message::NewConsumerData) {
        if !self.options.consume {
            tracing::debug!(consumer_id = %data.id, "newConsumer: consuming is disabled");
            return;
        }

        let mut state = self.state.lock();
        let Some(recv_transport) = state.recv_transport.clone() else {
            tracing::warn!(consumer_id = %data.id, "newConsumer: recv transport is absent");
            return;
        };

        let spec = ConsumeSpec {
            consumer_id: data.id.clone(),
            producer_id: data.producer_id.clone(),
            kind: data.kind,
            rtp_parameters: data.rtp_parameters.clone(),
            app_data: data.app_data.clone(),
        };
        let consumer = match recv_transport.consume(spec) {
            Ok(consumer) => consumer,
            Err(e) => {
                tracing::warn!(consumer_id = %data.id, error = %e, "newConsumer: consume failed");
                return;
            }
        };

        state.consumers.insert(data.id.clone(), Arc::clone(&consumer));
        state
            .consumer_to_peer
            .insert(data.id.clone(), data.peer_id.clone());
        drop(state);

        tracing::info!(
            consumer_id = %data.id,
            peer_id = %data.peer_id,
            kind = %data.kind,
            "Consumer created"
        );

        let peer_id = data.peer_id.clone();
        let consumer_id = data.id.clone();
        let track = consumer.track();
        let producer_paused = data.producer_paused;
        let app_data = data.app_data.clone();
        match data.kind {
            MediaKind::Audio => {
                self.observers.notify(move |observer| {
                    observer.on_create_remote_audio_track(&peer_id, &consumer_id, &track);
                    observer.on_remote_audio_state_changed(&peer_id, producer_paused);
                });
            }
            MediaKind::Video => {
                self.observers.notify(move |observer| {
                    observer.on_create_remote_video_track(&peer_id, &consumer_id, &track, &app_data);
                    observer.on_remote_video_state_changed(&peer_id, producer_paused);
                });
            }
        }

        // Ack strictly after the maps are committed
        self.api.respond_ok(request_id);
        self.api.set_consumer_preferred_layers(
            &data.id,
            PREFERRED_SPATIAL_LAYER,
            PREFERRED_TEMPORAL_LAYER,
        );
    }

    /// Create a data consumer from a server `newDataConsumer` request
    pub fn create_data_consumer(
        &self,
        request_id: u64,
        data: crate::signaling::message::NewDataConsumerData,
    ) {
        if !self.options.consume {
            tracing::debug!(consumer_id = %data.id, "newDataConsumer: consuming is disabled");
            return;
        }
        if !self.options.use_datachannel {
            tracing::debug!(consumer_id = %data.id, "newDataConsumer: datachannel is disabled");
            return;
        }

        let mut state = self.state.lock();
        let Some(recv_transport) = state.recv_transport.clone() else {
            tracing::warn!(consumer_id = %data.id, "newDataConsumer: recv transport is absent");
            return;
        };

        let spec = ConsumeDataSpec {
            consumer_id: data.id.clone(),
            data_producer_id: data.data_producer_id.clone(),
            stream_id: data.sctp_stream_parameters.stream_id,
            label: data.label.clone(),
            protocol: data.protocol.clone(),
            app_data: data.app_data.clone(),
        };
        let consumer = match recv_transport.consume_data(spec) {
            Ok(consumer) => consumer,
            Err(e) => {
                tracing::warn!(consumer_id = %data.id, error = %e, "newDataConsumer: consume failed");
                return;
            }
        };

        state.data_consumers.insert(data.id.clone(), consumer);
        state
            .consumer_to_peer
            .insert(data.id.clone(), data.peer_id.clone());
        drop(state);

        tracing::info!(
            consumer_id = %data.id,
            peer_id = %data.peer_id,
            label = %data.label,
            "Data consumer created"
        );

        self.api.respond_ok(request_id);
    }

    /// Apply a remote pause or resume to a consumer
    ///
    /// A notification for an unknown consumer id (e.g. one that raced a
    /// local close) is a safe no-op.
    pub fn set_consumer_paused(&self, consumer_id: &str, paused: bool) {
        let state = self.state.lock();
        let Some(consumer) = state.consumers.get(consumer_id).cloned() else {
            tracing::debug!(consumer_id = %consumer_id, "Pause/resume for unknown consumer dropped");
            return;
        };
        let peer_id = state
            .consumer_to_peer
            .get(consumer_id)
            .cloned()
            .unwrap_or_default();
        drop(state);

        if paused {
            consumer.pause();
        } else {
            consumer.resume();
        }
        let muted = consumer.is_paused();

        match consumer.kind() {
            MediaKind::Audio => {
                self.observers.notify(move |observer| {
                    observer.on_remote_audio_state_changed(&peer_id, muted);
                });
            }
            MediaKind::Video => {
                self.observers.notify(move |observer| {
                    observer.on_remote_video_state_changed(&peer_id, muted);
                });
            }
        }
    }

    /// Apply a remote close to a consumer
    ///
    /// Observer events fire before the entries are erased so observers can
    /// still inspect registry state while handling the removal; the map and
    /// the index are erased together.
    pub fn close_consumer(&self, consumer_id: &str) {
        let state = self.state.lock();
        let Some(consumer) = state.consumers.get(consumer_id).cloned() else {
            tracing::debug!(consumer_id = %consumer_id, "Close for unknown consumer dropped");
            return;
        };
        let peer_id = state
            .consumer_to_peer
            .get(consumer_id)
            .cloned()
            .unwrap_or_default();
        drop(state);

        let id = consumer_id.to_owned();
        match consumer.kind() {
            MediaKind::Audio => {
                let peer_id = peer_id.clone();
                self.observers.notify(move |observer| {
                    observer.on_remote_audio_state_changed(&peer_id, true);
                    observer.on_remove_remote_audio_track(&peer_id, &id);
                });
            }
            MediaKind::Video => {
                let peer_id = peer_id.clone();
                self.observers.notify(move |observer| {
                    observer.on_remote_video_state_changed(&peer_id, true);
                    observer.on_remove_remote_video_track(&peer_id, &id);
                });
            }
        }

        consumer.close();

        let mut state = self.state.lock();
        state.consumers.remove(consumer_id);
        state.consumer_to_peer.remove(consumer_id);
        tracing::info!(consumer_id = %consumer_id, peer_id = %peer_id, "Consumer closed");
    }

    /// Apply a remote close to a data consumer
    pub fn close_data_consumer(&self, consumer_id: &str) {
        let mut state = self.state.lock();
        let Some(consumer) = state.data_consumers.remove(consumer_id) else {
            tracing::debug!(consumer_id = %consumer_id, "Close for unknown data consumer dropped");
            return;
        };
        state.consumer_to_peer.remove(consumer_id);
        drop(state);

        consumer.close();
        tracing::info!(consumer_id = %consumer_id, "Data consumer closed");
    }

    // ---- per-peer control and queries ------------------------------------

    /// Pause or resume every consumer of a kind belonging to a peer, on
    /// both the local engine object and the server
    pub fn set_peer_muted(&self, peer_id: &str, kind: MediaKind, muted: bool) {
        let consumers = self.peer_consumers(peer_id, kind);
        if consumers.is_empty() {
            tracing::debug!(peer_id = %peer_id, kind = %kind, "No consumers to mute");
            return;
        }

        for consumer in consumers {
            if muted {
                consumer.pause();
                self.api.pause_consumer(&consumer.id());
            } else {
                consumer.resume();
                self.api.resume_consumer(&consumer.id());
            }
        }
    }

    /// Whether a peer's media of a kind is muted
    ///
    /// `true` unless at least one matching, unpaused consumer exists; an
    /// unknown peer id therefore reads as muted rather than failing.
    pub fn is_peer_muted(&self, peer_id: &str, kind: MediaKind) -> bool {
        !self
            .peer_consumers(peer_id, kind)
            .iter()
            .any(|consumer| !consumer.is_paused())
    }

    /// Tracks of a kind currently consumed from a peer, keyed by consumer id
    pub fn remote_tracks(&self, peer_id: &str, kind: MediaKind) -> HashMap<String, TrackHandle> {
        self.peer_consumers(peer_id, kind)
            .into_iter()
            .map(|consumer| (consumer.id(), consumer.track()))
            .collect()
    }

    fn peer_consumers(&self, peer_id: &str, kind: MediaKind) -> Vec<Arc<dyn ConsumerHandle>> {
        let state = self.state.lock();
        state
            .consumer_to_peer
            .iter()
            .filter(|(_, owner)| owner.as_str() == peer_id)
            .filter_map(|(consumer_id, _)| state.consumers.get(consumer_id))
            .filter(|consumer| consumer.kind() == kind)
            .cloned()
            .collect()
    }

    // ---- teardown --------------------------------------------------------

    /// Close every owned resource and both transports
    ///
    /// Used by `leave` and session teardown; issues no server transactions,
    /// the room-level leave handles signaling.
    pub fn close_all(&self) {
        let mut state = self.state.lock();

        if let Some(producer) = state.mic_producer.take() {
            producer.close();
        }
        for (_, producer) in state.producers.drain() {
            producer.close();
        }
        state.sources.clear();

        for (_, consumer) in state.data_consumers.drain() {
            consumer.close();
        }
        for (_, consumer) in state.consumers.drain() {
            consumer.close();
        }
        state.consumer_to_peer.clear();

        if let Some(transport) = state.send_transport.take() {
            transport.close();
        }
        if let Some(transport) = state.recv_transport.take() {
            transport.close();
        }

        tracing::debug!("Registry cleared");
    }
}
