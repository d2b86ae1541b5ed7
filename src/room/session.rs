//! Room session
//!
//! Facade and orchestration layer: owns the signaling session, the context
//! pool, the observer buses and the resource registry, and drives the join
//! handshake. Server pushes arrive on the signaling pump, get classified by
//! a delegated handler, and are re-posted to the media-engine context where
//! all registry and engine state is touched.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::executor::{ContextPool, TaskContext};
use crate::media::{MediaEngine, MediaKind, TrackHandle, TransportHooks};
use crate::observer::ObserverBus;
use crate::signaling::message::{
    self, ActiveSpeakerData, ConsumerStateData, NewConsumerData, NewDataConsumerData,
    TransportInfo,
};
use crate::signaling::{SfuApi, SignalingEventHandler, SignalingSession, SignalingTransport};

use super::events::{MediaObserver, RoomObserver};
use super::options::RoomOptions;
use super::registry::ResourceRegistry;
use super::state::RoomState;

/// Context that owns all engine and registry state
pub const MEDIA_CONTEXT: &str = "media-engine";

/// Default context for application observer callbacks
pub const OBSERVER_CONTEXT: &str = "observer";

/// Signaling subprotocol spoken with the SFU
const SIGNALING_SUBPROTOCOL: &str = "protoo";

struct JoinParams {
    url: String,
    peer_id: String,
    display_name: String,
}

fn signaling_url(host: &str, port: u16, room_id: &str, peer_id: &str) -> String {
    format!("wss://{host}:{port}/?roomId={room_id}&peerId={peer_id}")
}

struct SessionCore {
    signaling: Arc<SignalingSession>,
    api: SfuApi,
    engine: Arc<dyn MediaEngine>,
    media_ctx: TaskContext,

    room_observers: Arc<ObserverBus<dyn RoomObserver>>,
    media_observers: Arc<ObserverBus<dyn MediaObserver>>,

    state: Mutex<RoomState>,
    registry: Mutex<Option<Arc<ResourceRegistry>>>,
    local_peer_id: Mutex<Option<String>>,
    room_id: Mutex<Option<String>>,
    speaking_volume: AtomicI32,
    join_task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionCore {
    fn registry(&self) -> Option<Arc<ResourceRegistry>> {
        self.registry.lock().clone()
    }

    /// Move to a new lifecycle state, refusing invalid transitions
    ///
    /// The observer notification fires outside the state lock. Returns
    /// whether the transition happened; `Closed` is terminal until the
    /// next `join`.
    fn transition(&self, next: RoomState) -> bool {
        {
            let mut state = self.state.lock();
            let allowed = match next {
                RoomState::Unknown => false,
                RoomState::Connecting => {
                    matches!(*state, RoomState::Unknown | RoomState::Closed)
                }
                RoomState::Connected => *state == RoomState::Connecting,
                RoomState::Closed => *state != RoomState::Closed,
            };
            if !allowed {
                return false;
            }
            *state = next;
        }

        tracing::info!(state = %next, "Room state changed");
        self.room_observers
            .notify(move |observer| observer.on_room_state_changed(next));
        true
    }

    /// Close the room exactly once
    fn close(&self, reason: &str) {
        // Precedes the transition check so a join racing a close cannot
        // leave a live driver behind.
        if let Some(task) = self.join_task.lock().take() {
            task.abort();
        }

        if !self.transition(RoomState::Closed) {
            return;
        }
        tracing::info!(reason = %reason, "Closing room");

        if let Some(registry) = self.registry() {
            self.media_ctx.post(move || registry.close_all());
        }
        self.signaling.disconnect();
        // The closed notification above was snapshotted before this point,
        // so every registered observer still sees it
        self.room_observers.clear();
        self.media_observers.clear();
    }

    /// Run a closure on the media-engine context and await its result
    async fn run_on_media<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        if !self.media_ctx.post(move || {
            let _ = tx.send(f());
        }) {
            return Err(Error::Engine("media context is stopped".into()));
        }
        rx.await
            .map_err(|_| Error::Engine("media context dropped the task".into()))
    }

    /// The join handshake, start to finish
    ///
    /// Every failure funnels into `close`; on success the room transitions
    /// to `Connected` unless a concurrent `leave` got there first.
    async fn run_join(self: Arc<Self>, params: JoinParams, options: RoomOptions) {
        if let Err(e) = self.try_join(&params, &options).await {
            tracing::warn!(error = %e, "Join failed");
            self.close("join failed");
        }
    }

    async fn try_join(&self, params: &JoinParams, options: &RoomOptions) -> Result<()> {
        self.signaling
            .connect(&params.url, SIGNALING_SUBPROTOCOL)
            .await?;

        // Router capabilities load the device
        let router_caps = self.api.get_router_rtp_capabilities().await?;
        {
            let engine = Arc::clone(&self.engine);
            self.run_on_media(move || engine.load_device(&router_caps))
                .await??;
        }

        let registry = self
            .registry()
            .ok_or_else(|| Error::Engine("registry absent during join".into()))?;
        let hooks: Arc<dyn TransportHooks> = Arc::new(SessionTransportHooks {
            api: self.api.clone(),
        });

        if options.produce {
            let reply = self
                .api
                .create_webrtc_transport(options.force_tcp, true, false)
                .await?;
            let info: TransportInfo = message::decode(reply)?;
            let engine = Arc::clone(&self.engine);
            let hooks = Arc::clone(&hooks);
            let transport = self
                .run_on_media(move || engine.create_send_transport(&info, hooks))
                .await??;
            registry.set_send_transport(transport);
            tracing::debug!("Send transport created");
        }

        if options.consume {
            let reply = self
                .api
                .create_webrtc_transport(options.force_tcp, false, true)
                .await?;
            let info: TransportInfo = message::decode(reply)?;
            let engine = Arc::clone(&self.engine);
            let hooks = Arc::clone(&hooks);
            let transport = self
                .run_on_media(move || engine.create_recv_transport(&info, hooks))
                .await??;
            registry.set_recv_transport(transport);
            tracing::debug!("Recv transport created");
        }

        // The join request itself goes last, after transports are ready,
        // so consumers the server creates on join always find a transport.
        let device_caps = {
            let engine = Arc::clone(&self.engine);
            self.run_on_media(move || engine.rtp_capabilities()).await?
        };
        self.api.join(&params.display_name, device_caps).await?;

        if !self.transition(RoomState::Connected) {
            return Err(Error::SessionClosed);
        }
        tracing::info!(peer_id = %params.peer_id, "Joined room");
        Ok(())
    }
}

/// Server-push delegate composed into the session
///
/// Holds the core weakly so the pump task never keeps a left room alive.
struct SessionSignalingHandler {
    core: std::sync::Weak<SessionCore>,
}

impl SessionSignalingHandler {
    fn with_core(&self, f: impl FnOnce(&Arc<SessionCore>)) {
        if let Some(core) = self.core.upgrade() {
            f(&core);
        }
    }
}

impl SignalingEventHandler for SessionSignalingHandler {
    fn on_closed(&self) {
        self.with_core(|core| core.close("signaling closed by remote"));
    }

    fn on_server_request(&self, id: u64, method: &str, data: Value) {
        self.with_core(|core| {
            let Some(registry) = core.registry() else {
                core.api.respond_error(id, 500, "no active room");
                return;
            };

            match method {
                "newConsumer" => match message::decode::<NewConsumerData>(data) {
                    Ok(payload) => {
                        core.media_ctx
                            .post(move || registry.create_consumer(id, payload));
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Malformed newConsumer request");
                        core.api.respond_error(id, 400, "malformed request");
                    }
                },
                "newDataConsumer" => match message::decode::<NewDataConsumerData>(data) {
                    Ok(payload) => {
                        core.media_ctx
                            .post(move || registry.create_data_consumer(id, payload));
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Malformed newDataConsumer request");
                        core.api.respond_error(id, 400, "malformed request");
                    }
                },
                other => {
                    tracing::debug!(method = %other, "Unknown server request rejected");
                    core.api.respond_error(id, 400, "unknown method");
                }
            }
        });
    }

    fn on_notification(&self, method: &str, data: Value) {
        self.with_core(|core| match method {
            "consumerPaused" | "consumerResumed" | "consumerClosed" => {
                let Ok(payload) = message::decode::<ConsumerStateData>(data) else {
                    tracing::debug!(method = %method, "Malformed consumer notification dropped");
                    return;
                };
                let Some(registry) = core.registry() else {
                    return;
                };
                let paused = method == "consumerPaused";
                let closed = method == "consumerClosed";
                core.media_ctx.post(move || {
                    if closed {
                        registry.close_consumer(&payload.consumer_id);
                    } else {
                        registry.set_consumer_paused(&payload.consumer_id, paused);
                    }
                });
            }
            "dataConsumerClosed" => {
                let Ok(payload) = message::decode::<ConsumerStateData>(data) else {
                    tracing::debug!("Malformed dataConsumerClosed notification dropped");
                    return;
                };
                let Some(registry) = core.registry() else {
                    return;
                };
                core.media_ctx
                    .post(move || registry.close_data_consumer(&payload.consumer_id));
            }
            "activeSpeaker" => {
                let Ok(payload) = message::decode::<ActiveSpeakerData>(data) else {
                    return;
                };
                let is_local = {
                    let local = core.local_peer_id.lock();
                    local.is_some() && *local == payload.peer_id
                };
                if is_local {
                    let volume = payload.volume;
                    core.speaking_volume
                        .store(volume, Ordering::Relaxed);
                    core.room_observers
                        .notify(move |observer| observer.on_local_active_speaker(volume));
                } else {
                    // Dominant speaker is someone else (or nobody)
                    core.speaking_volume
                        .store(0, Ordering::Relaxed);
                }
            }
            "downlinkBwe" | "producerScore" | "consumerScore" | "consumerLayersChanged" => {
                tracing::trace!(method = %method, "Telemetry notification ignored");
            }
            other => {
                tracing::debug!(method = %other, "Unknown notification dropped");
            }
        });
    }
}

/// Engine-to-server signaling relay for transport hooks
struct SessionTransportHooks {
    api: SfuApi,
}

impl TransportHooks for SessionTransportHooks {
    fn on_connect(
        &self,
        transport_id: &str,
        dtls_parameters: Value,
        done: oneshot::Sender<Result<()>>,
    ) {
        self.api
            .connect_webrtc_transport(transport_id, dtls_parameters, move |reply| {
                let _ = done.send(reply.map(|_| ()));
            });
    }

    fn on_produce(
        &self,
        transport_id: &str,
        kind: MediaKind,
        rtp_parameters: Value,
        app_data: Value,
        done: oneshot::Sender<Result<String>>,
    ) {
        self.api.produce(
            transport_id,
            kind.as_str(),
            rtp_parameters,
            app_data,
            move |reply| {
                let result = reply.and_then(|data| {
                    data.get("id")
                        .and_then(Value::as_str)
                        .map(str::to_owned)
                        .ok_or_else(|| Error::Payload("produce reply without id".into()))
                });
                let _ = done.send(result);
            },
        );
    }
}

/// A client's view of one SFU room
///
/// All mutating calls are non-blocking: they post work to the media-engine
/// context and return. Queries read shared state directly.
pub struct RoomSession {
    core: Arc<SessionCore>,
    pool: Arc<ContextPool>,
}

impl RoomSession {
    /// Create a session over the given signaling transport and media engine
    pub fn new(transport: Arc<dyn SignalingTransport>, engine: Arc<dyn MediaEngine>) -> Self {
        let pool = Arc::new(ContextPool::new([MEDIA_CONTEXT, OBSERVER_CONTEXT]));
        // The pool always contains the context it was just created with
        let media_ctx = pool
            .context(MEDIA_CONTEXT)
            .unwrap_or_else(|| unreachable!("media context missing from fresh pool"));

        let signaling = Arc::new(SignalingSession::new(transport));
        let api = SfuApi::new(Arc::clone(&signaling));

        let core = Arc::new(SessionCore {
            signaling: Arc::clone(&signaling),
            api,
            engine,
            media_ctx,
            room_observers: Arc::new(ObserverBus::new()),
            media_observers: Arc::new(ObserverBus::new()),
            state: Mutex::new(RoomState::Unknown),
            registry: Mutex::new(None),
            local_peer_id: Mutex::new(None),
            room_id: Mutex::new(None),
            speaking_volume: AtomicI32::new(0),
            join_task: Mutex::new(None),
        });

        // The handler must be installed before the first connect; the read
        // pump captures it then.
        signaling.set_handler(Arc::new(SessionSignalingHandler {
            core: Arc::downgrade(&core),
        }));

        Self { core, pool }
    }

    /// Current lifecycle state
    pub fn state(&self) -> RoomState {
        *self.core.state.lock()
    }

    /// Local peer id supplied to the most recent `join`
    pub fn id(&self) -> Option<String> {
        self.core.local_peer_id.lock().clone()
    }

    /// Room id supplied to the most recent `join`
    pub fn room_id(&self) -> Option<String> {
        self.core.room_id.lock().clone()
    }

    /// Most recent speaking volume reported for the local participant
    ///
    /// Zero whenever someone else (or nobody) is the dominant speaker.
    pub fn speaking_volume(&self) -> i32 {
        self.core
            .speaking_volume
            .load(Ordering::Relaxed)
    }

    /// Look up one of the session's execution contexts by name
    pub fn context(&self, name: &str) -> Result<TaskContext> {
        self.pool
            .context(name)
            .ok_or_else(|| Error::NoSuchContext(name.to_owned()))
    }

    // ---- observers -------------------------------------------------------

    /// Register a room observer on the named context
    pub fn add_room_observer(
        &self,
        observer: &Arc<dyn RoomObserver>,
        context_name: &str,
    ) -> Result<()> {
        let context = self.context(context_name)?;
        self.core.room_observers.add_observer(observer, context);
        Ok(())
    }

    /// Remove a room observer registration
    pub fn remove_room_observer(&self, observer: &Arc<dyn RoomObserver>) {
        self.core.room_observers.remove_observer(observer);
    }

    /// Register a media observer on the named context
    pub fn add_media_observer(
        &self,
        observer: &Arc<dyn MediaObserver>,
        context_name: &str,
    ) -> Result<()> {
        let context = self.context(context_name)?;
        self.core.media_observers.add_observer(observer, context);
        Ok(())
    }

    /// Remove a media observer registration
    pub fn remove_media_observer(&self, observer: &Arc<dyn MediaObserver>) {
        self.core.media_observers.remove_observer(observer);
    }

    // ---- lifecycle -------------------------------------------------------

    /// Join a room
    ///
    /// Non-blocking; progress is reported through room-state callbacks. A
    /// join while already connecting or connected is ignored, as is a join
    /// with any empty parameter or a zero port.
    pub fn join(
        &self,
        host: &str,
        port: u16,
        room_id: &str,
        peer_id: impl Into<String>,
        display_name: impl Into<String>,
        options: RoomOptions,
    ) {
        let peer_id = peer_id.into();
        let display_name = display_name.into();
        if host.is_empty()
            || room_id.is_empty()
            || port == 0
            || peer_id.is_empty()
            || display_name.is_empty()
        {
            tracing::warn!(host = %host, port = port, room_id = %room_id, peer_id = %peer_id, "Join ignored: invalid parameters");
            return;
        }
        if !self.core.transition(RoomState::Connecting) {
            tracing::warn!("Join ignored: room is already active");
            return;
        }

        *self.core.local_peer_id.lock() = Some(peer_id.clone());
        *self.core.room_id.lock() = Some(room_id.to_owned());

        let registry = Arc::new(ResourceRegistry::new(
            options.clone(),
            Arc::clone(&self.core.engine),
            self.core.api.clone(),
            Arc::clone(&self.core.media_observers),
        ));
        *self.core.registry.lock() = Some(registry);

        let params = JoinParams {
            url: signaling_url(host, port, room_id, &peer_id),
            peer_id,
            display_name,
        };
        let core = Arc::clone(&self.core);
        let task = tokio::spawn(core.run_join(params, options));
        *self.core.join_task.lock() = Some(task);
    }

    /// Leave the room
    ///
    /// Idempotent; closes every owned resource and disconnects signaling.
    pub fn leave(&self) {
        self.core.close("leave requested");
    }

    // ---- local media -----------------------------------------------------

    /// Enable or disable the microphone
    pub fn enable_audio(&self, enabled: bool) {
        if let Some(registry) = self.core.registry() {
            self.core.media_ctx.post(move || registry.enable_audio(enabled));
        }
    }

    /// Pause or resume the microphone
    pub fn mute_audio(&self, muted: bool) {
        if let Some(registry) = self.core.registry() {
            self.core.media_ctx.post(move || registry.mute_audio(muted));
        }
    }

    /// Whether the microphone is muted; `true` when audio is not enabled
    pub fn is_audio_muted(&self) -> bool {
        match self.core.registry() {
            Some(registry) => registry.is_audio_muted(),
            None => true,
        }
    }

    /// Enable or disable a named local video track
    pub fn enable_video(&self, enabled: bool, track_name: impl Into<String>, width: u32, height: u32) {
        if let Some(registry) = self.core.registry() {
            let track_name = track_name.into();
            self.core
                .media_ctx
                .post(move || registry.enable_video(enabled, &track_name, width, height));
        }
    }

    /// Inject one raw frame into a named local video track
    pub fn input_frame(&self, track_name: impl Into<String>, data: bytes::Bytes) {
        if let Some(registry) = self.core.registry() {
            let track_name = track_name.into();
            self.core
                .media_ctx
                .post(move || registry.input_frame(&track_name, data));
        }
    }

    // ---- remote media ----------------------------------------------------

    /// Pause or resume every audio consumer from a peer
    pub fn mute_peer_audio(&self, peer_id: impl Into<String>, muted: bool) {
        self.set_peer_muted(peer_id.into(), MediaKind::Audio, muted);
    }

    /// Pause or resume every video consumer from a peer
    pub fn mute_peer_video(&self, peer_id: impl Into<String>, muted: bool) {
        self.set_peer_muted(peer_id.into(), MediaKind::Video, muted);
    }

    fn set_peer_muted(&self, peer_id: String, kind: MediaKind, muted: bool) {
        if let Some(registry) = self.core.registry() {
            self.core
                .media_ctx
                .post(move || registry.set_peer_muted(&peer_id, kind, muted));
        }
    }

    /// Whether a peer's audio is muted; unknown peers read as muted
    pub fn is_peer_audio_muted(&self, peer_id: &str) -> bool {
        match self.core.registry() {
            Some(registry) => registry.is_peer_muted(peer_id, MediaKind::Audio),
            None => true,
        }
    }

    /// Whether a peer's video is muted; unknown peers read as muted
    pub fn is_peer_video_muted(&self, peer_id: &str) -> bool {
        match self.core.registry() {
            Some(registry) => registry.is_peer_muted(peer_id, MediaKind::Video),
            None => true,
        }
    }

    /// Audio tracks consumed from a peer, keyed by consumer id
    pub fn remote_audio_tracks(
        &self,
        peer_id: &str,
    ) -> std::collections::HashMap<String, TrackHandle> {
        match self.core.registry() {
            Some(registry) => registry.remote_tracks(peer_id, MediaKind::Audio),
            None => Default::default(),
        }
    }

    /// Video tracks consumed from a peer, keyed by consumer id
    pub fn remote_video_tracks(
        &self,
        peer_id: &str,
    ) -> std::collections::HashMap<String, TrackHandle> {
        match self.core.registry() {
            Some(registry) => registry.remote_tracks(peer_id, MediaKind::Video),
            None => Default::default(),
        }
    }
}

impl Drop for RoomSession {
    fn drop(&mut self) {
        self.core.close("session dropped");
    }
}
