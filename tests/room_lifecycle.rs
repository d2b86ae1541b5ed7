//! End-to-end room lifecycle tests over a scripted in-process SFU.
//!
//! The mock transport answers every client request from a method table and
//! records what it saw; the mock engine hands out inert producer/consumer
//! handles. Together they exercise the join handshake, the server-push
//! paths, and the local produce/consume surface without any network or
//! media stack.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_test::assert_ok;

use sfu_client::error::Result;
use sfu_client::media::{
    ConsumeDataSpec, ConsumeSpec, ConsumerHandle, DataConsumerHandle, MediaEngine, MediaKind,
    MediaSource, ProduceSpec, ProducerHandle, RecvTransport, SendTransport, TrackHandle,
    TransportHooks,
};
use sfu_client::room::{
    MediaObserver, RoomObserver, RoomOptions, RoomSession, RoomState, MEDIA_CONTEXT,
    OBSERVER_CONTEXT,
};
use sfu_client::signaling::{SignalingTransport, TransportEvent, TransportLink, TransportInfo};

// ---- scripted server ------------------------------------------------------

/// One request the mock server saw, or one response frame the client sent
#[derive(Debug, Clone)]
enum ServerSaw {
    Request { method: String, data: Value },
    Response { id: u64, ok: bool },
}

struct MockServer {
    seen: Arc<Mutex<Vec<ServerSaw>>>,
    fail_methods: Arc<Mutex<HashSet<String>>>,
    push_tx: Mutex<Option<mpsc::UnboundedSender<TransportEvent>>>,
    transport_counter: Arc<AtomicU64>,
}

impl MockServer {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            seen: Arc::new(Mutex::new(Vec::new())),
            fail_methods: Arc::new(Mutex::new(HashSet::new())),
            push_tx: Mutex::new(None),
            transport_counter: Arc::new(AtomicU64::new(0)),
        })
    }

    fn fail_next_call_of(&self, method: &str) {
        self.fail_methods.lock().insert(method.to_owned());
    }

    fn push(&self, frame: Value) {
        let tx = self.push_tx.lock().clone().expect("server not connected");
        tx.send(TransportEvent::Message(frame.to_string())).unwrap();
    }

    fn push_closed(&self) {
        let tx = self.push_tx.lock().clone().expect("server not connected");
        tx.send(TransportEvent::Closed).unwrap();
    }

    fn requests(&self) -> Vec<String> {
        self.seen
            .lock()
            .iter()
            .filter_map(|s| match s {
                ServerSaw::Request { method, .. } => Some(method.clone()),
                _ => None,
            })
            .collect()
    }

    fn request_data(&self, method: &str) -> Option<Value> {
        self.seen.lock().iter().rev().find_map(|s| match s {
            ServerSaw::Request { method: m, data } if m == method => Some(data.clone()),
            _ => None,
        })
    }

    fn responses(&self) -> Vec<(u64, bool)> {
        self.seen
            .lock()
            .iter()
            .filter_map(|s| match s {
                ServerSaw::Response { id, ok } => Some((*id, *ok)),
                _ => None,
            })
            .collect()
    }

    async fn wait_for_request(&self, method: &str) {
        wait_until(|| self.requests().iter().any(|m| m == method)).await;
    }
}

#[async_trait]
impl SignalingTransport for MockServer {
    async fn connect(&self, _url: &str, _subprotocol: &str) -> Result<TransportLink> {
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<TransportEvent>();
        *self.push_tx.lock() = Some(in_tx.clone());

        let seen = Arc::clone(&self.seen);
        let fail = Arc::clone(&self.fail_methods);
        let counter = Arc::clone(&self.transport_counter);
        tokio::spawn(async move {
            while let Some(text) = out_rx.recv().await {
                let frame: Value = serde_json::from_str(&text).unwrap();
                if frame["request"] == true {
                    let method = frame["method"].as_str().unwrap().to_owned();
                    let id = frame["id"].as_u64().unwrap();
                    seen.lock().push(ServerSaw::Request {
                        method: method.clone(),
                        data: frame["data"].clone(),
                    });

                    let reply = if fail.lock().remove(&method) {
                        json!({
                            "response": true, "id": id, "ok": false,
                            "errorCode": 500, "errorReason": "scripted failure",
                        })
                    } else {
                        let data = match method.as_str() {
                            "getRouterRtpCapabilities" => {
                                json!({ "codecs": [], "headerExtensions": [] })
                            }
                            "createWebRtcTransport" => {
                                let n = counter.fetch_add(1, Ordering::SeqCst);
                                json!({
                                    "id": format!("transport-{n}"),
                                    "iceParameters": {},
                                    "iceCandidates": [],
                                    "dtlsParameters": {},
                                })
                            }
                            "produce" => json!({ "id": "server-producer-1" }),
                            _ => json!({}),
                        };
                        json!({ "response": true, "id": id, "ok": true, "data": data })
                    };
                    let _ = in_tx.send(TransportEvent::Message(reply.to_string()));
                } else if frame["response"] == true {
                    seen.lock().push(ServerSaw::Response {
                        id: frame["id"].as_u64().unwrap(),
                        ok: frame["ok"].as_bool().unwrap_or(false),
                    });
                }
            }
        });

        Ok(TransportLink {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

// ---- mock engine ------------------------------------------------------------

struct MockProducer {
    id: String,
    kind: MediaKind,
    paused: AtomicBool,
    closed: AtomicBool,
}

impl ProducerHandle for MockProducer {
    fn id(&self) -> String {
        self.id.clone()
    }
    fn kind(&self) -> MediaKind {
        self.kind
    }
    fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }
    fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }
    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }
    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

struct MockConsumer {
    id: String,
    producer_id: String,
    kind: MediaKind,
    paused: AtomicBool,
    closed: AtomicBool,
}

impl ConsumerHandle for MockConsumer {
    fn id(&self) -> String {
        self.id.clone()
    }
    fn producer_id(&self) -> String {
        self.producer_id.clone()
    }
    fn kind(&self) -> MediaKind {
        self.kind
    }
    fn track(&self) -> TrackHandle {
        TrackHandle::new(format!("track-{}", self.id), self.kind)
    }
    fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }
    fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }
    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }
    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

struct MockDataConsumer {
    id: String,
    label: String,
    closed: AtomicBool,
}

impl DataConsumerHandle for MockDataConsumer {
    fn id(&self) -> String {
        self.id.clone()
    }
    fn label(&self) -> String {
        self.label.clone()
    }
    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

struct MockSource {
    frames: Mutex<Vec<Bytes>>,
    width: u32,
    height: u32,
}

impl MediaSource for MockSource {
    fn input_frame(&self, data: Bytes) {
        self.frames.lock().push(data);
    }
    fn width(&self) -> u32 {
        self.width
    }
    fn height(&self) -> u32 {
        self.height
    }
}

#[derive(Default)]
struct EngineState {
    next_id: AtomicU64,
    producers: Mutex<Vec<Arc<MockProducer>>>,
    consumers: Mutex<Vec<Arc<MockConsumer>>>,
    sources: Mutex<Vec<Arc<MockSource>>>,
    loaded: AtomicBool,
}

struct MockSendTransport {
    id: String,
    state: Arc<EngineState>,
}

impl SendTransport for MockSendTransport {
    fn id(&self) -> String {
        self.id.clone()
    }
    fn produce(&self, spec: ProduceSpec) -> Result<Arc<dyn ProducerHandle>> {
        let n = self.state.next_id.fetch_add(1, Ordering::SeqCst);
        let producer = Arc::new(MockProducer {
            id: format!("producer-{n}"),
            kind: spec.kind,
            paused: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });
        self.state.producers.lock().push(Arc::clone(&producer));
        Ok(producer)
    }
    fn close(&self) {}
}

struct MockRecvTransport {
    id: String,
    state: Arc<EngineState>,
}

impl RecvTransport for MockRecvTransport {
    fn id(&self) -> String {
        self.id.clone()
    }
    fn consume(&self, spec: ConsumeSpec) -> Result<Arc<dyn ConsumerHandle>> {
        let consumer = Arc::new(MockConsumer {
            id: spec.consumer_id,
            producer_id: spec.producer_id,
            kind: spec.kind,
            paused: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });
        self.state.consumers.lock().push(Arc::clone(&consumer));
        Ok(consumer)
    }
    fn consume_data(&self, spec: ConsumeDataSpec) -> Result<Arc<dyn DataConsumerHandle>> {
        Ok(Arc::new(MockDataConsumer {
            id: spec.consumer_id,
            label: spec.label,
            closed: AtomicBool::new(false),
        }))
    }
    fn close(&self) {}
}

struct MockEngine {
    state: Arc<EngineState>,
}

impl MockEngine {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Arc::new(EngineState::default()),
        })
    }

    fn live_producers(&self) -> usize {
        self.state
            .producers
            .lock()
            .iter()
            .filter(|p| !p.closed.load(Ordering::SeqCst))
            .count()
    }

    fn source_count(&self) -> usize {
        self.state.sources.lock().len()
    }
}

impl MediaEngine for MockEngine {
    fn load_device(&self, _router_rtp_capabilities: &Value) -> Result<()> {
        self.state.loaded.store(true, Ordering::SeqCst);
        Ok(())
    }
    fn is_loaded(&self) -> bool {
        self.state.loaded.load(Ordering::SeqCst)
    }
    fn can_produce(&self, _kind: MediaKind) -> bool {
        true
    }
    fn rtp_capabilities(&self) -> Value {
        json!({ "codecs": [] })
    }
    fn create_send_transport(
        &self,
        info: &TransportInfo,
        _hooks: Arc<dyn TransportHooks>,
    ) -> Result<Arc<dyn SendTransport>> {
        Ok(Arc::new(MockSendTransport {
            id: info.id.clone(),
            state: Arc::clone(&self.state),
        }))
    }
    fn create_recv_transport(
        &self,
        info: &TransportInfo,
        _hooks: Arc<dyn TransportHooks>,
    ) -> Result<Arc<dyn RecvTransport>> {
        Ok(Arc::new(MockRecvTransport {
            id: info.id.clone(),
            state: Arc::clone(&self.state),
        }))
    }
    fn create_video_source(&self, width: u32, height: u32) -> Result<Arc<dyn MediaSource>> {
        let source = Arc::new(MockSource {
            frames: Mutex::new(Vec::new()),
            width,
            height,
        });
        self.state.sources.lock().push(Arc::clone(&source));
        Ok(source)
    }
}

// ---- observers --------------------------------------------------------------

struct StateRecorder {
    states: Mutex<Vec<RoomState>>,
    volumes: Mutex<Vec<i32>>,
}

impl StateRecorder {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            states: Mutex::new(Vec::new()),
            volumes: Mutex::new(Vec::new()),
        })
    }
}

impl RoomObserver for StateRecorder {
    fn on_room_state_changed(&self, state: RoomState) {
        self.states.lock().push(state);
    }
    fn on_local_active_speaker(&self, volume: i32) {
        self.volumes.lock().push(volume);
    }
}

#[derive(Default)]
struct MediaRecorder {
    events: Mutex<Vec<String>>,
}

impl MediaObserver for MediaRecorder {
    fn on_create_remote_audio_track(&self, peer_id: &str, consumer_id: &str, _track: &TrackHandle) {
        self.events
            .lock()
            .push(format!("audio-track {peer_id} {consumer_id}"));
    }
    fn on_remove_remote_audio_track(&self, peer_id: &str, consumer_id: &str) {
        self.events
            .lock()
            .push(format!("audio-track-gone {peer_id} {consumer_id}"));
    }
    fn on_create_remote_video_track(
        &self,
        peer_id: &str,
        consumer_id: &str,
        _track: &TrackHandle,
        _app_data: &Value,
    ) {
        self.events
            .lock()
            .push(format!("video-track {peer_id} {consumer_id}"));
    }
    fn on_remove_remote_video_track(&self, peer_id: &str, consumer_id: &str) {
        self.events
            .lock()
            .push(format!("video-track-gone {peer_id} {consumer_id}"));
    }
    fn on_remote_audio_state_changed(&self, peer_id: &str, muted: bool) {
        self.events.lock().push(format!("audio-muted {peer_id} {muted}"));
    }
    fn on_remote_video_state_changed(&self, peer_id: &str, muted: bool) {
        self.events.lock().push(format!("video-muted {peer_id} {muted}"));
    }
}

// ---- helpers ----------------------------------------------------------------

/// Route library tracing through the test harness, once per process
fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            panic!("condition not met within deadline");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Wait until everything posted to a session context so far has run
async fn flush(session: &RoomSession, context_name: &str) {
    let ctx = session.context(context_name).unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel();
    assert!(ctx.post(move || {
        let _ = tx.send(());
    }));
    rx.await.unwrap();
}

async fn joined_session() -> (RoomSession, Arc<MockServer>, Arc<MockEngine>, Arc<StateRecorder>) {
    init_tracing();
    let server = MockServer::new();
    let engine = MockEngine::new();
    let session = RoomSession::new(server.clone(), engine.clone());

    let recorder = StateRecorder::new();
    let observer: Arc<dyn RoomObserver> = recorder.clone();
    assert_ok!(session.add_room_observer(&observer, OBSERVER_CONTEXT));

    session.join(
        "sfu.test",
        4443,
        "r1",
        "alice",
        "Alice",
        RoomOptions::default().use_simulcast(true),
    );
    wait_until(|| session.state() == RoomState::Connected).await;
    (session, server, engine, recorder)
}

fn new_consumer_request(id: u64, consumer_id: &str, peer_id: &str, kind: &str) -> Value {
    json!({
        "request": true,
        "id": id,
        "method": "newConsumer",
        "data": {
            "id": consumer_id,
            "producerId": "remote-producer-1",
            "kind": kind,
            "rtpParameters": { "codecs": [] },
            "appData": {},
            "peerId": peer_id,
            "producerPaused": false,
        },
    })
}

// ---- tests --------------------------------------------------------------------

#[tokio::test]
async fn test_join_handshake_happy_path() {
    let (session, server, engine, recorder) = joined_session().await;

    assert!(engine.is_loaded());
    let requests = server.requests();
    assert_eq!(
        requests,
        vec![
            "getRouterRtpCapabilities",
            "createWebRtcTransport",
            "createWebRtcTransport",
            "join",
        ]
    );

    // Both transport directions were requested
    let data = server.request_data("join").unwrap();
    assert_eq!(data["displayName"], "Alice");

    flush(&session, OBSERVER_CONTEXT).await;
    assert_eq!(
        *recorder.states.lock(),
        vec![RoomState::Connecting, RoomState::Connected]
    );
}

#[tokio::test]
async fn test_transport_failure_closes_exactly_once() {
    let server = MockServer::new();
    server.fail_next_call_of("createWebRtcTransport");
    let engine = MockEngine::new();
    let session = RoomSession::new(server.clone(), engine);

    let recorder = StateRecorder::new();
    let observer: Arc<dyn RoomObserver> = recorder.clone();
    session.add_room_observer(&observer, OBSERVER_CONTEXT).unwrap();

    session.join("sfu.test", 4443, "r1", "alice", "Alice", RoomOptions::default());
    wait_until(|| session.state() == RoomState::Closed).await;

    // A later leave adds nothing
    session.leave();
    flush(&session, OBSERVER_CONTEXT).await;

    let states = recorder.states.lock().clone();
    assert_eq!(states, vec![RoomState::Connecting, RoomState::Closed]);
}

#[tokio::test]
async fn test_remote_close_tears_the_room_down() {
    let (session, server, _engine, recorder) = joined_session().await;

    server.push_closed();
    wait_until(|| session.state() == RoomState::Closed).await;

    flush(&session, OBSERVER_CONTEXT).await;
    assert_eq!(
        *recorder.states.lock(),
        vec![RoomState::Connecting, RoomState::Connected, RoomState::Closed]
    );
}

#[tokio::test]
async fn test_leave_is_idempotent() {
    let (session, _server, _engine, recorder) = joined_session().await;

    session.leave();
    session.leave();
    assert_eq!(session.state(), RoomState::Closed);

    flush(&session, OBSERVER_CONTEXT).await;
    let closed = recorder
        .states
        .lock()
        .iter()
        .filter(|s| **s == RoomState::Closed)
        .count();
    assert_eq!(closed, 1);
}

#[tokio::test]
async fn test_new_consumer_commits_before_ack() {
    let (session, server, _engine, _recorder) = joined_session().await;

    let media = Arc::new(MediaRecorder::default());
    let observer: Arc<dyn MediaObserver> = media.clone();
    session.add_media_observer(&observer, OBSERVER_CONTEXT).unwrap();

    server.push(new_consumer_request(100, "c1", "bob", "audio"));
    wait_until(|| !server.responses().is_empty()).await;

    // The ack only goes out after the consumer is registered
    assert_eq!(server.responses(), vec![(100, true)]);
    assert_eq!(session.remote_audio_tracks("bob").len(), 1);
    assert!(!session.is_peer_audio_muted("bob"));

    // Preferred layers are requested for every new consumer
    server.wait_for_request("setConsumerPreferredLayers").await;
    let data = server.request_data("setConsumerPreferredLayers").unwrap();
    assert_eq!(data["consumerId"], "c1");
    assert_eq!(data["spatialLayer"], 1);
    assert_eq!(data["temporalLayer"], 1);

    flush(&session, OBSERVER_CONTEXT).await;
    let events = media.events.lock().clone();
    assert!(events.contains(&"audio-track bob c1".to_owned()));
}

#[tokio::test]
async fn test_consumer_pause_resume_and_close() {
    let (session, server, _engine, _recorder) = joined_session().await;

    let media = Arc::new(MediaRecorder::default());
    let observer: Arc<dyn MediaObserver> = media.clone();
    session.add_media_observer(&observer, OBSERVER_CONTEXT).unwrap();

    server.push(new_consumer_request(100, "c1", "bob", "video"));
    wait_until(|| !server.responses().is_empty()).await;

    server.push(json!({
        "notification": true, "method": "consumerPaused",
        "data": { "consumerId": "c1" },
    }));
    wait_until(|| session.is_peer_video_muted("bob")).await;

    server.push(json!({
        "notification": true, "method": "consumerResumed",
        "data": { "consumerId": "c1" },
    }));
    wait_until(|| !session.is_peer_video_muted("bob")).await;

    server.push(json!({
        "notification": true, "method": "consumerClosed",
        "data": { "consumerId": "c1" },
    }));
    wait_until(|| session.remote_video_tracks("bob").is_empty()).await;

    // A closed consumer reads as muted again
    assert!(session.is_peer_video_muted("bob"));

    flush(&session, OBSERVER_CONTEXT).await;
    let events = media.events.lock().clone();
    assert!(events.contains(&"video-muted bob true".to_owned()));
    assert!(events.contains(&"video-muted bob false".to_owned()));
    assert!(events.contains(&"video-track-gone bob c1".to_owned()));

    // Removal was announced before the entry disappeared, so the mute
    // transition for the close precedes the track removal
    let gone = events
        .iter()
        .position(|e| e == "video-track-gone bob c1")
        .unwrap();
    let last_mute = events
        .iter()
        .rposition(|e| e == "video-muted bob true")
        .unwrap();
    assert!(last_mute < gone);
}

#[tokio::test]
async fn test_back_to_back_pause_resume_apply_in_arrival_order() {
    let (session, server, _engine, _recorder) = joined_session().await;

    let media = Arc::new(MediaRecorder::default());
    let observer: Arc<dyn MediaObserver> = media.clone();
    session.add_media_observer(&observer, OBSERVER_CONTEXT).unwrap();

    server.push(new_consumer_request(100, "c1", "bob", "video"));
    wait_until(|| !server.responses().is_empty()).await;

    // No barrier between the two: both race through the signaling pump and
    // must land on the media context in arrival order
    server.push(json!({
        "notification": true, "method": "consumerPaused",
        "data": { "consumerId": "c1" },
    }));
    server.push(json!({
        "notification": true, "method": "consumerResumed",
        "data": { "consumerId": "c1" },
    }));

    wait_until(|| {
        let events = media.events.lock();
        events.iter().any(|e| e == "video-muted bob false")
    })
    .await;
    flush(&session, MEDIA_CONTEXT).await;

    // Resume arrived last, so the consumer ends unpaused
    assert!(!session.is_peer_video_muted("bob"));

    flush(&session, OBSERVER_CONTEXT).await;
    let events = media.events.lock().clone();
    let paused = events
        .iter()
        .position(|e| e == "video-muted bob true")
        .unwrap();
    let resumed = events
        .iter()
        .position(|e| e == "video-muted bob false")
        .unwrap();
    assert!(paused < resumed);
}

#[tokio::test]
async fn test_notification_for_unknown_consumer_is_dropped() {
    let (session, server, _engine, _recorder) = joined_session().await;

    server.push(json!({
        "notification": true, "method": "consumerPaused",
        "data": { "consumerId": "never-created" },
    }));
    server.push(json!({
        "notification": true, "method": "consumerClosed",
        "data": { "consumerId": "also-never-created" },
    }));

    // Both drain through the media context without effect
    flush(&session, MEDIA_CONTEXT).await;
    assert_eq!(session.state(), RoomState::Connected);
    assert!(session.remote_audio_tracks("anyone").is_empty());
}

#[tokio::test]
async fn test_enable_video_round_trip_releases_everything() {
    let (session, server, engine, _recorder) = joined_session().await;

    session.enable_video(true, "camera", 1280, 720);
    flush(&session, MEDIA_CONTEXT).await;
    assert_eq!(engine.live_producers(), 1);
    assert_eq!(engine.source_count(), 1);

    session.input_frame("camera", Bytes::from_static(b"frame"));
    flush(&session, MEDIA_CONTEXT).await;
    assert_eq!(engine.state.sources.lock()[0].frames.lock().len(), 1);

    session.enable_video(false, "camera", 0, 0);
    flush(&session, MEDIA_CONTEXT).await;
    assert_eq!(engine.live_producers(), 0);
    server.wait_for_request("closeProducer").await;

    // A frame for the released track goes nowhere
    session.input_frame("camera", Bytes::from_static(b"late"));
    flush(&session, MEDIA_CONTEXT).await;
    assert_eq!(engine.state.sources.lock()[0].frames.lock().len(), 1);

    // The name is free for a fresh producer
    session.enable_video(true, "camera", 1280, 720);
    flush(&session, MEDIA_CONTEXT).await;
    assert_eq!(engine.live_producers(), 1);
}

#[tokio::test]
async fn test_mute_audio_without_producer_sends_nothing() {
    let (session, server, _engine, _recorder) = joined_session().await;

    session.mute_audio(true);
    flush(&session, MEDIA_CONTEXT).await;

    assert!(session.is_audio_muted());
    assert!(!server.requests().iter().any(|m| m == "pauseProducer"));
}

#[tokio::test]
async fn test_audio_enable_and_mute_flow() {
    let (session, server, engine, _recorder) = joined_session().await;

    session.enable_audio(true);
    flush(&session, MEDIA_CONTEXT).await;
    assert_eq!(engine.live_producers(), 1);
    assert!(!session.is_audio_muted());

    session.mute_audio(true);
    flush(&session, MEDIA_CONTEXT).await;
    assert!(session.is_audio_muted());
    server.wait_for_request("pauseProducer").await;

    session.mute_audio(false);
    flush(&session, MEDIA_CONTEXT).await;
    assert!(!session.is_audio_muted());
    server.wait_for_request("resumeProducer").await;

    session.enable_audio(false);
    flush(&session, MEDIA_CONTEXT).await;
    assert_eq!(engine.live_producers(), 0);
    server.wait_for_request("closeProducer").await;
    assert!(session.is_audio_muted());
}

#[tokio::test]
async fn test_peer_mute_pauses_every_consumer_of_the_kind() {
    let (session, server, _engine, _recorder) = joined_session().await;

    server.push(new_consumer_request(100, "c1", "bob", "audio"));
    server.push(new_consumer_request(101, "c2", "bob", "audio"));
    server.push(new_consumer_request(102, "c3", "bob", "video"));
    wait_until(|| server.responses().len() == 3).await;

    session.mute_peer_audio("bob", true);
    flush(&session, MEDIA_CONTEXT).await;
    assert!(session.is_peer_audio_muted("bob"));
    // Video consumers are untouched
    assert!(!session.is_peer_video_muted("bob"));

    wait_until(|| {
        server
            .requests()
            .iter()
            .filter(|m| m.as_str() == "pauseConsumer")
            .count()
            == 2
    })
    .await;

    session.mute_peer_audio("bob", false);
    flush(&session, MEDIA_CONTEXT).await;
    assert!(!session.is_peer_audio_muted("bob"));
}

#[tokio::test]
async fn test_unknown_peer_reads_as_muted() {
    let (session, _server, _engine, _recorder) = joined_session().await;

    assert!(session.is_peer_audio_muted("stranger"));
    assert!(session.is_peer_video_muted("stranger"));
    assert!(session.remote_audio_tracks("stranger").is_empty());
}

#[tokio::test]
async fn test_local_active_speaker_only_for_own_peer_id() {
    let (session, server, _engine, recorder) = joined_session().await;

    server.push(json!({
        "notification": true, "method": "activeSpeaker",
        "data": { "peerId": "bob", "volume": -30 },
    }));
    server.push(json!({
        "notification": true, "method": "activeSpeaker",
        "data": { "peerId": "alice", "volume": -12 },
    }));
    server.push(json!({
        "notification": true, "method": "activeSpeaker",
        "data": { "peerId": null, "volume": 0 },
    }));

    wait_until(|| !recorder.volumes.lock().is_empty()).await;
    // The trailing no-speaker event resets the local volume
    wait_until(|| session.speaking_volume() == 0).await;
    flush(&session, OBSERVER_CONTEXT).await;
    assert_eq!(*recorder.volumes.lock(), vec![-12]);
}

#[tokio::test]
async fn test_join_with_invalid_parameters_is_ignored() {
    let server = MockServer::new();
    let engine = MockEngine::new();
    let session = RoomSession::new(server.clone(), engine);

    session.join("", 4443, "r1", "alice", "Alice", RoomOptions::default());
    session.join("sfu.test", 0, "r1", "alice", "Alice", RoomOptions::default());
    session.join("sfu.test", 4443, "", "alice", "Alice", RoomOptions::default());
    session.join("sfu.test", 4443, "r1", "", "Alice", RoomOptions::default());
    session.join("sfu.test", 4443, "r1", "alice", "", RoomOptions::default());

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(session.state(), RoomState::Unknown);
    assert!(server.requests().is_empty());
    // A rejected join records no identity
    assert!(session.id().is_none());
    assert!(session.room_id().is_none());
}

#[tokio::test]
async fn test_identity_reflects_the_joined_room() {
    let (session, _server, _engine, _recorder) = joined_session().await;

    assert_eq!(session.id().as_deref(), Some("alice"));
    assert_eq!(session.room_id().as_deref(), Some("r1"));
}

#[tokio::test]
async fn test_removed_observer_gets_nothing_more() {
    let (session, _server, _engine, recorder) = joined_session().await;

    // A second observer, registered after the join and removed before the
    // leave, sees no state change at all
    let late = StateRecorder::new();
    let late_observer: Arc<dyn RoomObserver> = late.clone();
    session
        .add_room_observer(&late_observer, OBSERVER_CONTEXT)
        .unwrap();
    session.remove_room_observer(&late_observer);

    session.leave();
    flush(&session, OBSERVER_CONTEXT).await;
    assert!(late.states.lock().is_empty());
    assert_eq!(
        *recorder.states.lock(),
        vec![RoomState::Connecting, RoomState::Connected, RoomState::Closed]
    );
}

#[tokio::test]
async fn test_new_data_consumer_is_acked() {
    let (session, server, _engine, _recorder) = joined_session().await;

    server.push(json!({
        "request": true,
        "id": 200,
        "method": "newDataConsumer",
        "data": {
            "id": "dc1",
            "dataProducerId": "dp1",
            "sctpStreamParameters": { "streamId": 7, "ordered": true },
            "label": "chat",
            "protocol": "",
            "appData": {},
            "peerId": "bob",
        },
    }));

    wait_until(|| server.responses() == vec![(200, true)]).await;
    assert_eq!(session.state(), RoomState::Connected);
}

#[tokio::test]
async fn test_unknown_server_request_is_rejected() {
    let (_session, server, _engine, _recorder) = joined_session().await;

    server.push(json!({
        "request": true, "id": 300, "method": "mysteryMethod", "data": {},
    }));

    wait_until(|| !server.responses().is_empty()).await;
    assert_eq!(server.responses(), vec![(300, false)]);
}
