//! Adapter for the native tracking host
//!
//! Commands leave through a [`BridgeTransport`]. Replies and pushed updates
//! come back through [`NativeBridge::dispatch`], which resolves pending
//! replies, folds watch data into the known planes and anchors, and fans
//! everything else out as [`BridgeEvent`]s.

mod clock;
mod pending;
mod planes;
pub mod protocol;
mod transport;
mod vision;

pub use clock::NativeClock;
pub use pending::{generate_callback_key, PendingCalls, PendingReply};
pub use planes::{check_screen_point, hit_test_planes, pick_hit, PlaneHit, TrackedPlane};
pub use protocol::{
    BridgeCommand, BridgeRequest, HitTestTypes, ImageActivation, InboundMessage, LifecycleEvent,
    NativeAnchorType, NativeHit, NativeObject, TrackingState, UiOptions, WatchData, WatchOptions,
};
pub use transport::{BridgeTransport, ChannelTransport};
pub use vision::{camera_orientation, decode_frame};

use crate::error::{Result, XrError};
use crate::shared::{lock, EventHub};
use crate::spatial::Matrix4;
use crate::video::{BufferPool, VideoFrame};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use protocol::CvDetail;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use xr_tracking_config::TrackingConfig;

/// Unsolicited notifications from the host
#[derive(Debug, Clone)]
pub enum BridgeEvent {
    Initialized {
        device_id: String,
    },
    /// Watch data after it was folded into the adapter's maps
    Watch(Arc<WatchData>),
    TrackingChanged(TrackingState),
    Error {
        domain: String,
        code: i64,
        message: String,
    },
    WindowResize {
        width: f32,
        height: f32,
        focal_length: Option<f32>,
    },
    Lifecycle(LifecycleEvent),
}

#[derive(Debug, Default)]
struct BridgeState {
    device_id: Option<String>,
    watching: bool,
    watch_options: WatchOptions,
    latest: Option<Arc<WatchData>>,
    timestamp: f64,
    planes: HashMap<String, TrackedPlane>,
    anchors: HashMap<String, Matrix4>,
    clock: NativeClock,
    tracking_state: Option<TrackingState>,
}

impl BridgeState {
    fn track(&mut self, object: &NativeObject) {
        if object.plane_center.is_some() {
            if let Some(plane) = self.planes.get_mut(&object.uuid) {
                plane.apply(object);
            } else if let Some(plane) = TrackedPlane::from_native(object) {
                self.planes.insert(object.uuid.clone(), plane);
            }
        } else {
            self.anchors.insert(object.uuid.clone(), object.transform);
        }
    }

    fn forget(&mut self, uid: &str) {
        if self.planes.remove(uid).is_none() {
            self.anchors.remove(uid);
        }
    }
}

/// One adapter per host connection. Share it behind an `Arc`.
pub struct NativeBridge {
    transport: Arc<dyn BridgeTransport>,
    pending: PendingCalls,
    state: Mutex<BridgeState>,
    /// Serializes watch and stop
    lifecycle: tokio::sync::Mutex<()>,
    initialized: watch::Sender<bool>,
    events: EventHub<BridgeEvent>,
    video_sink: Mutex<Option<UnboundedSender<VideoFrame>>>,
    pool: Arc<BufferPool>,
    extent_tolerance: f32,
}

impl NativeBridge {
    pub fn new(transport: Arc<dyn BridgeTransport>) -> Self {
        let config = TrackingConfig::default();
        let (initialized, _) = watch::channel(false);
        Self {
            transport,
            pending: PendingCalls::new(),
            state: Mutex::new(BridgeState {
                watch_options: WatchOptions::from(&config.bridge),
                ..BridgeState::default()
            }),
            lifecycle: tokio::sync::Mutex::new(()),
            initialized,
            events: EventHub::new(),
            video_sink: Mutex::new(None),
            pool: BufferPool::global(),
            extent_tolerance: config.hit_test.extent_tolerance,
        }
    }

    /// Watch options and hit test tolerance taken from `config`
    pub fn with_config(mut self, config: &TrackingConfig) -> Self {
        lock(&self.state).watch_options = WatchOptions::from(&config.bridge);
        self.extent_tolerance = config.hit_test.extent_tolerance;
        self
    }

    pub fn with_buffer_pool(mut self, pool: Arc<BufferPool>) -> Self {
        self.pool = pool;
        self
    }

    pub fn subscribe(&self) -> UnboundedReceiver<BridgeEvent> {
        self.events.subscribe()
    }

    /// Route decoded computer-vision frames to `sink`
    pub fn set_video_sink(&self, sink: Option<UnboundedSender<VideoFrame>>) {
        *lock(&self.video_sink) = sink;
    }

    /// Convenience for a fresh frame channel installed as the sink
    pub fn video_frames(&self) -> UnboundedReceiver<VideoFrame> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.set_video_sink(Some(tx));
        rx
    }

    pub fn is_initialized(&self) -> bool {
        *self.initialized.borrow()
    }

    pub fn is_watching(&self) -> bool {
        lock(&self.state).watching
    }

    pub fn device_id(&self) -> Option<String> {
        lock(&self.state).device_id.clone()
    }

    pub fn tracking_state(&self) -> Option<TrackingState> {
        lock(&self.state).tracking_state
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(XrError::BridgeNotInitialized)
        }
    }

    fn post(&self, command: BridgeCommand, payload: Value) -> Result<()> {
        self.transport.post(BridgeRequest {
            command_name: command,
            payload,
            callback_key: None,
        })
    }

    /// Register a resolver, then send; the key is dropped again if sending fails
    fn call(&self, command: BridgeCommand, payload: Value) -> Result<PendingReply> {
        let reply = self.pending.register(command.as_str());
        let request = BridgeRequest {
            command_name: command,
            payload,
            callback_key: Some(reply.key().to_string()),
        };
        if let Err(err) = self.transport.post(request) {
            self.pending.discard(reply.key());
            return Err(err);
        }
        Ok(reply)
    }

    /// Ask the host to initialize; resolves with its device id
    pub async fn init(&self, ui: UiOptions) -> Result<String> {
        info!("Initializing native tracker");
        let reply = self.call(BridgeCommand::Init, json!({ "options": { "ui": ui } }))?;
        let data = reply.wait().await?;
        let device_id = match &data {
            Value::String(id) => id.clone(),
            other => other
                .get("deviceId")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        };

        lock(&self.state).device_id = Some(device_id.clone());
        self.initialized.send_replace(true);
        info!("Native tracker initialized (device {})", device_id);
        self.events.emit(BridgeEvent::Initialized {
            device_id: device_id.clone(),
        });
        Ok(device_id)
    }

    /// Wait until `init` has completed
    pub async fn wait_for_init(&self) -> Result<()> {
        let mut receiver = self.initialized.subscribe();
        receiver
            .wait_for(|initialized| *initialized)
            .await
            .map(|_| ())
            .map_err(|_| XrError::BridgeNotInitialized)
    }

    /// Start streaming per-frame data. A no-op while already watching;
    /// waits for an in-flight `stop` to finish first.
    pub async fn watch(&self, options: Option<WatchOptions>) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        self.ensure_initialized()?;

        let options = {
            let mut state = lock(&self.state);
            if state.watching {
                return Ok(());
            }
            if let Some(options) = options {
                state.watch_options = options;
            }
            state.watch_options.clone()
        };

        // The host acknowledges watchAR but the ack carries nothing
        let _ack = self.call(BridgeCommand::Watch, json!({ "options": options }))?;
        lock(&self.state).watching = true;
        info!("Watching native tracker");
        Ok(())
    }

    /// Stop streaming. Resolves immediately when not watching.
    pub async fn stop(&self) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        if !self.is_watching() {
            return Ok(());
        }

        let reply = self.call(BridgeCommand::Stop, Value::Null)?;
        reply.wait().await?;
        lock(&self.state).watching = false;
        info!("Stopped watching native tracker");
        Ok(())
    }

    /// Native hit test at a normalized screen point
    pub async fn hit_test(&self, x: f32, y: f32, types: HitTestTypes) -> Result<Vec<NativeHit>> {
        check_screen_point(x, y)?;
        self.ensure_initialized()?;
        let reply = self.call(
            BridgeCommand::HitTest,
            json!({ "x": x, "y": y, "type": types }),
        )?;
        reply.wait_json().await
    }

    /// Register an anchor natively. The reply is the host's view of the
    /// anchor as a [`NativeObject`].
    pub fn add_anchor(&self, uid: &str, transform: Matrix4) -> Result<PendingReply> {
        self.ensure_initialized()?;
        self.call(
            BridgeCommand::AddAnchor,
            json!({ "uuid": uid, "transform": transform }),
        )
    }

    pub fn remove_anchors(&self, uids: &[String]) -> Result<()> {
        self.ensure_initialized()?;
        {
            let mut state = lock(&self.state);
            for uid in uids {
                state.forget(uid);
            }
        }
        self.post(BridgeCommand::RemoveAnchors, json!(uids))
    }

    /// Upload a reference image for detection
    pub async fn create_image_anchor(
        &self,
        uid: &str,
        rgba: &[u8],
        width: u32,
        height: u32,
        physical_width: f32,
    ) -> Result<Value> {
        self.ensure_initialized()?;
        let reply = self.call(
            BridgeCommand::CreateImageAnchor,
            json!({
                "uid": uid,
                "buffer": STANDARD.encode(rgba),
                "imageWidth": width,
                "imageHeight": height,
                "physicalWidth": physical_width,
            }),
        )?;
        reply.wait().await
    }

    /// Activate a previously created image; resolves once the host detects it
    pub async fn activate_detection_image(&self, uid: &str) -> Result<NativeObject> {
        self.ensure_initialized()?;
        let reply = self.call(BridgeCommand::ActivateDetectionImage, json!({ "uid": uid }))?;
        let activation: ImageActivation = reply.wait_json().await?;

        match activation {
            ImageActivation {
                activated: true,
                image_anchor: Some(anchor),
                ..
            } => Ok(anchor),
            ImageActivation {
                error: Some(error), ..
            } => Err(XrError::ImageActivationFailed(error)),
            _ => Err(XrError::ImageActivationFailed(format!(
                "image {uid} was not activated"
            ))),
        }
    }

    pub fn request_computer_vision_data(&self) -> Result<()> {
        self.post(BridgeCommand::RequestComputerVisionData, json!({}))
    }

    pub fn start_computer_vision_data(&self) -> Result<()> {
        self.post(BridgeCommand::StartComputerVisionData, json!({}))
    }

    pub fn stop_computer_vision_data(&self) -> Result<()> {
        self.post(BridgeCommand::StopComputerVisionData, json!({}))
    }

    pub fn set_ui_options(&self, options: &UiOptions) -> Result<()> {
        self.post(BridgeCommand::SetUiOptions, json!(options))
    }

    /// Ray cast against the planes known from watch data, using the latest
    /// camera view and projection
    pub fn hit_test_no_anchor(&self, x: f32, y: f32) -> Result<Vec<PlaneHit>> {
        check_screen_point(x, y)?;
        let state = lock(&self.state);
        let Some((view, projection)) = state
            .latest
            .as_ref()
            .and_then(|data| data.camera_view.zip(data.projection_camera))
        else {
            return Ok(Vec::new());
        };
        hit_test_planes(
            state.planes.values(),
            &view,
            &projection,
            x,
            y,
            self.extent_tolerance,
        )
    }

    pub fn planes(&self) -> Vec<TrackedPlane> {
        lock(&self.state).planes.values().cloned().collect()
    }

    pub fn plane(&self, uid: &str) -> Option<TrackedPlane> {
        lock(&self.state).planes.get(uid).cloned()
    }

    /// Tracker-space transform of a non-plane anchor
    pub fn anchor_transform(&self, uid: &str) -> Option<Matrix4> {
        lock(&self.state).anchors.get(uid).copied()
    }

    pub fn latest_watch(&self) -> Option<Arc<WatchData>> {
        lock(&self.state).latest.clone()
    }

    pub fn light_intensity(&self) -> Option<f32> {
        lock(&self.state)
            .latest
            .as_ref()
            .and_then(|data| data.light_intensity)
    }

    /// Timestamp of the latest watch data on the local clock
    pub fn timestamp(&self) -> f64 {
        lock(&self.state).timestamp
    }

    /// Drop every outstanding reply; awaiting callers see `CallbackDropped`
    pub fn cancel_pending(&self) -> usize {
        let cancelled = self.pending.cancel_all();
        if cancelled > 0 {
            debug!("Cancelled {} pending native calls", cancelled);
        }
        cancelled
    }

    pub fn pending_calls(&self) -> usize {
        self.pending.len()
    }

    /// Entry point for raw JSON pushed by the host
    pub fn dispatch_json(&self, raw: Value) -> Result<()> {
        let message = serde_json::from_value(raw).map_err(|source| {
            warn!("Ignoring malformed native message: {}", source);
            XrError::MalformedResponse {
                action: "dispatch".to_string(),
                source,
            }
        })?;
        self.dispatch(message);
        Ok(())
    }

    /// Entry point for everything the host pushes
    pub fn dispatch(&self, message: InboundMessage) {
        match message {
            InboundMessage::Callback { callback_key, data } => {
                self.pending.resolve(&callback_key, data);
            }
            InboundMessage::Watch(data) => self.on_watch(data),
            InboundMessage::ComputerVisionData { detail } => {
                self.on_computer_vision_data(detail.as_ref())
            }
            InboundMessage::NativeTime { native_time } => {
                let mut state = lock(&self.state);
                state.clock.record(native_time);
                debug!(
                    "Native time {} gives clock offset {:?}",
                    native_time,
                    state.clock.offset()
                );
            }
            InboundMessage::TrackingChanged { state } => {
                lock(&self.state).tracking_state = Some(state);
                self.events.emit(BridgeEvent::TrackingChanged(state));
            }
            InboundMessage::Error {
                domain,
                code,
                message,
            } => {
                warn!("Native tracker error {} {}: {}", domain, code, message);
                self.events.emit(BridgeEvent::Error {
                    domain,
                    code,
                    message,
                });
            }
            InboundMessage::WindowResize {
                width,
                height,
                focal_length,
            } => self.events.emit(BridgeEvent::WindowResize {
                width,
                height,
                focal_length,
            }),
            InboundMessage::Lifecycle { event } => {
                debug!("Native lifecycle event {:?}", event);
                self.events.emit(BridgeEvent::Lifecycle(event));
            }
        }
    }

    fn on_watch(&self, data: WatchData) {
        let data = Arc::new(data);
        {
            let mut state = lock(&self.state);
            let timestamp = match data.timestamp {
                Some(native) => state.clock.adjust(native),
                None => state.clock.now_ms(),
            };
            state.timestamp = timestamp;

            for object in &data.new_objects {
                state.track(object);
            }
            for uid in &data.removed_objects {
                state.forget(uid);
            }
            for object in &data.objects {
                state.track(object);
            }
            state.latest = Some(data.clone());
        }
        self.events.emit(BridgeEvent::Watch(data));
    }

    fn on_computer_vision_data(&self, detail: Option<&CvDetail>) {
        let clock = lock(&self.state).clock.clone();
        match decode_frame(detail, |native| clock.adjust(native), &self.pool) {
            Ok(frame) => {
                if let Some(sink) = lock(&self.video_sink).as_ref() {
                    if sink.send(frame).is_err() {
                        debug!("Video frame receiver went away; frame released");
                    }
                }
            }
            Err(reason) => {
                warn!("Skipping computer vision frame: {}", reason);
                if let Err(err) = self.request_computer_vision_data() {
                    warn!("Failed to request a new computer vision frame: {}", err);
                }
            }
        }
    }
}
