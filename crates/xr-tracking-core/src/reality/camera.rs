//! Reality backed by the device camera
//!
//! Tracking comes from whichever backend was injected: the native bridge,
//! a stereo device with its own hit testing, or a plain video stream that
//! only supplies frames.

use super::{HitTester, LightEstimator, Reality, RealityEvent};
use crate::anchor::{
    Anchor, AnchorId, AnchorKind, AnchorOffset, AnchorRegistry, PlaneAlignment,
};
use crate::bridge::{
    pick_hit, BridgeEvent, HitTestTypes, NativeBridge, NativeObject, PendingReply, PlaneHit,
    UiOptions, WatchData,
};
use crate::coordinate_system::CoordinateSystem;
use crate::display::DisplayHandle;
use crate::error::{Result, XrError};
use crate::shared::{lock, EventHub};
use crate::spatial::Matrix4;
use crate::stereo::StereoDevice;
use crate::video::{BufferPool, CameraInfo, VideoFrame, VideoSource};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};
use xr_tracking_config::{CameraConfig, TrackingConfig};

#[derive(Debug, Default)]
struct VideoState {
    sending: bool,
    paused: bool,
    send_next: bool,
}

/// Shared camera reality
pub struct CameraReality {
    bridge: Option<Arc<NativeBridge>>,
    stereo: Option<Arc<dyn StereoDevice>>,
    video_source: Option<Arc<dyn VideoSource>>,
    anchors: AnchorRegistry,
    events: EventHub<RealityEvent>,
    frames: EventHub<Arc<VideoFrame>>,
    bridge_events: Mutex<Option<UnboundedReceiver<BridgeEvent>>>,
    bridge_frames: Mutex<Option<UnboundedReceiver<VideoFrame>>>,
    /// addAnchor replies still in flight
    pending_anchors: Mutex<Vec<(AnchorId, PendingReply)>>,
    running: AtomicBool,
    video: Mutex<VideoState>,
    camera: CameraConfig,
    neutral_intensity: f32,
    ui_options: UiOptions,
    pool: Arc<BufferPool>,
}

impl CameraReality {
    pub fn new() -> Self {
        let config = TrackingConfig::default();
        Self {
            bridge: None,
            stereo: None,
            video_source: None,
            anchors: AnchorRegistry::new(),
            events: EventHub::new(),
            frames: EventHub::new(),
            bridge_events: Mutex::new(None),
            bridge_frames: Mutex::new(None),
            pending_anchors: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
            video: Mutex::new(VideoState::default()),
            camera: config.camera,
            neutral_intensity: config.light.neutral_intensity,
            ui_options: UiOptions::default(),
            pool: BufferPool::global(),
        }
    }

    pub fn with_config(mut self, config: &TrackingConfig) -> Self {
        self.camera = config.camera.clone();
        self.neutral_intensity = config.light.neutral_intensity;
        self
    }

    /// Track through the native bridge. Its events and frames are queued
    /// here and folded in at the start of each frame.
    pub fn with_bridge(mut self, bridge: Arc<NativeBridge>) -> Self {
        *lock(&self.bridge_events) = Some(bridge.subscribe());
        *lock(&self.bridge_frames) = Some(bridge.video_frames());
        self.bridge = Some(bridge);
        self
    }

    pub fn with_stereo_device(mut self, device: Arc<dyn StereoDevice>) -> Self {
        self.stereo = Some(device);
        self
    }

    pub fn with_video_source(mut self, source: Arc<dyn VideoSource>) -> Self {
        self.video_source = Some(source);
        self
    }

    pub fn with_ui_options(mut self, options: UiOptions) -> Self {
        self.ui_options = options;
        self
    }

    pub fn with_buffer_pool(mut self, pool: Arc<BufferPool>) -> Self {
        self.pool = pool;
        self
    }

    pub fn bridge(&self) -> Option<&Arc<NativeBridge>> {
        self.bridge.as_ref()
    }

    pub fn stereo_device(&self) -> Option<&Arc<dyn StereoDevice>> {
        self.stereo.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Bridge usable for commands right now
    fn live_bridge(&self) -> Option<&Arc<NativeBridge>> {
        self.bridge.as_ref().filter(|bridge| bridge.is_initialized())
    }

    fn insert(&self, anchor: Anchor) -> AnchorId {
        let uid = self.anchors.insert(anchor);
        self.events.emit(RealityEvent::AnchorAdded(uid.clone()));
        uid
    }

    /// Update a known anchor from native data, or create it
    fn upsert_native(&self, object: &NativeObject, display: &DisplayHandle) {
        let updated = self.anchors.update(&object.uuid, |anchor| {
            anchor
                .coordinate_system_mut()
                .set_relative_matrix(object.transform);
            refresh_kind(anchor.kind_mut(), object);
        });

        if updated {
            self.events
                .emit(RealityEvent::AnchorUpdated(object.uuid.clone()));
        } else {
            let coordinate_system = CoordinateSystem::tracker(display.clone(), object.transform);
            self.insert(
                Anchor::new(coordinate_system, Some(object.uuid.clone()))
                    .with_kind(object.anchor_kind()),
            );
        }
    }

    fn apply_watch(&self, data: &WatchData, display: &DisplayHandle) {
        for object in &data.new_objects {
            self.upsert_native(object, display);
        }
        for uid in &data.removed_objects {
            if self.anchors.remove(uid).is_some() {
                self.events.emit(RealityEvent::AnchorRemoved(uid.clone()));
            }
        }
        for object in &data.objects {
            self.upsert_native(object, display);
        }
    }

    fn drain_bridge_events(&self, display: &DisplayHandle) {
        let queued: Vec<BridgeEvent> = match lock(&self.bridge_events).as_mut() {
            Some(receiver) => std::iter::from_fn(|| receiver.try_recv().ok()).collect(),
            None => return,
        };

        for event in queued {
            match event {
                BridgeEvent::Watch(data) => self.apply_watch(&data, display),
                BridgeEvent::TrackingChanged(state) => {
                    self.events.emit(RealityEvent::TrackingChanged(state))
                }
                BridgeEvent::Error {
                    domain,
                    code,
                    message,
                } => self.events.emit(RealityEvent::BackendError {
                    domain,
                    code,
                    message,
                }),
                BridgeEvent::WindowResize {
                    width,
                    height,
                    focal_length,
                } => self.events.emit(RealityEvent::WindowResize {
                    width,
                    height,
                    focal_length,
                }),
                BridgeEvent::Lifecycle(event) => self.events.emit(RealityEvent::Lifecycle(event)),
                BridgeEvent::Initialized { device_id } => {
                    debug!("Camera reality saw bridge init for {}", device_id)
                }
            }
        }
    }

    fn poll_pending_anchors(&self) {
        let mut resolved = Vec::new();
        lock(&self.pending_anchors).retain_mut(|(uid, reply)| match reply.try_take() {
            None => true,
            Some(result) => {
                resolved.push((uid.clone(), result));
                false
            }
        });

        for (uid, result) in resolved {
            let object = result.and_then(|value| {
                serde_json::from_value::<NativeObject>(value).map_err(|source| {
                    XrError::MalformedResponse {
                        action: "addAnchor".to_string(),
                        source,
                    }
                })
            });
            match object {
                Ok(object) => {
                    let updated = self.anchors.update(&uid, |anchor| {
                        anchor
                            .coordinate_system_mut()
                            .set_relative_matrix(object.transform);
                    });
                    if updated {
                        self.events.emit(RealityEvent::AnchorUpdated(uid));
                    }
                }
                Err(err) => warn!("Native anchor {} was not confirmed: {}", uid, err),
            }
        }
    }

    fn forward_frames(&self, display: &DisplayHandle, timestamp: f64) {
        let frames: Vec<VideoFrame> = match lock(&self.bridge_frames).as_mut() {
            Some(receiver) => std::iter::from_fn(|| receiver.try_recv().ok()).collect(),
            None => Vec::new(),
        };
        for frame in frames {
            self.frames.emit(Arc::new(frame));
        }

        let Some(source) = &self.video_source else {
            return;
        };
        {
            let mut video = lock(&self.video);
            if !video.sending || video.paused || !video.send_next {
                return;
            }
            video.send_next = false;
        }
        let Some(image) = source.capture() else {
            return;
        };

        let mut camera = CameraInfo::from_fov(image.width, image.height, self.camera.fov_degrees);
        if let Some(view) = display.views().first() {
            camera.view_matrix = view.view_matrix.invert().unwrap_or(Matrix4::IDENTITY);
            camera.projection_matrix = view.projection_matrix;
        }
        let frame = VideoFrame::from_rgba(&image, timestamp, camera, self.pool.clone());
        self.frames.emit(Arc::new(frame));
    }

    fn anchor_for_hit(
        &self,
        uid: Option<&str>,
        transform: Matrix4,
        display: &DisplayHandle,
    ) -> AnchorId {
        if let Some(uid) = uid.filter(|uid| self.anchors.contains(uid)) {
            return uid.to_string();
        }
        let coordinate_system = CoordinateSystem::tracker(display.clone(), transform);
        self.insert(Anchor::new(coordinate_system, uid.map(str::to_string)))
    }
}

impl Default for CameraReality {
    fn default() -> Self {
        Self::new()
    }
}

/// Copy kind-specific fields from a native update, keeping identity
fn refresh_kind(kind: &mut AnchorKind, object: &NativeObject) {
    match kind {
        AnchorKind::Plane(plane) => {
            if let Some(center) = object.plane_center {
                plane.center = center;
            }
            plane.extent = object.plane_extent_xz();
            if let Some(alignment) = object.plane_alignment {
                plane.alignment = PlaneAlignment::from_native(alignment);
            }
            if object.geometry.is_some() {
                plane.geometry = object.geometry.clone();
            }
        }
        AnchorKind::Face(face) => {
            if let Some(geometry) = &object.geometry {
                face.geometry = Some(geometry.clone());
            }
            if let Some(blend_shapes) = &object.blend_shapes {
                face.update_blend_shapes(blend_shapes.clone());
            }
        }
        AnchorKind::Generic | AnchorKind::Image { .. } => {}
    }
}

#[async_trait]
impl HitTester for CameraReality {
    async fn find_anchor(
        &self,
        x: f32,
        y: f32,
        display: &DisplayHandle,
        types: HitTestTypes,
    ) -> Result<Option<AnchorOffset>> {
        if let Some(bridge) = self.live_bridge() {
            let hits = bridge.hit_test(x, y, types).await?;
            let Some(hit) = pick_hit(&hits) else {
                return Ok(None);
            };

            let Some(anchor_transform) = hit.anchor_transform else {
                let uid = self.anchor_for_hit(hit.uuid.as_deref(), hit.world_transform, display);
                return Ok(Some(AnchorOffset::identity(uid)));
            };

            let uid = self.anchor_for_hit(hit.uuid.as_deref(), anchor_transform, display);
            // world = offset * anchor
            let rotation =
                hit.world_transform.rotation() * anchor_transform.rotation().inverse();
            let translation = hit.world_transform.position() - anchor_transform.position();
            let pose = Matrix4::from_rotation_translation(rotation, translation);
            return Ok(Some(AnchorOffset::from_pose(uid, pose)));
        }

        if let Some(stereo) = &self.stereo {
            let mut hits = stereo.hit_test(x, y);
            hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
            let Some(hit) = hits.first() else {
                return Ok(None);
            };
            let uid = self.anchor_for_hit(hit.uuid.as_deref(), hit.model_matrix, display);
            return Ok(Some(AnchorOffset::identity(uid)));
        }

        Ok(None)
    }

    /// The camera has no notion of a floor
    async fn find_floor_anchor(
        &self,
        _display: &DisplayHandle,
        _uid: Option<AnchorId>,
    ) -> Result<Option<AnchorOffset>> {
        Ok(None)
    }

    fn hit_test_no_anchor(&self, x: f32, y: f32) -> Result<Vec<PlaneHit>> {
        if let Some(bridge) = &self.bridge {
            return bridge.hit_test_no_anchor(x, y);
        }
        if let Some(stereo) = &self.stereo {
            let mut hits: Vec<PlaneHit> = stereo
                .hit_test(x, y)
                .into_iter()
                .map(|hit| PlaneHit {
                    plane_id: hit.uuid.unwrap_or_default(),
                    model_matrix: hit.model_matrix,
                    distance: hit.distance,
                })
                .collect();
            hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
            return Ok(hits);
        }
        Ok(Vec::new())
    }
}

impl LightEstimator for CameraReality {
    fn light_estimate(&self) -> Option<f32> {
        let intensity = self.bridge.as_ref()?.light_intensity()?;
        Some(intensity / self.neutral_intensity)
    }
}

#[async_trait]
impl Reality for CameraReality {
    fn name(&self) -> &str {
        "Camera"
    }

    fn is_shared(&self) -> bool {
        true
    }

    fn is_passthrough(&self) -> bool {
        true
    }

    fn anchors(&self) -> &AnchorRegistry {
        &self.anchors
    }

    fn subscribe(&self) -> UnboundedReceiver<RealityEvent> {
        self.events.subscribe()
    }

    async fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(bridge) = &self.bridge {
            if !bridge.is_initialized() {
                bridge.init(self.ui_options.clone()).await?;
            }
            bridge.watch(None).await?;
        }
        info!("Camera reality started");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(bridge) = &self.bridge {
            bridge.stop().await?;
        }
        info!("Camera reality stopped");
        Ok(())
    }

    fn handle_new_frame(&self, display: &DisplayHandle, timestamp: f64) {
        self.drain_bridge_events(display);
        self.poll_pending_anchors();
        self.forward_frames(display, timestamp);
    }

    /// With a bridge the anchor is also registered natively; the native
    /// transform is applied once the reply arrives
    fn add_anchor(&self, anchor: Anchor) -> AnchorId {
        if let Some(bridge) = self.live_bridge() {
            match bridge.add_anchor(anchor.uid(), anchor.pose_matrix()) {
                Ok(reply) => lock(&self.pending_anchors).push((anchor.uid().to_string(), reply)),
                Err(err) => warn!("Failed to register anchor {} natively: {}", anchor.uid(), err),
            }
        }
        self.insert(anchor)
    }

    fn remove_anchor(&self, uid: &str) {
        if self.anchors.remove(uid).is_some() {
            self.events.emit(RealityEvent::AnchorRemoved(uid.to_string()));
        }
        if let Some(bridge) = self.live_bridge() {
            if let Err(err) = bridge.remove_anchors(&[uid.to_string()]) {
                warn!("Failed to remove native anchor {}: {}", uid, err);
            }
        }
    }

    fn timestamp(&self, frame_timestamp: f64) -> f64 {
        match &self.bridge {
            Some(bridge) => bridge.timestamp(),
            None => frame_timestamp,
        }
    }

    async fn create_image_anchor(
        &self,
        uid: &str,
        rgba: &[u8],
        width: u32,
        height: u32,
        physical_width: f32,
    ) -> Result<Value> {
        let bridge = self.bridge.as_ref().ok_or_else(|| {
            XrError::Unsupported("image anchors need the native bridge".to_string())
        })?;
        bridge
            .create_image_anchor(uid, rgba, width, height, physical_width)
            .await
    }

    async fn activate_detection_image(
        &self,
        uid: &str,
        display: &DisplayHandle,
    ) -> Result<Matrix4> {
        let bridge = self.bridge.as_ref().ok_or_else(|| {
            XrError::Unsupported("image detection needs the native bridge".to_string())
        })?;
        let detected = bridge.activate_detection_image(uid).await?;

        let name = detected.name.clone().or_else(|| Some(uid.to_string()));
        // re-detection moves the existing image anchor
        let updated = self.anchors.update(&detected.uuid, |anchor| {
            anchor
                .coordinate_system_mut()
                .set_relative_matrix(detected.transform);
            *anchor.kind_mut() = AnchorKind::Image { name: name.clone() };
        });
        if updated {
            self.events
                .emit(RealityEvent::AnchorUpdated(detected.uuid.clone()));
        } else {
            let coordinate_system = CoordinateSystem::tracker(display.clone(), detected.transform);
            self.insert(
                Anchor::new(coordinate_system, Some(detected.uuid.clone()))
                    .with_kind(AnchorKind::Image { name }),
            );
        }
        Ok(detected.transform)
    }

    fn video_frames(&self) -> Option<UnboundedReceiver<Arc<VideoFrame>>> {
        Some(self.frames.subscribe())
    }

    fn start_video_frames(&self) -> Result<()> {
        if let Some(bridge) = &self.bridge {
            return bridge.start_computer_vision_data();
        }
        let mut video = lock(&self.video);
        video.sending = true;
        video.paused = false;
        video.send_next = true;
        Ok(())
    }

    fn stop_video_frames(&self) -> Result<()> {
        if let Some(bridge) = &self.bridge {
            return bridge.stop_computer_vision_data();
        }
        lock(&self.video).paused = true;
        Ok(())
    }

    fn request_video_frame(&self) -> Result<()> {
        if let Some(bridge) = &self.bridge {
            return bridge.request_computer_vision_data();
        }
        lock(&self.video).send_next = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{BridgeCommand, BridgeRequest, ChannelTransport, InboundMessage};
    use crate::display::{DisplayState, Eye, FieldOfView, View};
    use crate::spatial::Vector3D;
    use crate::video::CapturedImage;
    use serde_json::json;

    fn display() -> DisplayHandle {
        let fov = FieldOfView::symmetric(70.0);
        DisplayHandle::new(DisplayState::new(
            vec![View::new(fov, 0.1, 1000.0, Eye::None)],
            fov,
            0.1,
            1000.0,
        ))
    }

    async fn bridged() -> (
        CameraReality,
        Arc<NativeBridge>,
        UnboundedReceiver<BridgeRequest>,
    ) {
        let (transport, mut requests) = ChannelTransport::new();
        let bridge = Arc::new(NativeBridge::new(Arc::new(transport)));
        let init = tokio::spawn({
            let bridge = bridge.clone();
            async move { bridge.init(UiOptions::default()).await }
        });
        let request = requests.recv().await.unwrap();
        bridge.dispatch(InboundMessage::Callback {
            callback_key: request.callback_key.unwrap(),
            data: json!({ "deviceId": "phone" }),
        });
        init.await.unwrap().unwrap();

        let reality = CameraReality::new().with_bridge(bridge.clone());
        (reality, bridge, requests)
    }

    fn watch(value: Value) -> InboundMessage {
        let mut value = value;
        value["type"] = json!("watch");
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_watch_events_fold_into_registry() {
        let (reality, bridge, _requests) = bridged().await;
        let display = display();
        let mut events = reality.subscribe();

        bridge.dispatch(watch(json!({
            "newObjects": [{
                "uuid": "plane-1",
                "transform": Matrix4::IDENTITY,
                "type": "plane",
                "plane_center": {"x": 0, "y": 0, "z": 0},
                "plane_extent": {"x": 1, "z": 2},
                "plane_alignment": 0
            }]
        })));
        // nothing changes until the frame starts
        assert!(reality.get_anchor("plane-1").is_none());

        reality.handle_new_frame(&display, 0.0);
        assert_eq!(
            events.try_recv().unwrap(),
            RealityEvent::AnchorAdded("plane-1".to_string())
        );

        bridge.dispatch(watch(json!({
            "objects": [{
                "uuid": "plane-1",
                "transform": Matrix4::from_translation(Vector3D::new(0.0, 0.0, -1.0)),
                "type": "plane",
                "plane_center": {"x": 0, "y": 0, "z": 0},
                "plane_extent": {"x": 3, "z": 4}
            }]
        })));
        reality.handle_new_frame(&display, 1.0);
        assert_eq!(
            events.try_recv().unwrap(),
            RealityEvent::AnchorUpdated("plane-1".to_string())
        );
        let anchor = reality.get_anchor("plane-1").unwrap();
        assert!((anchor.position().z + 1.0).abs() < 0.0001);
        match anchor.kind() {
            AnchorKind::Plane(plane) => assert_eq!(plane.extent, [3.0, 4.0]),
            other => panic!("unexpected kind {other:?}"),
        }

        bridge.dispatch(watch(json!({ "removedObjects": ["plane-1"] })));
        reality.handle_new_frame(&display, 2.0);
        assert_eq!(
            events.try_recv().unwrap(),
            RealityEvent::AnchorRemoved("plane-1".to_string())
        );
        assert!(reality.get_anchor("plane-1").is_none());
    }

    #[tokio::test]
    async fn test_find_anchor_offsets_from_plane() {
        let (reality, bridge, mut requests) = bridged().await;
        let reality = Arc::new(reality);
        let display = display();

        let anchor_transform = Matrix4::from_translation(Vector3D::new(0.0, -1.0, -2.0));
        let world_transform = Matrix4::from_translation(Vector3D::new(0.3, -1.0, -2.0));

        let find = tokio::spawn({
            let reality = reality.clone();
            let display = display.clone();
            async move {
                reality
                    .find_anchor(0.5, 0.5, &display, HitTestTypes::EXISTING_PLANES)
                    .await
            }
        });
        let request = requests.recv().await.unwrap();
        assert_eq!(request.command_name, BridgeCommand::HitTest);
        bridge.dispatch(InboundMessage::Callback {
            callback_key: request.callback_key.unwrap(),
            data: json!([{
                "type": 16,
                "distance": 2.0,
                "world_transform": world_transform,
                "anchor_transform": anchor_transform,
                "uuid": "plane-7"
            }]),
        });

        let offset = find.await.unwrap().unwrap().unwrap();
        assert_eq!(offset.anchor_uid, "plane-7");
        let anchor = reality.get_anchor("plane-7").unwrap();
        let world = offset.offset_transform(anchor.coordinate_system());
        assert!((world.position().x - 0.3).abs() < 0.0001);
        assert!((world.position().z + 2.0).abs() < 0.0001);
    }

    #[tokio::test]
    async fn test_find_anchor_miss() {
        let (reality, bridge, mut requests) = bridged().await;
        let reality = Arc::new(reality);
        let find = tokio::spawn({
            let reality = reality.clone();
            async move {
                reality
                    .find_anchor(0.5, 0.5, &display(), HitTestTypes::ALL)
                    .await
            }
        });
        let request = requests.recv().await.unwrap();
        bridge.dispatch(InboundMessage::Callback {
            callback_key: request.callback_key.unwrap(),
            data: json!([]),
        });
        assert!(find.await.unwrap().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_add_anchor_applies_native_reply_at_frame_start() {
        let (reality, bridge, mut requests) = bridged().await;
        let display = display();
        let uid = reality.add_anchor(Anchor::new(
            CoordinateSystem::tracker(display.clone(), Matrix4::IDENTITY),
            Some("mine".to_string()),
        ));

        let request = requests.recv().await.unwrap();
        assert_eq!(request.command_name, BridgeCommand::AddAnchor);
        assert_eq!(request.payload["uuid"], "mine");
        bridge.dispatch(InboundMessage::Callback {
            callback_key: request.callback_key.unwrap(),
            data: json!({
                "uuid": "mine",
                "transform": Matrix4::from_translation(Vector3D::new(0.0, 0.5, 0.0))
            }),
        });
        assert!(reality.get_anchor(&uid).unwrap().position().y.abs() < 0.0001);

        reality.handle_new_frame(&display, 0.0);
        assert!((reality.get_anchor(&uid).unwrap().position().y - 0.5).abs() < 0.0001);
    }

    #[tokio::test]
    async fn test_remove_anchor_notifies_bridge() {
        let (reality, _bridge, mut requests) = bridged().await;
        let display = display();
        let uid = reality.add_anchor(Anchor::new(
            CoordinateSystem::tracker(display, Matrix4::IDENTITY),
            None,
        ));
        let _add = requests.recv().await.unwrap();

        reality.remove_anchor(&uid);
        assert!(reality.get_anchor(&uid).is_none());
        let request = requests.recv().await.unwrap();
        assert_eq!(request.command_name, BridgeCommand::RemoveAnchors);
        assert_eq!(request.payload, json!([uid]));
    }

    #[tokio::test]
    async fn test_light_estimate_normalized() {
        let (reality, bridge, _requests) = bridged().await;
        assert!(reality.light_estimate().is_none());
        bridge.dispatch(watch(json!({ "light_intensity": 500.0 })));
        assert!((reality.light_estimate().unwrap() - 0.5).abs() < 0.0001);
    }

    #[tokio::test]
    async fn test_redetected_image_moves_existing_anchor() {
        let (reality, bridge, mut requests) = bridged().await;
        let reality = Arc::new(reality);
        let display = display();
        let mut events = reality.subscribe();

        for depth in [1.0_f32, 2.0] {
            let activation = tokio::spawn({
                let reality = reality.clone();
                let display = display.clone();
                async move { reality.activate_detection_image("poster", &display).await }
            });
            let request = requests.recv().await.unwrap();
            assert_eq!(request.command_name, BridgeCommand::ActivateDetectionImage);
            bridge.dispatch(InboundMessage::Callback {
                callback_key: request.callback_key.unwrap(),
                data: json!({
                    "activated": true,
                    "imageAnchor": {
                        "uuid": "poster-anchor",
                        "transform": Matrix4::from_translation(Vector3D::new(0.0, 0.0, -depth)),
                    }
                }),
            });
            activation.await.unwrap().unwrap();
        }

        assert_eq!(
            events.try_recv().unwrap(),
            RealityEvent::AnchorAdded("poster-anchor".to_string())
        );
        assert_eq!(
            events.try_recv().unwrap(),
            RealityEvent::AnchorUpdated("poster-anchor".to_string())
        );
        assert!(events.try_recv().is_err());

        let anchor = reality.get_anchor("poster-anchor").unwrap();
        assert!((anchor.position().z + 2.0).abs() < 0.0001);
        match anchor.kind() {
            AnchorKind::Image { name } => assert_eq!(name.as_deref(), Some("poster")),
            other => panic!("unexpected kind {other:?}"),
        }
    }

    struct StillCamera;

    impl VideoSource for StillCamera {
        fn capture(&self) -> Option<CapturedImage> {
            Some(CapturedImage {
                width: 4,
                height: 2,
                rgba: vec![7; 32],
            })
        }
    }

    #[test]
    fn test_video_source_frames_on_request() {
        let reality = CameraReality::new()
            .with_video_source(Arc::new(StillCamera))
            .with_buffer_pool(Arc::new(BufferPool::new()));
        let display = display();
        let mut frames = reality.video_frames().unwrap();

        reality.handle_new_frame(&display, 1.0);
        assert!(frames.try_recv().is_err());

        reality.start_video_frames().unwrap();
        reality.handle_new_frame(&display, 2.0);
        let frame = frames.try_recv().unwrap();
        assert_eq!(frame.buffers()[0].size.bytes_per_row, 16);
        assert!((frame.timestamp() - 2.0).abs() < 0.0001);

        // one frame per request
        reality.handle_new_frame(&display, 3.0);
        assert!(frames.try_recv().is_err());
        reality.request_video_frame().unwrap();
        reality.handle_new_frame(&display, 4.0);
        assert!(frames.try_recv().is_ok());
    }
}
