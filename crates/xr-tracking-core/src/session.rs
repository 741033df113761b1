//! Live pairing of one display and one reality, driving the frame loop
//!
//! Every frame the session refreshes its camera anchor, lets the reality
//! and display pull backend state, re-resolves attached scene nodes and
//! then hands a [`FrameSnapshot`] to the application.

use crate::anchor::{Anchor, AnchorId, AnchorOffset};
use crate::bridge::{HitTestTypes, LifecycleEvent, PlaneHit, TrackingState};
use crate::coordinate_system::{CoordinateSystem, CoordinateSystemKind};
use crate::display::{Display, SessionParameters, SessionType, View};
use crate::error::{Result, XrError};
use crate::reality::{Reality, RealityEvent, VirtualReality};
use crate::shared::{lock, EventHub};
use crate::spatial::{Matrix4, Quaternion, Vector3D};
use crate::video::VideoFrame;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use xr_tracking_config::SessionConfig;

/// Application-chosen scene node id
pub type NodeId = String;

/// Output of an object detector for one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Detection {
    pub label: String,
    pub position_scale: [f32; 4],
    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,
    pub distance: f32,
}

/// Object detector fed with camera frames
pub trait Detector: Send + Sync {
    fn detect(&self, max_iterations: u32, frame: &VideoFrame, options: &Value) -> Option<Detection>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    AnchorAdded(AnchorId),
    AnchorUpdated(AnchorId),
    AnchorRemoved(AnchorId),
    /// The node's anchor is gone; the node has been detached
    NodeOrphaned {
        node_id: NodeId,
        anchor_uid: AnchorId,
    },
    TrackingChanged(TrackingState),
    BackendError {
        domain: String,
        code: i64,
        message: String,
    },
    Lifecycle(LifecycleEvent),
    Ended,
}

/// Attached node with its world transform for this frame
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedNode {
    pub node_id: NodeId,
    pub anchor_uid: AnchorId,
    pub world_transform: Matrix4,
}

/// Everything the renderer needs for one frame
#[derive(Debug, Clone)]
pub struct FrameSnapshot {
    pub timestamp: f64,
    pub views: Vec<View>,
    pub head_pose: Matrix4,
    pub eye_level_pose: Matrix4,
    pub light_estimate: Option<f32>,
    pub nodes: Vec<ResolvedNode>,
    pub camera_anchor: Option<AnchorId>,
    pub detection: Option<Detection>,
}

/// Camera frame with its view matrix expressed against a camera anchor
#[derive(Debug, Clone)]
pub struct AnchoredVideoFrame {
    pub frame: Arc<VideoFrame>,
    pub anchor_uid: Option<AnchorId>,
    pub view_matrix: Matrix4,
}

#[derive(Debug, Clone)]
struct CameraAnchor {
    uid: AnchorId,
    timestamp: f64,
    coordinate_system: CoordinateSystem,
}

struct DetectorSlot {
    detector: Arc<dyn Detector>,
    max_iterations: u32,
    options: Value,
}

pub struct Session {
    id: Uuid,
    created_at: DateTime<Utc>,
    parameters: SessionParameters,
    display: Arc<dyn Display>,
    reality: Arc<dyn Reality>,
    config: SessionConfig,
    ended: watch::Sender<bool>,
    /// Newest first
    camera_anchors: Mutex<VecDeque<CameraAnchor>>,
    nodes: Mutex<Vec<(NodeId, AnchorOffset)>>,
    events: EventHub<SessionEvent>,
    reality_events: Mutex<UnboundedReceiver<RealityEvent>>,
    video_input: Mutex<Option<UnboundedReceiver<Arc<VideoFrame>>>>,
    video_handler: Mutex<Option<UnboundedSender<AnchoredVideoFrame>>>,
    detector: Option<DetectorSlot>,
    detection: Mutex<Option<Detection>>,
}

impl Session {
    /// Create a session on `display` and start it. Reality sessions get a
    /// fresh private [`VirtualReality`].
    pub async fn start(
        display: Arc<dyn Display>,
        parameters: SessionParameters,
        config: SessionConfig,
    ) -> Result<Self> {
        if !display.supports_session(&parameters) {
            return Err(XrError::UnsupportedSession(format!(
                "{} does not support {:?}",
                display.name(),
                parameters
            )));
        }
        if parameters.session_type == SessionType::Reality {
            display.set_reality(Arc::new(VirtualReality::new()));
        }

        let reality = display.reality();
        let reality_events = reality.subscribe();
        display.start().await?;

        let (ended, _) = watch::channel(false);
        let session = Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            parameters,
            display,
            reality,
            config,
            ended,
            camera_anchors: Mutex::new(VecDeque::new()),
            nodes: Mutex::new(Vec::new()),
            events: EventHub::new(),
            reality_events: Mutex::new(reality_events),
            video_input: Mutex::new(None),
            video_handler: Mutex::new(None),
            detector: None,
            detection: Mutex::new(None),
        };
        info!(
            "Session {} started on {} with {} reality",
            session.id,
            session.display.name(),
            session.reality.name()
        );
        Ok(session)
    }

    /// Feed the newest camera frame to `detector` every frame one arrives
    pub fn with_detector(
        mut self,
        detector: Arc<dyn Detector>,
        max_iterations: u32,
        options: Value,
    ) -> Self {
        self.detector = Some(DetectorSlot {
            detector,
            max_iterations,
            options,
        });
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn parameters(&self) -> SessionParameters {
        self.parameters
    }

    pub fn display(&self) -> &Arc<dyn Display> {
        &self.display
    }

    pub fn reality(&self) -> &Arc<dyn Reality> {
        &self.reality
    }

    pub fn is_ended(&self) -> bool {
        *self.ended.borrow()
    }

    pub fn subscribe(&self) -> UnboundedReceiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Camera anchor uids, newest first
    pub fn camera_anchors(&self) -> Vec<AnchorId> {
        lock(&self.camera_anchors)
            .iter()
            .map(|anchor| anchor.uid.clone())
            .collect()
    }

    /// Drive frames until the session ends or the display's clock stops.
    /// The next frame is always requested before the current callback runs.
    pub async fn run<F>(&self, mut callback: F) -> Result<()>
    where
        F: FnMut(&FrameSnapshot) -> anyhow::Result<()> + Send,
    {
        let mut ended = self.ended.subscribe();
        let mut next = self.display.request_frame();
        loop {
            let timestamp = tokio::select! {
                _ = ended.wait_for(|ended| *ended) => return Ok(()),
                frame = &mut next => match frame {
                    Ok(timestamp) => timestamp,
                    Err(_) => {
                        debug!("Frame clock for session {} went away", self.id);
                        return Ok(());
                    }
                },
            };

            next = self.display.request_frame();
            match self.render_frame(timestamp, &mut callback) {
                Ok(()) => {}
                // ended on another task after the frame arrived
                Err(XrError::SessionEnded) => return Ok(()),
                Err(err) => return Err(err),
            }
        }
    }

    /// Process one frame. Errors from `callback` are logged and do not
    /// stop the session.
    pub fn render_frame<F>(&self, timestamp: f64, callback: F) -> Result<()>
    where
        F: FnOnce(&FrameSnapshot) -> anyhow::Result<()>,
    {
        if self.is_ended() {
            return Err(XrError::SessionEnded);
        }
        let timestamp = self.reality.timestamp(timestamp);

        let camera_anchor = self.update_camera_anchor(timestamp);

        self.reality.handle_new_frame(self.display.handle(), timestamp);
        self.display.handle_new_frame(timestamp);
        self.relay_reality_events();

        let nodes = self.resolve_nodes();
        self.process_video_frames();

        let state = self.display.handle().snapshot();
        let snapshot = FrameSnapshot {
            timestamp,
            views: state.views,
            head_pose: state.head_pose,
            eye_level_pose: state.eye_level_pose,
            light_estimate: self.reality.light_estimate(),
            nodes,
            camera_anchor,
            detection: lock(&self.detection).clone(),
        };

        if let Err(err) = callback(&snapshot) {
            error!("Frame callback failed in session {}: {:#}", self.id, err);
        }

        self.display.handle_after_frame(timestamp);
        Ok(())
    }

    /// End the session: drop camera anchors and stop the display.
    /// Later calls do nothing.
    pub async fn end(&self) -> Result<()> {
        if self.ended.send_replace(true) {
            return Ok(());
        }

        let anchors: Vec<CameraAnchor> = lock(&self.camera_anchors).drain(..).collect();
        for anchor in &anchors {
            self.reality.remove_anchor(&anchor.uid);
        }
        lock(&self.nodes).clear();
        *lock(&self.video_handler) = None;
        self.events.emit(SessionEvent::Ended);

        info!(
            "Session {} ended, removed {} camera anchors",
            self.id,
            anchors.len()
        );
        self.display.stop().await
    }

    /// Mint a new camera anchor when there is none or the newest has aged
    /// past the interval; evicts the oldest beyond capacity
    fn update_camera_anchor(&self, timestamp: f64) -> Option<AnchorId> {
        let mut anchors = lock(&self.camera_anchors);
        let stale = anchors
            .front()
            .map_or(true, |newest| newest.timestamp + self.config.reanchor_interval_ms < timestamp);
        if !stale {
            return anchors.front().map(|anchor| anchor.uid.clone());
        }

        let eye_level = self.display.coordinate_system(CoordinateSystemKind::EyeLevel);
        let offset = Vector3D::from_array(self.config.camera_anchor_offset);
        let uid = match self.add_anchor(&eye_level, offset, Quaternion::IDENTITY) {
            Ok(uid) => uid,
            Err(err) => {
                warn!("Could not place camera anchor: {}", err);
                return anchors.front().map(|anchor| anchor.uid.clone());
            }
        };
        let Some(anchor) = self.reality.get_anchor(&uid) else {
            return anchors.front().map(|anchor| anchor.uid.clone());
        };

        anchors.push_front(CameraAnchor {
            uid: uid.clone(),
            timestamp,
            coordinate_system: anchor.coordinate_system().clone(),
        });
        while anchors.len() > self.config.camera_anchor_capacity {
            if let Some(evicted) = anchors.pop_back() {
                debug!("Evicting camera anchor {}", evicted.uid);
                self.reality.remove_anchor(&evicted.uid);
            }
        }
        Some(uid)
    }

    fn relay_reality_events(&self) {
        let queued: Vec<RealityEvent> = {
            let mut receiver = lock(&self.reality_events);
            std::iter::from_fn(|| receiver.try_recv().ok()).collect()
        };

        for event in queued {
            let relayed = match event {
                RealityEvent::AnchorAdded(uid) => SessionEvent::AnchorAdded(uid),
                RealityEvent::AnchorUpdated(uid) => SessionEvent::AnchorUpdated(uid),
                RealityEvent::AnchorRemoved(uid) => SessionEvent::AnchorRemoved(uid),
                RealityEvent::TrackingChanged(state) => SessionEvent::TrackingChanged(state),
                RealityEvent::BackendError {
                    domain,
                    code,
                    message,
                } => SessionEvent::BackendError {
                    domain,
                    code,
                    message,
                },
                RealityEvent::Lifecycle(event) => SessionEvent::Lifecycle(event),
                RealityEvent::WindowResize {
                    width,
                    height,
                    focal_length,
                } => {
                    self.display
                        .handle_window_resize(width, height, focal_length);
                    continue;
                }
            };
            self.events.emit(relayed);
        }
    }

    /// Resolve every attached node; nodes whose anchor is gone are
    /// detached with one notification each
    fn resolve_nodes(&self) -> Vec<ResolvedNode> {
        let mut resolved = Vec::new();
        let mut orphaned = Vec::new();

        lock(&self.nodes).retain(|(node_id, offset)| {
            match self.reality.get_anchor(&offset.anchor_uid) {
                Some(anchor) => {
                    resolved.push(ResolvedNode {
                        node_id: node_id.clone(),
                        anchor_uid: offset.anchor_uid.clone(),
                        world_transform: offset.offset_transform(anchor.coordinate_system()),
                    });
                    true
                }
                None => {
                    orphaned.push((node_id.clone(), offset.anchor_uid.clone()));
                    false
                }
            }
        });

        for (node_id, anchor_uid) in orphaned {
            debug!("Node {} lost anchor {}", node_id, anchor_uid);
            self.events
                .emit(SessionEvent::NodeOrphaned { node_id, anchor_uid });
        }
        resolved
    }

    fn process_video_frames(&self) {
        let frames: Vec<Arc<VideoFrame>> = match lock(&self.video_input).as_mut() {
            Some(receiver) => std::iter::from_fn(|| receiver.try_recv().ok()).collect(),
            None => return,
        };
        let Some(newest) = frames.last().cloned() else {
            return;
        };

        let handler = lock(&self.video_handler).clone();
        if let Some(handler) = handler {
            for frame in frames {
                if handler.send(self.anchor_frame(frame)).is_err() {
                    debug!("Video frame handler for session {} went away", self.id);
                    *lock(&self.video_handler) = None;
                    break;
                }
            }
        }

        if let Some(slot) = &self.detector {
            let detection = slot
                .detector
                .detect(slot.max_iterations, &newest, &slot.options);
            *lock(&self.detection) = detection;
        }
    }

    /// Live pose of a camera anchor, falling back to the pose it was minted
    /// with once the reality has dropped it
    fn camera_anchor_pose(&self, anchor: &CameraAnchor) -> Matrix4 {
        self.reality
            .get_anchor(&anchor.uid)
            .map(|live| live.pose_matrix())
            .unwrap_or_else(|| anchor.coordinate_system.pose_model_matrix())
    }

    /// Re-express the frame's view matrix against the newest camera anchor
    fn anchor_frame(&self, frame: Arc<VideoFrame>) -> AnchoredVideoFrame {
        let view_matrix = frame.camera().view_matrix;
        let newest = lock(&self.camera_anchors).front().cloned();

        let anchored = newest.and_then(|anchor| {
            let world_to_anchor = self.camera_anchor_pose(&anchor).invert()?;
            Some((anchor.uid, world_to_anchor * view_matrix))
        });
        match anchored {
            Some((uid, view_matrix)) => AnchoredVideoFrame {
                frame,
                anchor_uid: Some(uid),
                view_matrix,
            },
            None => AnchoredVideoFrame {
                frame,
                anchor_uid: None,
                view_matrix,
            },
        }
    }

    /// World pose of an anchored frame's camera. `None` when the frame was
    /// not anchored or its anchor is unknown.
    pub fn video_frame_pose(&self, frame: &AnchoredVideoFrame) -> Option<Matrix4> {
        let uid = frame.anchor_uid.as_deref()?;
        let anchor_pose = match self.reality.get_anchor(uid) {
            Some(anchor) => anchor.pose_matrix(),
            None => {
                let anchors = lock(&self.camera_anchors);
                let Some(anchor) = anchors.iter().find(|anchor| anchor.uid == uid) else {
                    warn!("No camera anchor {} for video frame", uid);
                    return None;
                };
                anchor.coordinate_system.pose_model_matrix()
            }
        };
        Some(anchor_pose * frame.view_matrix)
    }

    /// Receive every camera frame, anchored, from now on. Replaces any
    /// previous handler.
    pub fn set_video_frame_handler(&self) -> UnboundedReceiver<AnchoredVideoFrame> {
        let (tx, rx) = mpsc::unbounded_channel();
        *lock(&self.video_handler) = Some(tx);
        rx
    }

    pub fn start_video_frames(&self) -> Result<()> {
        {
            let mut input = lock(&self.video_input);
            if input.is_none() {
                *input = self.reality.video_frames();
            }
        }
        self.reality.start_video_frames()
    }

    pub fn stop_video_frames(&self) -> Result<()> {
        self.reality.stop_video_frames()
    }

    pub fn request_video_frame(&self) -> Result<()> {
        self.reality.request_video_frame()
    }

    pub fn attach_node(&self, node_id: impl Into<NodeId>, offset: AnchorOffset) {
        let node_id = node_id.into();
        let mut nodes = lock(&self.nodes);
        match nodes.iter_mut().find(|(id, _)| *id == node_id) {
            Some(entry) => entry.1 = offset,
            None => nodes.push((node_id, offset)),
        }
    }

    pub fn detach_node(&self, node_id: &str) -> Option<AnchorOffset> {
        let mut nodes = lock(&self.nodes);
        let index = nodes.iter().position(|(id, _)| id == node_id)?;
        Some(nodes.remove(index).1)
    }

    pub fn attached_nodes(&self) -> Vec<NodeId> {
        lock(&self.nodes).iter().map(|(id, _)| id.clone()).collect()
    }

    /// Anchor offset on the surface under a normalized screen point
    pub async fn find_anchor(
        &self,
        x: f32,
        y: f32,
        types: HitTestTypes,
    ) -> Result<Option<AnchorOffset>> {
        self.reality
            .find_anchor(x, y, self.display.handle(), types)
            .await
    }

    pub async fn find_floor_anchor(&self, uid: Option<AnchorId>) -> Result<Option<AnchorOffset>> {
        self.reality
            .find_floor_anchor(self.display.handle(), uid)
            .await
    }

    /// Anchor at `position`/`orientation` in `coordinate_system`, stored
    /// relative to the tracker
    pub fn add_anchor(
        &self,
        coordinate_system: &CoordinateSystem,
        position: Vector3D,
        orientation: Quaternion,
    ) -> Result<AnchorId> {
        let tracker = self.display.coordinate_system(CoordinateSystemKind::Tracker);
        let to_tracker = coordinate_system
            .transform_to(&tracker)
            .ok_or(XrError::NonInvertibleMatrix)?;
        let relative = to_tracker * Matrix4::from_rotation_translation(orientation, position);

        let anchor = Anchor::new(
            CoordinateSystem::tracker(self.display.handle().clone(), relative),
            None,
        );
        Ok(self.reality.add_anchor(anchor))
    }

    pub fn remove_anchor(&self, uid: &str) {
        self.reality.remove_anchor(uid);
    }

    pub fn get_anchor(&self, uid: &str) -> Option<Anchor> {
        self.reality.get_anchor(uid)
    }

    pub fn anchors(&self) -> Vec<AnchorId> {
        self.reality.anchors().uids()
    }

    pub fn hit_test_no_anchor(&self, x: f32, y: f32) -> Result<Vec<PlaneHit>> {
        self.reality.hit_test_no_anchor(x, y)
    }

    pub fn light_estimate(&self) -> Option<f32> {
        self.reality.light_estimate()
    }

    /// First of `kinds` this session can resolve
    pub fn coordinate_system(&self, kinds: &[CoordinateSystemKind]) -> Option<CoordinateSystem> {
        kinds
            .first()
            .map(|kind| self.display.coordinate_system(*kind))
    }

    pub async fn create_image_anchor(
        &self,
        uid: &str,
        rgba: &[u8],
        width: u32,
        height: u32,
        physical_width: f32,
    ) -> Result<Value> {
        self.reality
            .create_image_anchor(uid, rgba, width, height, physical_width)
            .await
    }

    pub async fn activate_detection_image(&self, uid: &str) -> Result<Matrix4> {
        self.reality
            .activate_detection_image(uid, self.display.handle())
            .await
    }
}
