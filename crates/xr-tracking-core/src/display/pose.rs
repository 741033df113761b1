//! Per-frame pose sources for single-view displays

use super::orientation::DeviceOrientationTracker;
use super::state::DisplayState;
use crate::bridge::NativeBridge;
use crate::shared::lock;
use crate::spatial::Matrix4;
use crate::stereo::{DevicePose, StereoDevice};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Writes the latest backend pose into a display's state
pub trait PoseSource: Send + Sync {
    fn name(&self) -> &str;

    /// Called once at the start of every frame
    fn write_pose(&self, state: &mut DisplayState);
}

/// Head pose and the single view follow `world`; eye level keeps only the
/// position
fn apply_head(state: &mut DisplayState, world: Matrix4) {
    state.head_pose = world;
    state.eye_level_pose = Matrix4::from_translation(world.position());
    if let Some(view) = state.views.first_mut() {
        view.view_matrix = world;
    }
}

/// Orientation-only tracking; the head stays where it was
pub struct OrientationPoseSource {
    tracker: Arc<DeviceOrientationTracker>,
}

impl OrientationPoseSource {
    pub fn new(tracker: Arc<DeviceOrientationTracker>) -> Self {
        Self { tracker }
    }
}

impl PoseSource for OrientationPoseSource {
    fn name(&self) -> &str {
        "device-orientation"
    }

    fn write_pose(&self, state: &mut DisplayState) {
        let Some(orientation) = self.tracker.orientation() else {
            return;
        };
        let position = state.head_pose.position();
        apply_head(
            state,
            Matrix4::from_rotation_translation(orientation, position),
        );
    }
}

/// Camera pose streamed by the native bridge
pub struct BridgePoseSource {
    bridge: Arc<NativeBridge>,
}

impl BridgePoseSource {
    pub fn new(bridge: Arc<NativeBridge>) -> Self {
        Self { bridge }
    }
}

impl PoseSource for BridgePoseSource {
    fn name(&self) -> &str {
        "native-bridge"
    }

    fn write_pose(&self, state: &mut DisplayState) {
        let Some(data) = self.bridge.latest_watch() else {
            return;
        };

        match data.camera_transform {
            Some(transform) => apply_head(state, transform),
            None => debug!("Watch data carried no camera transform"),
        }
        match (data.projection_camera, state.views.first_mut()) {
            (Some(projection), Some(view)) => view.projection_matrix = projection,
            (None, _) => debug!("Watch data carried no camera projection"),
            _ => {}
        }
    }
}

/// Mono use of a stereo device: the left projection drives the only view
pub struct StereoPoseSource {
    device: Arc<dyn StereoDevice>,
    pose: Mutex<DevicePose>,
}

impl StereoPoseSource {
    pub fn new(device: Arc<dyn StereoDevice>) -> Self {
        Self {
            device,
            pose: Mutex::new(DevicePose::default()),
        }
    }
}

impl PoseSource for StereoPoseSource {
    fn name(&self) -> &str {
        "stereo-device"
    }

    fn write_pose(&self, state: &mut DisplayState) {
        let Some(frame) = self.device.frame_data() else {
            return;
        };
        if let Some(view) = state.views.first_mut() {
            view.projection_matrix = frame.left_projection_matrix;
        }

        let world = {
            let mut pose = lock(&self.pose);
            if let Some(sample) = &frame.pose {
                pose.apply(sample);
            }
            pose.world_matrix(None)
        };
        apply_head(state, world);
    }
}
