//! Tracking backends that own anchors
//!
//! A [`Reality`] is assembled from capability traits: [`HitTester`] for
//! placing content on detected surfaces and [`LightEstimator`] for the
//! ambient light level.

mod camera;
mod virtual_reality;

pub use camera::CameraReality;
pub use virtual_reality::VirtualReality;

use crate::anchor::{Anchor, AnchorId, AnchorOffset, AnchorRegistry};
use crate::bridge::{HitTestTypes, LifecycleEvent, PlaneHit, TrackingState};
use crate::display::DisplayHandle;
use crate::error::{Result, XrError};
use crate::spatial::Matrix4;
use crate::video::VideoFrame;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

/// Notifications a reality raises while processing a frame
#[derive(Debug, Clone, PartialEq)]
pub enum RealityEvent {
    AnchorAdded(AnchorId),
    AnchorUpdated(AnchorId),
    AnchorRemoved(AnchorId),
    TrackingChanged(TrackingState),
    BackendError {
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

/// Surface hit testing
#[async_trait]
pub trait HitTester: Send + Sync {
    /// Anchor offset at the surface under a normalized screen point.
    /// `Ok(None)` is a miss.
    async fn find_anchor(
        &self,
        x: f32,
        y: f32,
        display: &DisplayHandle,
        types: HitTestTypes,
    ) -> Result<Option<AnchorOffset>>;

    /// Anchor offset on the floor below the current head pose, when the
    /// floor is known
    async fn find_floor_anchor(
        &self,
        display: &DisplayHandle,
        uid: Option<AnchorId>,
    ) -> Result<Option<AnchorOffset>>;

    /// Raw plane hits without creating anchors
    fn hit_test_no_anchor(&self, _x: f32, _y: f32) -> Result<Vec<PlaneHit>> {
        Ok(Vec::new())
    }
}

/// Ambient light sensing
pub trait LightEstimator: Send + Sync {
    /// Ambient intensity where 1.0 is neutral; `None` without a sensor
    fn light_estimate(&self) -> Option<f32> {
        None
    }
}

/// A view of the world with its own anchors
#[async_trait]
pub trait Reality: HitTester + LightEstimator {
    fn name(&self) -> &str;

    /// Shared realities may back several sessions at once
    fn is_shared(&self) -> bool;

    /// Whether the physical world shows through
    fn is_passthrough(&self) -> bool;

    fn anchors(&self) -> &AnchorRegistry;

    fn subscribe(&self) -> UnboundedReceiver<RealityEvent>;

    /// Called when a session starts using this reality
    async fn start(&self) -> Result<()>;

    /// Called when a session stops using this reality
    async fn stop(&self) -> Result<()>;

    /// Fold backend updates into the anchor registry. This is the one point
    /// per frame where backend state is written.
    fn handle_new_frame(&self, display: &DisplayHandle, timestamp: f64);

    /// Register an anchor and return its uid
    fn add_anchor(&self, anchor: Anchor) -> AnchorId;

    fn get_anchor(&self, uid: &str) -> Option<Anchor> {
        self.anchors().get(uid)
    }

    /// Idempotent
    fn remove_anchor(&self, uid: &str);

    /// Frame timestamp as seen by this backend
    fn timestamp(&self, frame_timestamp: f64) -> f64 {
        frame_timestamp
    }

    async fn create_image_anchor(
        &self,
        _uid: &str,
        _rgba: &[u8],
        _width: u32,
        _height: u32,
        _physical_width: f32,
    ) -> Result<Value> {
        Err(XrError::Unsupported(format!(
            "{} reality has no image detection",
            self.name()
        )))
    }

    /// Resolves with the detected image's transform
    async fn activate_detection_image(
        &self,
        _uid: &str,
        _display: &DisplayHandle,
    ) -> Result<Matrix4> {
        Err(XrError::Unsupported(format!(
            "{} reality has no image detection",
            self.name()
        )))
    }

    /// Frames produced by this reality. Each subscriber sees every frame.
    fn video_frames(&self) -> Option<UnboundedReceiver<Arc<VideoFrame>>> {
        None
    }

    fn start_video_frames(&self) -> Result<()> {
        Ok(())
    }

    fn stop_video_frames(&self) -> Result<()> {
        Ok(())
    }

    fn request_video_frame(&self) -> Result<()> {
        Ok(())
    }
}
