//! Output surfaces that source the device pose every frame
//!
//! Two displays are provided:
//! - [`FlatDisplay`] for handsets showing a single magic-window view
//! - [`HeadMountedDisplay`] for stereo headsets

mod clock;
mod flat;
mod head_mounted;
mod orientation;
mod pose;
mod state;
mod view;

pub use clock::{FrameClock, IntervalFrameClock, ManualFrameClock};
pub use flat::FlatDisplay;
pub use head_mounted::HeadMountedDisplay;
pub use orientation::{DeviceOrientationTracker, OrientationReading};
pub use pose::{BridgePoseSource, OrientationPoseSource, PoseSource, StereoPoseSource};
pub use state::{DisplayHandle, DisplayState};
pub use view::{Eye, FieldOfView, View, Viewport};

use crate::coordinate_system::{CoordinateSystem, CoordinateSystemKind};
use crate::error::Result;
use crate::reality::Reality;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::oneshot;
use xr_tracking_config::DisplayConfig;

/// What a session presents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    /// Content layered over a shared reality
    Augmentation,
    /// A private, fully rendered reality
    Reality,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionParameters {
    pub session_type: SessionType,
    pub exclusive: bool,
}

impl SessionParameters {
    pub fn augmentation() -> Self {
        Self {
            session_type: SessionType::Augmentation,
            exclusive: false,
        }
    }

    pub fn exclusive_reality() -> Self {
        Self {
            session_type: SessionType::Reality,
            exclusive: true,
        }
    }
}

/// Display notifications
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayEvent {
    /// No pose backend could be selected; the display runs untracked
    BackendUnavailable { display: String, reason: String },
    PoseSourceSelected { display: String, source: String },
}

/// Fresh display state with one view per eye
pub(crate) fn initial_state(config: &DisplayConfig, eyes: &[Eye]) -> DisplayState {
    let fov = FieldOfView::symmetric(config.fov_y_degrees);
    let views = eyes
        .iter()
        .map(|eye| View::new(fov, config.depth_near, config.depth_far, *eye))
        .collect();
    DisplayState::new(views, fov, config.depth_near, config.depth_far)
}

/// A way of presenting a reality on some hardware
#[async_trait]
pub trait Display: Send + Sync {
    fn name(&self) -> &str;

    /// True when the display is a separate device from the host screen
    fn is_external(&self) -> bool;

    /// Live pose state shared with coordinate systems
    fn handle(&self) -> &DisplayHandle;

    /// Reality currently shown
    fn reality(&self) -> Arc<dyn Reality>;

    fn set_reality(&self, reality: Arc<dyn Reality>);

    fn supports_session(&self, parameters: &SessionParameters) -> bool;

    /// Select the pose backend and start the reality
    async fn start(&self) -> Result<()>;

    /// Stop the reality; idempotent
    async fn stop(&self) -> Result<()>;

    /// Pull the latest backend pose into [`Display::handle`]
    fn handle_new_frame(&self, timestamp: f64);

    /// Runs after the application callback for displays that must submit
    fn handle_after_frame(&self, _timestamp: f64) {}

    /// Host surface changed size; `focal_length` is the camera's, in pixels
    fn handle_window_resize(&self, _width: f32, _height: f32, _focal_length: Option<f32>) {}

    /// Resolves with the next frame's timestamp
    fn request_frame(&self) -> oneshot::Receiver<f64>;

    fn subscribe(&self) -> UnboundedReceiver<DisplayEvent>;

    fn views(&self) -> Vec<View> {
        self.handle().views()
    }

    fn coordinate_system(&self, kind: CoordinateSystemKind) -> CoordinateSystem {
        CoordinateSystem::new(kind, self.handle().clone())
    }
}
