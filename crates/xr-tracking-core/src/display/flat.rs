//! Full-screen handset display presenting a magic window into a reality

use super::clock::FrameClock;
use super::orientation::DeviceOrientationTracker;
use super::pose::{BridgePoseSource, OrientationPoseSource, PoseSource, StereoPoseSource};
use super::view::{Eye, FieldOfView};
use super::{initial_state, Display, DisplayEvent, DisplayHandle, SessionParameters, SessionType};
use crate::bridge::NativeBridge;
use crate::error::Result;
use crate::reality::Reality;
use crate::shared::{lock, read, write, EventHub};
use crate::stereo::StereoDevice;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use xr_tracking_config::DisplayConfig;

const NAME: &str = "Flat";

/// Single centered view. The pose comes from the first available of: a
/// stereo device, the native bridge, device orientation sensors.
pub struct FlatDisplay {
    handle: DisplayHandle,
    reality: RwLock<Arc<dyn Reality>>,
    stereo: Option<Arc<dyn StereoDevice>>,
    bridge: Option<Arc<NativeBridge>>,
    orientation: Option<Arc<DeviceOrientationTracker>>,
    /// Chosen on first start, then fixed
    source: Mutex<Option<Arc<dyn PoseSource>>>,
    selected: AtomicBool,
    running: AtomicBool,
    clock: Arc<dyn FrameClock>,
    events: EventHub<DisplayEvent>,
    framebuffer: Mutex<Option<(f32, f32)>>,
}

impl FlatDisplay {
    pub fn new(reality: Arc<dyn Reality>, clock: Arc<dyn FrameClock>) -> Self {
        Self {
            handle: DisplayHandle::new(initial_state(&DisplayConfig::default(), &[Eye::None])),
            reality: RwLock::new(reality),
            stereo: None,
            bridge: None,
            orientation: None,
            source: Mutex::new(None),
            selected: AtomicBool::new(false),
            running: AtomicBool::new(false),
            clock,
            events: EventHub::new(),
            framebuffer: Mutex::new(None),
        }
    }

    pub fn with_config(mut self, config: &DisplayConfig) -> Self {
        self.handle = DisplayHandle::new(initial_state(config, &[Eye::None]));
        self
    }

    pub fn with_stereo_device(mut self, device: Arc<dyn StereoDevice>) -> Self {
        self.stereo = Some(device);
        self
    }

    pub fn with_bridge(mut self, bridge: Arc<NativeBridge>) -> Self {
        self.bridge = Some(bridge);
        self
    }

    pub fn with_orientation_tracker(mut self, tracker: Arc<DeviceOrientationTracker>) -> Self {
        self.orientation = Some(tracker);
        self
    }

    /// Name of the pose source in use, once started
    pub fn pose_source(&self) -> Option<String> {
        lock(&self.source)
            .as_ref()
            .map(|source| source.name().to_string())
    }

    pub fn set_framebuffer_size(&self, width: f32, height: f32) {
        *lock(&self.framebuffer) = Some((width, height));
    }

    pub fn framebuffer_size(&self) -> Option<(f32, f32)> {
        *lock(&self.framebuffer)
    }

    fn select_source(&self) -> Option<Arc<dyn PoseSource>> {
        if let Some(device) = &self.stereo {
            return Some(Arc::new(StereoPoseSource::new(device.clone())));
        }
        if let Some(bridge) = &self.bridge {
            return Some(Arc::new(BridgePoseSource::new(bridge.clone())));
        }
        self.orientation
            .as_ref()
            .map(|tracker| Arc::new(OrientationPoseSource::new(tracker.clone())) as Arc<dyn PoseSource>)
    }

    /// Refit the field of view to a camera with `focal_length` pixels at
    /// `width` x `height`, scaled onto the framebuffer
    pub fn fix_fov(&self, width: f32, height: f32, focal_length: f32) {
        let (framebuffer_width, framebuffer_height) =
            self.framebuffer_size().unwrap_or((width, height));
        if framebuffer_width <= 0.0 || focal_length <= 0.0 {
            return;
        }
        let focal_length = focal_length / (width / framebuffer_width);

        let fov_x = 2.0 * (0.5 * framebuffer_width / focal_length).atan().to_degrees();
        let fov_y = 2.0 * (0.5 * framebuffer_height / focal_length).atan().to_degrees();
        let fov = FieldOfView {
            up: fov_y / 2.0,
            down: fov_y / 2.0,
            left: fov_x / 2.0,
            right: fov_x / 2.0,
        };

        self.handle.update(|state| {
            state.fov = fov;
            let projection = fov.projection(state.depth_near, state.depth_far);
            if let Some(view) = state.views.first_mut() {
                view.projection_matrix = projection;
            }
        });
        debug!("Flat display fov refit to {:.1}x{:.1} degrees", fov_x, fov_y);
    }
}

#[async_trait]
impl Display for FlatDisplay {
    fn name(&self) -> &str {
        NAME
    }

    fn is_external(&self) -> bool {
        false
    }

    fn handle(&self) -> &DisplayHandle {
        &self.handle
    }

    fn reality(&self) -> Arc<dyn Reality> {
        read(&self.reality).clone()
    }

    fn set_reality(&self, reality: Arc<dyn Reality>) {
        *write(&self.reality) = reality;
    }

    fn supports_session(&self, parameters: &SessionParameters) -> bool {
        parameters.session_type == SessionType::Augmentation && !parameters.exclusive
    }

    async fn start(&self) -> Result<()> {
        if !self.selected.swap(true, Ordering::SeqCst) {
            match self.select_source() {
                Some(source) => {
                    info!("Flat display tracking with {}", source.name());
                    self.events.emit(DisplayEvent::PoseSourceSelected {
                        display: NAME.to_string(),
                        source: source.name().to_string(),
                    });
                    *lock(&self.source) = Some(source);
                }
                None => {
                    warn!("Flat display found no pose backend; running untracked");
                    self.events.emit(DisplayEvent::BackendUnavailable {
                        display: NAME.to_string(),
                        reason: "no stereo device, native bridge or orientation sensor".to_string(),
                    });
                }
            }
        }

        self.running.store(true, Ordering::SeqCst);
        self.reality().start().await
    }

    async fn stop(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.reality().stop().await
    }

    fn handle_new_frame(&self, _timestamp: f64) {
        let source = lock(&self.source).clone();
        if let Some(source) = source {
            self.handle.update(|state| source.write_pose(state));
        }
    }

    /// With a focal length the field of view is refit; otherwise the new
    /// size becomes the framebuffer size
    fn handle_window_resize(&self, width: f32, height: f32, focal_length: Option<f32>) {
        match focal_length {
            Some(focal_length) if focal_length > 0.0 => self.fix_fov(width, height, focal_length),
            _ => self.set_framebuffer_size(width, height),
        }
    }

    fn request_frame(&self) -> oneshot::Receiver<f64> {
        self.clock.request_frame()
    }

    fn subscribe(&self) -> UnboundedReceiver<DisplayEvent> {
        self.events.subscribe()
    }
}
