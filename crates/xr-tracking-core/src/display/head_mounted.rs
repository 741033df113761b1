//! Stereo headset display

use super::clock::FrameClock;
use super::view::Eye;
use super::{initial_state, Display, DisplayEvent, DisplayHandle, SessionParameters, SessionType};
use crate::error::Result;
use crate::reality::Reality;
use crate::shared::{lock, read, write, EventHub};
use crate::spatial::Matrix4;
use crate::stereo::{DevicePose, StereoDevice};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::oneshot;
use tracing::info;
use xr_tracking_config::DisplayConfig;

/// Left and right views fed from a stereo device while it presents
pub struct HeadMountedDisplay {
    name: String,
    handle: DisplayHandle,
    reality: RwLock<Arc<dyn Reality>>,
    device: Arc<dyn StereoDevice>,
    pose: Mutex<DevicePose>,
    running: AtomicBool,
    clock: Arc<dyn FrameClock>,
    events: EventHub<DisplayEvent>,
}

impl HeadMountedDisplay {
    pub fn new(
        device: Arc<dyn StereoDevice>,
        reality: Arc<dyn Reality>,
        clock: Arc<dyn FrameClock>,
    ) -> Self {
        Self {
            name: device.display_name(),
            handle: DisplayHandle::new(initial_state(
                &DisplayConfig::default(),
                &[Eye::Left, Eye::Right],
            )),
            reality: RwLock::new(reality),
            device,
            pose: Mutex::new(DevicePose::default()),
            running: AtomicBool::new(false),
            clock,
            events: EventHub::new(),
        }
    }

    pub fn with_config(mut self, config: &DisplayConfig) -> Self {
        self.handle = DisplayHandle::new(initial_state(config, &[Eye::Left, Eye::Right]));
        self
    }

    pub fn device(&self) -> &Arc<dyn StereoDevice> {
        &self.device
    }

    fn update_from_device(&self) {
        let Some(frame) = self.device.frame_data() else {
            return;
        };
        let sitting_to_standing = self.device.sitting_to_standing();

        let poses = frame.pose.map(|sample| {
            let mut pose = lock(&self.pose);
            pose.apply(&sample);
            (
                pose.world_matrix(sitting_to_standing),
                Matrix4::from_translation(pose.position),
            )
        });

        self.handle.update(|state| {
            for view in state.views.iter_mut() {
                let (view_matrix, projection_matrix) = match view.eye {
                    Eye::Right => (frame.right_view_matrix, frame.right_projection_matrix),
                    _ => (frame.left_view_matrix, frame.left_projection_matrix),
                };
                view.view_matrix = view_matrix;
                view.projection_matrix = projection_matrix;
            }
            if let Some((head, eye_level)) = poses {
                state.head_pose = head;
                state.eye_level_pose = eye_level;
            }
        });
    }
}

#[async_trait]
impl Display for HeadMountedDisplay {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_external(&self) -> bool {
        self.device.is_external()
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
        parameters.session_type == SessionType::Reality && parameters.exclusive
    }

    async fn start(&self) -> Result<()> {
        if !self.running.swap(true, Ordering::SeqCst) {
            info!("Head mounted display {} started", self.name);
            self.events.emit(DisplayEvent::PoseSourceSelected {
                display: self.name.clone(),
                source: "stereo-device".to_string(),
            });
        }
        self.reality().start().await
    }

    async fn stop(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.reality().stop().await
    }

    fn handle_new_frame(&self, _timestamp: f64) {
        if self.device.is_presenting() {
            self.update_from_device();
        }
    }

    fn handle_after_frame(&self, _timestamp: f64) {
        if self.device.is_presenting() {
            self.device.submit_frame();
        }
    }

    fn request_frame(&self) -> oneshot::Receiver<f64> {
        self.clock.request_frame()
    }

    fn subscribe(&self) -> UnboundedReceiver<DisplayEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::ManualFrameClock;
    use crate::reality::VirtualReality;
    use crate::spatial::Vector3D;
    use crate::stereo::{StereoFrameData, StereoPose};
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Headset {
        presenting: AtomicBool,
        submitted: AtomicUsize,
    }

    impl StereoDevice for Headset {
        fn display_name(&self) -> String {
            "Test Headset".to_string()
        }

        fn is_external(&self) -> bool {
            true
        }

        fn is_presenting(&self) -> bool {
            self.presenting.load(Ordering::SeqCst)
        }

        fn frame_data(&self) -> Option<StereoFrameData> {
            Some(StereoFrameData {
                left_view_matrix: Matrix4::from_translation(Vector3D::new(-0.03, 0.0, 0.0)),
                right_view_matrix: Matrix4::from_translation(Vector3D::new(0.03, 0.0, 0.0)),
                left_projection_matrix: Matrix4::IDENTITY,
                right_projection_matrix: Matrix4::IDENTITY,
                pose: Some(StereoPose {
                    orientation: Some([0.0, 0.0, 0.0, 1.0]),
                    position: Some([0.0, 0.2, 0.0]),
                }),
            })
        }

        fn sitting_to_standing(&self) -> Option<Matrix4> {
            Some(Matrix4::from_translation(Vector3D::new(0.0, 1.4, 0.0)))
        }

        fn submit_frame(&self) {
            self.submitted.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn display(device: Arc<Headset>) -> HeadMountedDisplay {
        HeadMountedDisplay::new(
            device,
            Arc::new(VirtualReality::new()),
            Arc::new(ManualFrameClock::new()),
        )
    }

    #[test]
    fn test_views_follow_device_while_presenting() {
        let device = Arc::new(Headset::default());
        let display = display(device.clone());

        display.handle_new_frame(0.0);
        assert!(display.handle().head_pose().approx_eq(&Matrix4::IDENTITY, 0.0001));

        device.presenting.store(true, Ordering::SeqCst);
        display.handle_new_frame(1.0);

        let views = display.views();
        assert!((views[0].view_matrix.position().x + 0.03).abs() < 0.0001);
        assert!((views[1].view_matrix.position().x - 0.03).abs() < 0.0001);
        assert!((display.handle().head_pose().position().y - 1.6).abs() < 0.0001);
        assert!((display.handle().eye_level_pose().position().y - 0.2).abs() < 0.0001);
    }

    #[test]
    fn test_submits_only_while_presenting() {
        let device = Arc::new(Headset::default());
        let display = display(device.clone());

        display.handle_after_frame(0.0);
        device.presenting.store(true, Ordering::SeqCst);
        display.handle_after_frame(1.0);

        assert_eq!(device.submitted.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_supports_exclusive_reality() {
        let display = display(Arc::new(Headset::default()));
        assert_eq!(display.name(), "Test Headset");
        assert!(display.is_external());
        assert!(display.supports_session(&SessionParameters::exclusive_reality()));
        assert!(!display.supports_session(&SessionParameters::augmentation()));
    }
}
