//! Entry point that wires injected backends into displays and sessions

use crate::bridge::NativeBridge;
use crate::display::{
    DeviceOrientationTracker, Display, FlatDisplay, FrameClock, HeadMountedDisplay,
    IntervalFrameClock, SessionParameters,
};
use crate::error::{Result, XrError};
use crate::reality::{CameraReality, Reality, VirtualReality};
use crate::session::Session;
use crate::stereo::StereoDevice;
use crate::video::VideoSource;
use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};
use xr_tracking_config::TrackingConfig;

/// Builder for [`XrRuntime`]. Every backend is optional; a flat display is
/// always available.
pub struct XrRuntimeBuilder {
    config: TrackingConfig,
    bridge: Option<Arc<NativeBridge>>,
    stereo: Option<Arc<dyn StereoDevice>>,
    orientation: Option<Arc<DeviceOrientationTracker>>,
    video_source: Option<Arc<dyn VideoSource>>,
    clock: Option<Arc<dyn FrameClock>>,
}

impl XrRuntimeBuilder {
    pub fn with_bridge(mut self, bridge: Arc<NativeBridge>) -> Self {
        self.bridge = Some(bridge);
        self
    }

    pub fn with_stereo_device(mut self, device: Arc<dyn StereoDevice>) -> Self {
        self.stereo = Some(device);
        self
    }

    pub fn with_orientation_tracker(mut self, tracker: Arc<DeviceOrientationTracker>) -> Self {
        self.orientation = Some(tracker);
        self
    }

    pub fn with_video_source(mut self, source: Arc<dyn VideoSource>) -> Self {
        self.video_source = Some(source);
        self
    }

    /// Defaults to an [`IntervalFrameClock`] at the configured refresh rate
    pub fn with_frame_clock(mut self, clock: Arc<dyn FrameClock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> XrRuntime {
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(IntervalFrameClock::from(&self.config.frame)));

        let mut camera_reality = CameraReality::new().with_config(&self.config);
        if let Some(bridge) = &self.bridge {
            camera_reality = camera_reality.with_bridge(bridge.clone());
        }
        if let Some(device) = &self.stereo {
            camera_reality = camera_reality.with_stereo_device(device.clone());
        }
        if let Some(source) = &self.video_source {
            camera_reality = camera_reality.with_video_source(source.clone());
        }
        let camera_reality = Arc::new(camera_reality);

        let mut flat = FlatDisplay::new(camera_reality.clone(), clock.clone())
            .with_config(&self.config.display);
        if let Some(bridge) = &self.bridge {
            flat = flat.with_bridge(bridge.clone());
        }
        if let Some(tracker) = &self.orientation {
            flat = flat.with_orientation_tracker(tracker.clone());
        }

        let mut displays: Vec<Arc<dyn Display>> = Vec::new();
        match &self.stereo {
            // external headsets get their own display; handsets feed the flat one
            Some(device) if device.is_external() => {
                let headset = HeadMountedDisplay::new(
                    device.clone(),
                    Arc::new(VirtualReality::new()),
                    clock.clone(),
                )
                .with_config(&self.config.display);
                displays.push(Arc::new(headset));
            }
            Some(device) => flat = flat.with_stereo_device(device.clone()),
            None => {}
        }
        displays.insert(0, Arc::new(flat));

        info!(
            "Tracking runtime ready with displays: {}",
            displays
                .iter()
                .map(|candidate| candidate.name())
                .collect::<Vec<_>>()
                .join(", ")
        );

        XrRuntime {
            config: self.config,
            camera_reality,
            displays,
        }
    }
}

pub struct XrRuntime {
    config: TrackingConfig,
    camera_reality: Arc<CameraReality>,
    displays: Vec<Arc<dyn Display>>,
}

impl XrRuntime {
    pub fn builder(config: TrackingConfig) -> XrRuntimeBuilder {
        XrRuntimeBuilder {
            config,
            bridge: None,
            stereo: None,
            orientation: None,
            video_source: None,
            clock: None,
        }
    }

    /// Builder with configuration loaded from `path`, the environment or
    /// the user config directory
    pub fn from_config_path(path: Option<&Path>) -> Result<XrRuntimeBuilder> {
        let config = TrackingConfig::load(path).context("Failed to load tracking config")?;
        Ok(Self::builder(config))
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    pub fn displays(&self) -> &[Arc<dyn Display>] {
        &self.displays
    }

    /// Reality shared by every augmentation session
    pub fn camera_reality(&self) -> Arc<dyn Reality> {
        self.camera_reality.clone()
    }

    /// Start a session on the first display accepting `parameters`
    pub async fn request_session(&self, parameters: SessionParameters) -> Result<Session> {
        let target = self
            .displays
            .iter()
            .find(|candidate| candidate.supports_session(&parameters))
            .cloned()
            .ok_or_else(|| {
                XrError::NoCompatibleBackend(format!("no display supports {:?}", parameters))
            })?;

        debug!("Requesting {:?} session on {}", parameters, target.name());
        Session::start(target, parameters, self.config.session.clone()).await
    }
}
