//! Head orientation from device-orientation sensor readings

use crate::shared::lock;
use crate::spatial::{Quaternion, Vector3D};
use serde::{Deserialize, Serialize};
use std::f32::consts::FRAC_PI_2;
use std::sync::Mutex;

/// One `deviceorientation` sample, angles in degrees
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct OrientationReading {
    /// Rotation about the vertical axis
    pub alpha: f32,
    /// Front-to-back tilt
    pub beta: f32,
    /// Left-to-right tilt
    pub gamma: f32,
}

#[derive(Debug, Default)]
struct TrackerState {
    reading: Option<OrientationReading>,
    /// Screen rotation in degrees
    window_orientation: f32,
}

/// Latest device orientation, queried once per frame
#[derive(Debug, Default)]
pub struct DeviceOrientationTracker {
    state: Mutex<TrackerState>,
}

impl DeviceOrientationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_reading(&self, reading: OrientationReading) {
        lock(&self.state).reading = Some(reading);
    }

    pub fn set_window_orientation(&self, degrees: f32) {
        lock(&self.state).window_orientation = degrees;
    }

    pub fn has_reading(&self) -> bool {
        lock(&self.state).reading.is_some()
    }

    /// Head orientation for the latest reading, `None` before the first one
    pub fn orientation(&self) -> Option<Quaternion> {
        let state = lock(&self.state);
        let reading = state.reading?;

        let device = Quaternion::from_euler_yxz(
            reading.beta.to_radians(),
            reading.alpha.to_radians(),
            -reading.gamma.to_radians(),
        );
        // sensors report the screen facing up; the camera looks out the back
        let camera = Quaternion::from_axis_angle(Vector3D::RIGHT, -FRAC_PI_2);
        let screen =
            Quaternion::from_axis_angle(Vector3D::BACK, -state.window_orientation.to_radians());

        Some(device * camera * screen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_reading_no_orientation() {
        let tracker = DeviceOrientationTracker::new();
        assert!(tracker.orientation().is_none());
        assert!(!tracker.has_reading());
    }

    #[test]
    fn test_upright_phone_looks_forward() {
        let tracker = DeviceOrientationTracker::new();
        tracker.push_reading(OrientationReading {
            alpha: 0.0,
            beta: 90.0,
            gamma: 0.0,
        });

        let forward = tracker
            .orientation()
            .unwrap()
            .rotate_vector(Vector3D::new(0.0, 0.0, -1.0));
        assert!(forward.x.abs() < 0.0001);
        assert!(forward.y.abs() < 0.0001);
        assert!((forward.z + 1.0).abs() < 0.0001);
    }

    #[test]
    fn test_flat_phone_looks_down() {
        let tracker = DeviceOrientationTracker::new();
        tracker.push_reading(OrientationReading::default());

        let forward = tracker
            .orientation()
            .unwrap()
            .rotate_vector(Vector3D::new(0.0, 0.0, -1.0));
        assert!((forward.y + 1.0).abs() < 0.0001);
    }

    #[test]
    fn test_landscape_rolls_about_view_axis() {
        let tracker = DeviceOrientationTracker::new();
        tracker.push_reading(OrientationReading {
            alpha: 0.0,
            beta: 90.0,
            gamma: 0.0,
        });
        tracker.set_window_orientation(90.0);

        let orientation = tracker.orientation().unwrap();
        let forward = orientation.rotate_vector(Vector3D::new(0.0, 0.0, -1.0));
        let up = orientation.rotate_vector(Vector3D::UP);
        assert!((forward.z + 1.0).abs() < 0.0001);
        assert!(up.y.abs() < 0.0001);
    }
}
