//! Platform stereo-display backends (headsets and camera-passthrough phones)

use crate::spatial::{Matrix4, Quaternion, Vector3D};
use serde::{Deserialize, Serialize};

/// Sensor state at one instant. Either component may be missing when the
/// sensor cannot provide it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StereoPose {
    pub orientation: Option<[f32; 4]>,
    pub position: Option<[f32; 3]>,
}

/// Per-frame output of a stereo device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StereoFrameData {
    pub left_view_matrix: Matrix4,
    pub right_view_matrix: Matrix4,
    pub left_projection_matrix: Matrix4,
    pub right_projection_matrix: Matrix4,
    pub pose: Option<StereoPose>,
}

/// A hit reported by the device's own hit-test extension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StereoHit {
    pub model_matrix: Matrix4,
    #[serde(default)]
    pub distance: f32,
    #[serde(default)]
    pub uuid: Option<String>,
}

/// Device pose held between frames; components the sensor omits keep their
/// previous value
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DevicePose {
    pub orientation: Quaternion,
    pub position: Vector3D,
}

impl Default for DevicePose {
    fn default() -> Self {
        Self {
            orientation: Quaternion::IDENTITY,
            position: Vector3D::ZERO,
        }
    }
}

impl DevicePose {
    pub fn apply(&mut self, pose: &StereoPose) {
        if let Some(orientation) = pose.orientation {
            self.orientation = Quaternion::from_array(orientation);
        }
        if let Some(position) = pose.position {
            self.position = Vector3D::from_array(position);
        }
    }

    /// World matrix, lifted to standing height when the device reports a
    /// sitting-to-standing transform
    pub fn world_matrix(&self, sitting_to_standing: Option<Matrix4>) -> Matrix4 {
        let world = Matrix4::from_rotation_translation(self.orientation, self.position);
        match sitting_to_standing {
            Some(transform) => transform * world,
            None => world,
        }
    }
}

/// Hardware backend exposing stereo frame data
pub trait StereoDevice: Send + Sync {
    fn display_name(&self) -> String;

    /// True for headsets with their own screen
    fn is_external(&self) -> bool;

    fn is_presenting(&self) -> bool;

    fn frame_data(&self) -> Option<StereoFrameData>;

    fn sitting_to_standing(&self) -> Option<Matrix4> {
        None
    }

    /// Hits at a normalized screen point; empty when unsupported
    fn hit_test(&self, _x: f32, _y: f32) -> Vec<StereoHit> {
        Vec::new()
    }

    fn submit_frame(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_components_keep_previous_values() {
        let mut pose = DevicePose::default();
        pose.apply(&StereoPose {
            orientation: None,
            position: Some([0.0, 1.2, 0.0]),
        });
        pose.apply(&StereoPose {
            orientation: Some([0.0, 0.0, 0.0, 1.0]),
            position: None,
        });
        assert!((pose.position.y - 1.2).abs() < 0.0001);
    }

    #[test]
    fn test_sitting_to_standing_lifts_pose() {
        let pose = DevicePose {
            orientation: Quaternion::IDENTITY,
            position: Vector3D::new(0.0, 0.4, 0.0),
        };
        let lift = Matrix4::from_translation(Vector3D::new(0.0, 1.2, 0.0));
        let world = pose.world_matrix(Some(lift));
        assert!((world.position().y - 1.6).abs() < 0.0001);
        assert!((pose.world_matrix(None).position().y - 0.4).abs() < 0.0001);
    }
}
