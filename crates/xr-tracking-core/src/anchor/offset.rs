//! Poses expressed relative to an anchor

use super::AnchorId;
use crate::coordinate_system::CoordinateSystem;
use crate::spatial::{Matrix4, Quaternion, Vector3D};
use serde::{Deserialize, Serialize};

/// A pose relative to an anchor, referenced by uid only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorOffset {
    pub anchor_uid: AnchorId,
    pub pose_matrix: Matrix4,
}

impl AnchorOffset {
    pub fn identity(anchor_uid: impl Into<AnchorId>) -> Self {
        Self::from_pose(anchor_uid, Matrix4::IDENTITY)
    }

    pub fn from_pose(anchor_uid: impl Into<AnchorId>, pose_matrix: Matrix4) -> Self {
        Self {
            anchor_uid: anchor_uid.into(),
            pose_matrix,
        }
    }

    pub fn set_identity_offset(&mut self) {
        self.pose_matrix = Matrix4::IDENTITY;
    }

    pub fn position(&self) -> Vector3D {
        self.pose_matrix.position()
    }

    pub fn orientation(&self) -> Quaternion {
        self.pose_matrix.rotation()
    }

    /// Offset pose composed with the resolved pose of `coordinate_system`
    pub fn offset_transform(&self, coordinate_system: &CoordinateSystem) -> Matrix4 {
        self.pose_matrix * coordinate_system.pose_model_matrix()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::{DisplayHandle, DisplayState, FieldOfView};

    fn tracker(relative: Matrix4) -> CoordinateSystem {
        let display = DisplayHandle::new(DisplayState::new(
            Vec::new(),
            FieldOfView::symmetric(70.0),
            0.1,
            1000.0,
        ));
        CoordinateSystem::tracker(display, relative)
    }

    #[test]
    fn test_offset_against_identity_frame_is_unchanged() {
        let pose = Matrix4::from_rotation_translation(
            Quaternion::from_axis_angle(Vector3D::UP, 0.5),
            Vector3D::new(1.0, 0.0, -2.0),
        );
        let offset = AnchorOffset::from_pose("anchor-1", pose);

        let resolved = offset.offset_transform(&tracker(Matrix4::IDENTITY));
        assert!(resolved.approx_eq(&pose, 0.0001));
    }

    #[test]
    fn test_identity_offset_follows_anchor() {
        let anchor_pose = Matrix4::from_translation(Vector3D::new(0.0, 0.0, -3.0));
        let offset = AnchorOffset::identity("anchor-2");

        let resolved = offset.offset_transform(&tracker(anchor_pose));
        assert!(resolved.approx_eq(&anchor_pose, 0.0001));
    }

    #[test]
    fn test_position_and_reset() {
        let mut offset =
            AnchorOffset::from_pose("a", Matrix4::from_translation(Vector3D::new(1.0, 2.0, 3.0)));
        assert!((offset.position().y - 2.0).abs() < 0.0001);

        offset.set_identity_offset();
        assert_eq!(offset.pose_matrix, Matrix4::IDENTITY);
        assert!((offset.orientation().w - 1.0).abs() < 0.0001);
    }
}
