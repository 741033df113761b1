//! Named frames of reference resolved against a display's live pose

use crate::display::DisplayHandle;
use crate::spatial::Matrix4;
use serde::{Deserialize, Serialize};

/// The three frames a display can resolve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinateSystemKind {
    /// Follows the head pose
    HeadModel,
    /// Head position at standing eye level, gravity aligned
    EyeLevel,
    /// Fixed relative to the tracker origin
    Tracker,
}

/// A frame of reference owned by one display.
///
/// Nothing is cached: every resolve reads the display's current pose.
#[derive(Debug, Clone)]
pub struct CoordinateSystem {
    kind: CoordinateSystemKind,
    relative_matrix: Matrix4,
    display: DisplayHandle,
}

impl CoordinateSystem {
    pub fn new(kind: CoordinateSystemKind, display: DisplayHandle) -> Self {
        Self {
            kind,
            relative_matrix: Matrix4::IDENTITY,
            display,
        }
    }

    /// Tracker-relative frame placed at `relative_matrix`
    pub fn tracker(display: DisplayHandle, relative_matrix: Matrix4) -> Self {
        Self {
            kind: CoordinateSystemKind::Tracker,
            relative_matrix,
            display,
        }
    }

    pub fn kind(&self) -> CoordinateSystemKind {
        self.kind
    }

    pub fn relative_matrix(&self) -> Matrix4 {
        self.relative_matrix
    }

    pub fn set_relative_matrix(&mut self, relative_matrix: Matrix4) {
        self.relative_matrix = relative_matrix;
    }

    pub fn display(&self) -> &DisplayHandle {
        &self.display
    }

    /// Current pose of this frame in world space
    pub fn pose_model_matrix(&self) -> Matrix4 {
        match self.kind {
            CoordinateSystemKind::HeadModel => self.display.head_pose(),
            CoordinateSystemKind::EyeLevel => self.display.eye_level_pose(),
            CoordinateSystemKind::Tracker => self.relative_matrix * self.display.tracker_pose(),
        }
    }

    /// Matrix mapping this frame into `other`'s frame (`other⁻¹ × self`)
    pub fn transform_to(&self, other: &CoordinateSystem) -> Option<Matrix4> {
        let other_inverse = other.pose_model_matrix().invert()?;
        Some(other_inverse * self.pose_model_matrix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::{DisplayState, FieldOfView};
    use crate::spatial::{Quaternion, Vector3D};

    fn handle() -> DisplayHandle {
        DisplayHandle::new(DisplayState::new(
            Vec::new(),
            FieldOfView::symmetric(70.0),
            0.1,
            1000.0,
        ))
    }

    #[test]
    fn test_resolves_live_head_pose() {
        let display = handle();
        let head = CoordinateSystem::new(CoordinateSystemKind::HeadModel, display.clone());
        assert!(head.pose_model_matrix().approx_eq(&Matrix4::IDENTITY, 0.0001));

        display.update(|state| {
            state.head_pose = Matrix4::from_translation(Vector3D::new(0.0, 1.6, 0.0));
        });

        assert!((head.pose_model_matrix().position().y - 1.6).abs() < 0.0001);
    }

    #[test]
    fn test_tracker_uses_relative_matrix() {
        let display = handle();
        let relative = Matrix4::from_translation(Vector3D::new(2.0, 0.0, -1.0));
        let tracker = CoordinateSystem::tracker(display, relative);
        assert!(tracker.pose_model_matrix().approx_eq(&relative, 0.0001));
    }

    #[test]
    fn test_transform_to_self_is_identity() {
        let display = handle();
        display.update(|state| {
            state.head_pose = Matrix4::from_rotation_translation(
                Quaternion::from_axis_angle(Vector3D::UP, 0.7),
                Vector3D::new(0.3, 1.5, 2.0),
            );
        });
        let head = CoordinateSystem::new(CoordinateSystemKind::HeadModel, display);
        let m = head.transform_to(&head).unwrap();
        assert!(m.approx_eq(&Matrix4::IDENTITY, 0.0001));
    }

    #[test]
    fn test_transform_between_frames() {
        let display = handle();
        display.update(|state| {
            state.head_pose = Matrix4::from_translation(Vector3D::new(0.0, 1.6, 0.0));
        });
        let head = CoordinateSystem::new(CoordinateSystemKind::HeadModel, display.clone());
        let tracker = CoordinateSystem::tracker(display, Matrix4::IDENTITY);

        let m = head.transform_to(&tracker).unwrap();
        assert!((m.position().y - 1.6).abs() < 0.0001);
    }
}
