//! Backend-less reality for fully rendered scenes

use super::{HitTester, LightEstimator, Reality, RealityEvent};
use crate::anchor::{Anchor, AnchorId, AnchorOffset, AnchorRegistry};
use crate::bridge::HitTestTypes;
use crate::coordinate_system::CoordinateSystem;
use crate::display::DisplayHandle;
use crate::error::Result;
use crate::shared::EventHub;
use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;

/// Empty world; anchors hang in space and nothing is ever hit
#[derive(Debug, Default)]
pub struct VirtualReality {
    anchors: AnchorRegistry,
    events: EventHub<RealityEvent>,
}

impl VirtualReality {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HitTester for VirtualReality {
    async fn find_anchor(
        &self,
        _x: f32,
        _y: f32,
        _display: &DisplayHandle,
        _types: HitTestTypes,
    ) -> Result<Option<AnchorOffset>> {
        Ok(None)
    }

    /// Anchor at the head's position with the height zeroed
    async fn find_floor_anchor(
        &self,
        display: &DisplayHandle,
        uid: Option<AnchorId>,
    ) -> Result<Option<AnchorOffset>> {
        let mut floor = display.head_pose();
        floor.elements_mut()[13] = 0.0;

        let anchor = Anchor::new(CoordinateSystem::tracker(display.clone(), floor), uid);
        let uid = self.add_anchor(anchor);
        Ok(Some(AnchorOffset::identity(uid)))
    }
}

impl LightEstimator for VirtualReality {}

#[async_trait]
impl Reality for VirtualReality {
    fn name(&self) -> &str {
        "Virtual"
    }

    fn is_shared(&self) -> bool {
        false
    }

    fn is_passthrough(&self) -> bool {
        false
    }

    fn anchors(&self) -> &AnchorRegistry {
        &self.anchors
    }

    fn subscribe(&self) -> UnboundedReceiver<RealityEvent> {
        self.events.subscribe()
    }

    async fn start(&self) -> Result<()> {
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        Ok(())
    }

    fn handle_new_frame(&self, _display: &DisplayHandle, _timestamp: f64) {}

    fn add_anchor(&self, anchor: Anchor) -> AnchorId {
        let uid = self.anchors.insert(anchor);
        self.events.emit(RealityEvent::AnchorAdded(uid.clone()));
        uid
    }

    fn remove_anchor(&self, uid: &str) {
        if self.anchors.remove(uid).is_some() {
            self.events.emit(RealityEvent::AnchorRemoved(uid.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::{DisplayState, FieldOfView};
    use crate::spatial::{Matrix4, Quaternion, Vector3D};

    fn display() -> DisplayHandle {
        DisplayHandle::new(DisplayState::new(
            Vec::new(),
            FieldOfView::symmetric(70.0),
            0.1,
            1000.0,
        ))
    }

    #[tokio::test]
    async fn test_floor_anchor_drops_head_to_ground() {
        let reality = VirtualReality::new();
        let display = display();
        display.update(|state| {
            state.head_pose = Matrix4::from_rotation_translation(
                Quaternion::from_axis_angle(Vector3D::UP, 0.3),
                Vector3D::new(0.5, 1.6, -2.0),
            );
        });

        let offset = reality
            .find_floor_anchor(&display, None)
            .await
            .unwrap()
            .unwrap();
        let anchor = reality.get_anchor(&offset.anchor_uid).unwrap();
        let world = offset.offset_transform(anchor.coordinate_system());

        let position = world.position();
        assert!(position.y.abs() < 0.0001);
        assert!((position.x - 0.5).abs() < 0.0001);
        assert!((position.z + 2.0).abs() < 0.0001);
    }

    #[tokio::test]
    async fn test_floor_anchor_uses_given_uid() {
        let reality = VirtualReality::new();
        let offset = reality
            .find_floor_anchor(&display(), Some("floor".to_string()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(offset.anchor_uid, "floor");
    }

    #[tokio::test]
    async fn test_find_anchor_always_misses() {
        let reality = VirtualReality::new();
        let hit = reality
            .find_anchor(0.5, 0.5, &display(), HitTestTypes::ALL)
            .await
            .unwrap();
        assert!(hit.is_none());
        assert!(reality.light_estimate().is_none());
    }

    #[test]
    fn test_remove_emits_once() {
        let reality = VirtualReality::new();
        let mut events = reality.subscribe();
        let uid = reality.add_anchor(Anchor::new(
            CoordinateSystem::tracker(display(), Matrix4::IDENTITY),
            None,
        ));

        reality.remove_anchor(&uid);
        reality.remove_anchor(&uid);

        assert_eq!(events.try_recv().unwrap(), RealityEvent::AnchorAdded(uid.clone()));
        assert_eq!(events.try_recv().unwrap(), RealityEvent::AnchorRemoved(uid));
        assert!(events.try_recv().is_err());
    }
}
