//! Uid-keyed anchor arena owned by a reality

use super::{Anchor, AnchorId};
use crate::shared::lock;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Map from uid to anchor. Offsets and scene nodes hold uids, never anchors.
#[derive(Debug, Clone, Default)]
pub struct AnchorRegistry {
    anchors: Arc<Mutex<HashMap<AnchorId, Anchor>>>,
}

impl AnchorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace; returns the uid
    pub fn insert(&self, anchor: Anchor) -> AnchorId {
        let uid = anchor.uid().to_string();
        lock(&self.anchors).insert(uid.clone(), anchor);
        uid
    }

    pub fn get(&self, uid: &str) -> Option<Anchor> {
        lock(&self.anchors).get(uid).cloned()
    }

    pub fn contains(&self, uid: &str) -> bool {
        lock(&self.anchors).contains_key(uid)
    }

    /// Mutate an anchor in place; false when the uid is unknown
    pub fn update(&self, uid: &str, f: impl FnOnce(&mut Anchor)) -> bool {
        match lock(&self.anchors).get_mut(uid) {
            Some(anchor) => {
                f(anchor);
                true
            }
            None => false,
        }
    }

    /// Idempotent removal
    pub fn remove(&self, uid: &str) -> Option<Anchor> {
        lock(&self.anchors).remove(uid)
    }

    pub fn uids(&self) -> Vec<AnchorId> {
        lock(&self.anchors).keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.anchors).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.anchors).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::{AnchorKind, PlaneAlignment, PlaneInfo};
    use crate::coordinate_system::CoordinateSystem;
    use crate::display::{DisplayHandle, DisplayState, FieldOfView};
    use crate::spatial::{Matrix4, Vector3D};

    fn anchor(uid: Option<&str>) -> Anchor {
        let display = DisplayHandle::new(DisplayState::new(
            Vec::new(),
            FieldOfView::symmetric(70.0),
            0.1,
            1000.0,
        ));
        Anchor::new(
            CoordinateSystem::tracker(display, Matrix4::IDENTITY),
            uid.map(str::to_string),
        )
    }

    #[test]
    fn test_generated_uid() {
        let a = anchor(None);
        assert!(a.uid().starts_with("anchor-"));
        assert_ne!(a.uid(), anchor(None).uid());
    }

    #[test]
    fn test_remove_then_get_is_none() {
        let registry = AnchorRegistry::new();
        let uid = registry.insert(anchor(Some("plane-1")));
        assert!(registry.get(&uid).is_some());

        assert!(registry.remove(&uid).is_some());
        assert!(registry.get(&uid).is_none());
        // second removal is a no-op
        assert!(registry.remove(&uid).is_none());
    }

    #[test]
    fn test_update_preserves_identity() {
        let registry = AnchorRegistry::new();
        let uid = registry.insert(anchor(Some("plane-2")).with_kind(AnchorKind::Plane(PlaneInfo {
            center: Vector3D::ZERO,
            extent: [1.0, 1.0],
            alignment: PlaneAlignment::Horizontal,
            geometry: None,
        })));

        let moved = Matrix4::from_translation(Vector3D::new(0.0, 0.0, -2.0));
        assert!(registry.update(&uid, |anchor| {
            anchor.coordinate_system_mut().set_relative_matrix(moved);
            if let AnchorKind::Plane(plane) = anchor.kind_mut() {
                plane.extent = [2.0, 3.0];
            }
        }));

        let updated = registry.get(&uid).unwrap();
        assert_eq!(updated.uid(), "plane-2");
        assert!((updated.position().z + 2.0).abs() < 0.0001);
        match updated.kind() {
            AnchorKind::Plane(plane) => assert_eq!(plane.extent, [2.0, 3.0]),
            other => panic!("unexpected kind {other:?}"),
        }
        assert!(!registry.update("missing", |_| {}));
    }
}
