//! Known planes and CPU ray casting against them

use super::protocol::{HitTestTypes, NativeHit, NativeObject};
use crate::anchor::PlaneAlignment;
use crate::error::{Result, XrError};
use crate::spatial::{Matrix4, Vector3D};

/// A plane as last reported by the native tracker
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedPlane {
    pub id: String,
    /// Center in the plane's local frame
    pub center: Vector3D,
    /// Full size along local x and z
    pub extent: [f32; 2],
    pub model_matrix: Matrix4,
    pub alignment: PlaneAlignment,
}

impl TrackedPlane {
    /// `None` unless the object carries plane data
    pub fn from_native(object: &NativeObject) -> Option<Self> {
        let center = object.plane_center?;
        Some(Self {
            id: object.uuid.clone(),
            center,
            extent: object.plane_extent_xz(),
            model_matrix: object.transform,
            alignment: PlaneAlignment::from_native(object.plane_alignment.unwrap_or(0)),
        })
    }

    /// Mutate in place from a newer report of the same plane
    pub fn apply(&mut self, object: &NativeObject) {
        if let Some(center) = object.plane_center {
            self.center = center;
        }
        self.extent = object.plane_extent_xz();
        self.model_matrix = object.transform;
        if let Some(alignment) = object.plane_alignment {
            self.alignment = PlaneAlignment::from_native(alignment);
        }
    }

    fn normal(&self) -> Vector3D {
        match self.alignment {
            PlaneAlignment::Horizontal => Vector3D::UP,
            PlaneAlignment::Vertical => self.model_matrix.column(1).normalize(),
        }
    }
}

/// A ray hit on a known plane
#[derive(Debug, Clone, PartialEq)]
pub struct PlaneHit {
    pub plane_id: String,
    /// Plane rotation placed at the intersection point
    pub model_matrix: Matrix4,
    /// Distance from the camera
    pub distance: f32,
}

/// Normalized screen coordinates must lie in [0, 1]
pub fn check_screen_point(x: f32, y: f32) -> Result<()> {
    if (0.0..=1.0).contains(&x) && (0.0..=1.0).contains(&y) {
        Ok(())
    } else {
        Err(XrError::InvalidScreenCoordinates { x, y })
    }
}

/// Cast a ray through normalized screen point `(x, y)` (origin top left)
/// and intersect it with every plane, nearest hit first.
pub fn hit_test_planes<'a>(
    planes: impl IntoIterator<Item = &'a TrackedPlane>,
    view_matrix: &Matrix4,
    projection_matrix: &Matrix4,
    x: f32,
    y: f32,
    extent_tolerance: f32,
) -> Result<Vec<PlaneHit>> {
    check_screen_point(x, y)?;

    let screen_to_world = (*projection_matrix * *view_matrix)
        .invert()
        .ok_or(XrError::NonInvertibleMatrix)?;
    let camera_position = view_matrix
        .invert()
        .ok_or(XrError::NonInvertibleMatrix)?
        .position();

    let (ndc_x, ndc_y) = (2.0 * x - 1.0, 2.0 * (1.0 - y) - 1.0);
    let ray_start = screen_to_world.transform_point(Vector3D::new(ndc_x, ndc_y, 0.0));
    let ray_end = screen_to_world.transform_point(Vector3D::new(ndc_x, ndc_y, 1.0));
    let ray_dir = (ray_end - ray_start).normalize();

    let mut hits = Vec::new();
    for plane in planes {
        let plane_position = plane.model_matrix.transform_point(plane.center);
        let normal = plane.normal();

        let denominator = normal.dot(&ray_dir);
        if denominator.abs() < f32::EPSILON {
            continue;
        }
        let t = normal.dot(&(plane_position - ray_start)) / denominator;
        if t < 0.0 {
            continue;
        }
        let intersection = ray_start + ray_dir * t;

        let Some(world_to_plane) = plane.model_matrix.invert() else {
            continue;
        };
        let local = world_to_plane.transform_point(intersection) - plane.center;
        if local.x.abs() > plane.extent[0] / 2.0 + extent_tolerance
            || local.z.abs() > plane.extent[1] / 2.0 + extent_tolerance
        {
            continue;
        }

        hits.push(PlaneHit {
            plane_id: plane.id.clone(),
            model_matrix: Matrix4::from_rotation_translation(
                plane.model_matrix.rotation(),
                intersection,
            ),
            distance: intersection.distance(&camera_position),
        });
    }

    hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    Ok(hits)
}

/// Choose the most useful native hit: nearest existing plane using extent,
/// then nearest existing plane, then nearest non-feature-point, then the
/// first result.
pub fn pick_hit(hits: &[NativeHit]) -> Option<&NativeHit> {
    let nearest = |wanted: &dyn Fn(&NativeHit) -> bool| {
        hits.iter()
            .filter(|hit| hit.hit_type != HitTestTypes::FEATURE_POINT && wanted(hit))
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    };

    nearest(&|hit| hit.hit_type == HitTestTypes::EXISTING_PLANE_USING_EXTENT)
        .or_else(|| nearest(&|hit| hit.hit_type == HitTestTypes::EXISTING_PLANE))
        .or_else(|| nearest(&|_| true))
        .or_else(|| hits.first())
}
