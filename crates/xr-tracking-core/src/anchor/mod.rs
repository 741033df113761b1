//! Tracked anchors and offsets relative to them

mod offset;
mod registry;

pub use offset::AnchorOffset;
pub use registry::AnchorRegistry;

use crate::coordinate_system::CoordinateSystem;
use crate::spatial::{Matrix4, Quaternion, Vector3D};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Stable anchor identifier, shared with the native tracker
pub type AnchorId = String;

/// `anchor-<unix ms>-<random>`
pub fn generate_anchor_uid() -> AnchorId {
    format!(
        "anchor-{}-{}",
        chrono::Utc::now().timestamp_millis(),
        rand::random::<u32>()
    )
}

/// Orientation of a detected plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaneAlignment {
    Horizontal,
    Vertical,
}

impl PlaneAlignment {
    /// Native trackers report 0 for horizontal planes
    pub fn from_native(value: u8) -> Self {
        if value == 0 {
            Self::Horizontal
        } else {
            Self::Vertical
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TextureCoordinate {
    pub x: f32,
    pub y: f32,
}

/// Mesh reported for planes and faces
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Geometry {
    pub vertices: Vec<Vector3D>,
    pub triangle_indices: Vec<u32>,
    pub texture_coordinates: Vec<TextureCoordinate>,
    pub boundary_vertices: Vec<Vector3D>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaneInfo {
    /// Center in the anchor's local frame
    pub center: Vector3D,
    /// Full size along local x and z
    pub extent: [f32; 2],
    pub alignment: PlaneAlignment,
    pub geometry: Option<Geometry>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FaceInfo {
    pub geometry: Option<Geometry>,
    pub blend_shapes: HashMap<String, f32>,
}

impl FaceInfo {
    /// Merge new coefficients, keeping ones the update did not mention
    pub fn update_blend_shapes(&mut self, blend_shapes: HashMap<String, f32>) {
        self.blend_shapes.extend(blend_shapes);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnchorKind {
    Generic,
    Plane(PlaneInfo),
    Face(FaceInfo),
    Image { name: Option<String> },
}

/// A tracked pose in the physical world
#[derive(Debug, Clone)]
pub struct Anchor {
    uid: AnchorId,
    coordinate_system: CoordinateSystem,
    kind: AnchorKind,
}

impl Anchor {
    /// Generic anchor; a uid is generated when none is given
    pub fn new(coordinate_system: CoordinateSystem, uid: Option<AnchorId>) -> Self {
        Self {
            uid: uid.unwrap_or_else(generate_anchor_uid),
            coordinate_system,
            kind: AnchorKind::Generic,
        }
    }

    pub fn with_kind(mut self, kind: AnchorKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn coordinate_system(&self) -> &CoordinateSystem {
        &self.coordinate_system
    }

    pub fn coordinate_system_mut(&mut self) -> &mut CoordinateSystem {
        &mut self.coordinate_system
    }

    pub fn kind(&self) -> &AnchorKind {
        &self.kind
    }

    pub fn kind_mut(&mut self) -> &mut AnchorKind {
        &mut self.kind
    }

    pub fn pose_matrix(&self) -> Matrix4 {
        self.coordinate_system.pose_model_matrix()
    }

    pub fn position(&self) -> Vector3D {
        self.pose_matrix().position()
    }

    pub fn orientation(&self) -> Quaternion {
        self.pose_matrix().rotation()
    }
}
