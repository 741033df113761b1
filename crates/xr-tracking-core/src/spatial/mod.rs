//! Spatial primitives for pose tracking
//!
//! Right-handed coordinate system, Y up. Matrices are column-major with the
//! translation in elements 12..15, matching what native trackers report.

mod matrix4;
mod quaternion;
mod vector3d;

pub use matrix4::Matrix4;
pub use quaternion::Quaternion;
pub use vector3d::Vector3D;
