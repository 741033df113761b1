//! Quaternion representation for 3D rotations

use super::{Matrix4, Vector3D};
use serde::{Deserialize, Serialize};
use std::ops::Mul;

/// A quaternion for representing 3D rotations
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Quaternion {
    /// Identity quaternion (no rotation)
    pub const IDENTITY: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };

    /// Create a new quaternion
    pub fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    /// `[x, y, z, w]` order, as native trackers report orientations
    pub fn from_array(q: [f32; 4]) -> Self {
        Self::new(q[0], q[1], q[2], q[3])
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.x, self.y, self.z, self.w]
    }

    /// Create a quaternion from axis-angle representation
    pub fn from_axis_angle(axis: Vector3D, angle_radians: f32) -> Self {
        let half_angle = angle_radians / 2.0;
        let sin_half = half_angle.sin();
        let cos_half = half_angle.cos();
        let normalized = axis.normalize();

        Self {
            x: normalized.x * sin_half,
            y: normalized.y * sin_half,
            z: normalized.z * sin_half,
            w: cos_half,
        }
    }

    /// Intrinsic Y, then X, then Z rotation (radians).
    ///
    /// This is the order device-orientation sensors report alpha/beta/gamma in.
    pub fn from_euler_yxz(x: f32, y: f32, z: f32) -> Self {
        Self::from_axis_angle(Vector3D::UP, y)
            * Self::from_axis_angle(Vector3D::RIGHT, x)
            * Self::from_axis_angle(Vector3D::BACK, z)
    }

    /// Extract the rotation of an unscaled transform matrix
    pub fn from_rotation_matrix(m: &Matrix4) -> Self {
        let e = m.elements();
        let (m11, m12, m13) = (e[0], e[4], e[8]);
        let (m21, m22, m23) = (e[1], e[5], e[9]);
        let (m31, m32, m33) = (e[2], e[6], e[10]);
        let trace = m11 + m22 + m33;

        if trace > 0.0 {
            let s = 0.5 / (trace + 1.0).sqrt();
            Self::new((m32 - m23) * s, (m13 - m31) * s, (m21 - m12) * s, 0.25 / s)
        } else if m11 > m22 && m11 > m33 {
            let s = 2.0 * (1.0 + m11 - m22 - m33).sqrt();
            Self::new(0.25 * s, (m12 + m21) / s, (m13 + m31) / s, (m32 - m23) / s)
        } else if m22 > m33 {
            let s = 2.0 * (1.0 + m22 - m11 - m33).sqrt();
            Self::new((m12 + m21) / s, 0.25 * s, (m23 + m32) / s, (m13 - m31) / s)
        } else {
            let s = 2.0 * (1.0 + m33 - m11 - m22).sqrt();
            Self::new((m13 + m31) / s, (m23 + m32) / s, 0.25 * s, (m21 - m12) / s)
        }
    }

    /// Get the magnitude of the quaternion
    pub fn magnitude(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w).sqrt()
    }

    /// Normalize the quaternion
    pub fn normalize(&self) -> Self {
        let mag = self.magnitude();
        if mag > 0.0 {
            Self {
                x: self.x / mag,
                y: self.y / mag,
                z: self.z / mag,
                w: self.w / mag,
            }
        } else {
            Self::IDENTITY
        }
    }

    /// Get the inverse of the quaternion
    pub fn inverse(&self) -> Self {
        let mag_sq = self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w;
        if mag_sq > 0.0 {
            let inv_mag_sq = 1.0 / mag_sq;
            Self {
                x: -self.x * inv_mag_sq,
                y: -self.y * inv_mag_sq,
                z: -self.z * inv_mag_sq,
                w: self.w * inv_mag_sq,
            }
        } else {
            Self::IDENTITY
        }
    }

    /// Rotate a vector by this quaternion
    pub fn rotate_vector(&self, v: Vector3D) -> Vector3D {
        let q_vec = Vector3D::new(self.x, self.y, self.z);
        let uv = q_vec.cross(&v);
        let uuv = q_vec.cross(&uv);
        v + (uv * self.w + uuv) * 2.0
    }

    /// Spherical linear interpolation between two quaternions
    pub fn slerp(&self, other: &Quaternion, t: f32) -> Self {
        let dot = self.x * other.x + self.y * other.y + self.z * other.z + self.w * other.w;

        // Take the shorter arc
        let (other, dot) = if dot < 0.0 {
            (Quaternion::new(-other.x, -other.y, -other.z, -other.w), -dot)
        } else {
            (*other, dot)
        };

        if dot > 0.9995 {
            return Quaternion::new(
                self.x + t * (other.x - self.x),
                self.y + t * (other.y - self.y),
                self.z + t * (other.z - self.z),
                self.w + t * (other.w - self.w),
            )
            .normalize();
        }

        let theta_0 = dot.acos();
        let theta = theta_0 * t;
        let sin_theta = theta.sin();
        let sin_theta_0 = theta_0.sin();

        let s0 = theta.cos() - dot * sin_theta / sin_theta_0;
        let s1 = sin_theta / sin_theta_0;

        Quaternion::new(
            s0 * self.x + s1 * other.x,
            s0 * self.y + s1 * other.y,
            s0 * self.z + s1 * other.z,
            s0 * self.w + s1 * other.w,
        )
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mul for Quaternion {
    type Output = Quaternion;

    fn mul(self, rhs: Self) -> Self::Output {
        Quaternion::new(
            self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
            self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn approx(a: Quaternion, b: Quaternion) -> bool {
        // q and -q are the same rotation
        let same = (a.x - b.x).abs() < 0.0001
            && (a.y - b.y).abs() < 0.0001
            && (a.z - b.z).abs() < 0.0001
            && (a.w - b.w).abs() < 0.0001;
        let negated = (a.x + b.x).abs() < 0.0001
            && (a.y + b.y).abs() < 0.0001
            && (a.z + b.z).abs() < 0.0001
            && (a.w + b.w).abs() < 0.0001;
        same || negated
    }

    #[test]
    fn test_90_degree_rotation() {
        let q = Quaternion::from_axis_angle(Vector3D::UP, PI / 2.0);
        let rotated = q.rotate_vector(Vector3D::BACK);
        // +Z turns into +X
        assert!((rotated.x - 1.0).abs() < 0.0001);
        assert!(rotated.y.abs() < 0.0001);
        assert!(rotated.z.abs() < 0.0001);
    }

    #[test]
    fn test_inverse() {
        let q = Quaternion::from_axis_angle(Vector3D::UP, PI / 4.0);
        let result = q * q.inverse();
        assert!(approx(result, Quaternion::IDENTITY));
    }

    #[test]
    fn test_rotation_matrix_round_trip() {
        for (axis, angle) in [
            (Vector3D::UP, 0.3),
            (Vector3D::RIGHT, 2.9),
            (Vector3D::BACK, -2.5),
            (Vector3D::new(1.0, 1.0, 0.0), PI),
        ] {
            let q = Quaternion::from_axis_angle(axis, angle);
            let m = Matrix4::from_rotation_translation(q, Vector3D::new(1.0, 2.0, 3.0));
            assert!(approx(Quaternion::from_rotation_matrix(&m), q));
        }
    }

    #[test]
    fn test_euler_yxz_single_axis() {
        let q = Quaternion::from_euler_yxz(0.0, PI / 2.0, 0.0);
        assert!(approx(q, Quaternion::from_axis_angle(Vector3D::UP, PI / 2.0)));

        let q = Quaternion::from_euler_yxz(0.4, 0.0, 0.0);
        assert!(approx(q, Quaternion::from_axis_angle(Vector3D::RIGHT, 0.4)));
    }

    #[test]
    fn test_slerp_halfway() {
        let a = Quaternion::IDENTITY;
        let b = Quaternion::from_axis_angle(Vector3D::UP, PI / 2.0);
        let mid = a.slerp(&b, 0.5);
        assert!(approx(mid, Quaternion::from_axis_angle(Vector3D::UP, PI / 4.0)));
    }
}
