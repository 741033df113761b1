//! Column-major 4x4 affine transform

use super::{Quaternion, Vector3D};
use serde::{Deserialize, Serialize};
use std::ops::Mul;

/// A 4x4 matrix stored column-major, translation in elements 12..15
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Matrix4([f32; 16]);

impl Matrix4 {
    pub const IDENTITY: Self = Self([
        1.0, 0.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    ]);

    pub fn from_elements(elements: [f32; 16]) -> Self {
        Self(elements)
    }

    pub fn elements(&self) -> &[f32; 16] {
        &self.0
    }

    pub fn elements_mut(&mut self) -> &mut [f32; 16] {
        &mut self.0
    }

    /// Rigid transform: rotate by `rotation`, then move to `translation`
    pub fn from_rotation_translation(rotation: Quaternion, translation: Vector3D) -> Self {
        let Quaternion { x, y, z, w } = rotation;
        let (x2, y2, z2) = (x + x, y + y, z + z);
        let (xx, xy, xz) = (x * x2, x * y2, x * z2);
        let (yy, yz, zz) = (y * y2, y * z2, z * z2);
        let (wx, wy, wz) = (w * x2, w * y2, w * z2);

        Self([
            1.0 - (yy + zz),
            xy + wz,
            xz - wy,
            0.0,
            xy - wz,
            1.0 - (xx + zz),
            yz + wx,
            0.0,
            xz + wy,
            yz - wx,
            1.0 - (xx + yy),
            0.0,
            translation.x,
            translation.y,
            translation.z,
            1.0,
        ])
    }

    pub fn from_translation(translation: Vector3D) -> Self {
        Self::from_rotation_translation(Quaternion::IDENTITY, translation)
    }

    /// Translation component
    pub fn position(&self) -> Vector3D {
        Vector3D::new(self.0[12], self.0[13], self.0[14])
    }

    pub fn set_position(&mut self, position: Vector3D) {
        self.0[12] = position.x;
        self.0[13] = position.y;
        self.0[14] = position.z;
    }

    /// Rotation component (assumes no scale)
    pub fn rotation(&self) -> Quaternion {
        Quaternion::from_rotation_matrix(self)
    }

    /// Column `index` as a vector (xyz only)
    pub fn column(&self, index: usize) -> Vector3D {
        let base = index * 4;
        Vector3D::new(self.0[base], self.0[base + 1], self.0[base + 2])
    }

    /// `self * rhs`: `rhs` is applied first when transforming points
    pub fn multiply(&self, rhs: &Matrix4) -> Matrix4 {
        let a = &self.0;
        let b = &rhs.0;
        let mut out = [0.0f32; 16];
        for col in 0..4 {
            for row in 0..4 {
                out[col * 4 + row] = (0..4).map(|k| a[k * 4 + row] * b[col * 4 + k]).sum();
            }
        }
        Matrix4(out)
    }

    /// General inverse; `None` when the determinant is zero
    pub fn invert(&self) -> Option<Matrix4> {
        let a = &self.0;
        let (a00, a01, a02, a03) = (a[0], a[1], a[2], a[3]);
        let (a10, a11, a12, a13) = (a[4], a[5], a[6], a[7]);
        let (a20, a21, a22, a23) = (a[8], a[9], a[10], a[11]);
        let (a30, a31, a32, a33) = (a[12], a[13], a[14], a[15]);

        let b00 = a00 * a11 - a01 * a10;
        let b01 = a00 * a12 - a02 * a10;
        let b02 = a00 * a13 - a03 * a10;
        let b03 = a01 * a12 - a02 * a11;
        let b04 = a01 * a13 - a03 * a11;
        let b05 = a02 * a13 - a03 * a12;
        let b06 = a20 * a31 - a21 * a30;
        let b07 = a20 * a32 - a22 * a30;
        let b08 = a20 * a33 - a23 * a30;
        let b09 = a21 * a32 - a22 * a31;
        let b10 = a21 * a33 - a23 * a31;
        let b11 = a22 * a33 - a23 * a32;

        let det = b00 * b11 - b01 * b10 + b02 * b09 + b03 * b08 - b04 * b07 + b05 * b06;
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        let det = 1.0 / det;

        Some(Matrix4([
            (a11 * b11 - a12 * b10 + a13 * b09) * det,
            (a02 * b10 - a01 * b11 - a03 * b09) * det,
            (a31 * b05 - a32 * b04 + a33 * b03) * det,
            (a22 * b04 - a21 * b05 - a23 * b03) * det,
            (a12 * b08 - a10 * b11 - a13 * b07) * det,
            (a00 * b11 - a02 * b08 + a03 * b07) * det,
            (a32 * b02 - a30 * b05 - a33 * b01) * det,
            (a20 * b05 - a22 * b02 + a23 * b01) * det,
            (a10 * b10 - a11 * b08 + a13 * b06) * det,
            (a01 * b08 - a00 * b10 - a03 * b06) * det,
            (a30 * b04 - a31 * b02 + a33 * b00) * det,
            (a21 * b02 - a20 * b04 - a23 * b00) * det,
            (a11 * b07 - a10 * b09 - a12 * b06) * det,
            (a00 * b09 - a01 * b07 + a02 * b06) * det,
            (a31 * b01 - a30 * b03 - a32 * b00) * det,
            (a20 * b03 - a21 * b01 + a22 * b00) * det,
        ]))
    }

    /// Post-multiply by a translation
    pub fn translate(&self, v: Vector3D) -> Matrix4 {
        let mut out = *self;
        let a = &self.0;
        out.0[12] = a[0] * v.x + a[4] * v.y + a[8] * v.z + a[12];
        out.0[13] = a[1] * v.x + a[5] * v.y + a[9] * v.z + a[13];
        out.0[14] = a[2] * v.x + a[6] * v.y + a[10] * v.z + a[14];
        out.0[15] = a[3] * v.x + a[7] * v.y + a[11] * v.z + a[15];
        out
    }

    /// Transform a point, including the perspective divide
    pub fn transform_point(&self, p: Vector3D) -> Vector3D {
        let m = &self.0;
        let w = m[3] * p.x + m[7] * p.y + m[11] * p.z + m[15];
        let w = if w == 0.0 { 1.0 } else { w };
        Vector3D::new(
            (m[0] * p.x + m[4] * p.y + m[8] * p.z + m[12]) / w,
            (m[1] * p.x + m[5] * p.y + m[9] * p.z + m[13]) / w,
            (m[2] * p.x + m[6] * p.y + m[10] * p.z + m[14]) / w,
        )
    }

    /// Projection from per-side half angles (degrees)
    pub fn perspective_from_fov(
        up_degrees: f32,
        down_degrees: f32,
        left_degrees: f32,
        right_degrees: f32,
        near: f32,
        far: f32,
    ) -> Matrix4 {
        let up_tan = up_degrees.to_radians().tan();
        let down_tan = down_degrees.to_radians().tan();
        let left_tan = left_degrees.to_radians().tan();
        let right_tan = right_degrees.to_radians().tan();
        let x_scale = 2.0 / (left_tan + right_tan);
        let y_scale = 2.0 / (up_tan + down_tan);

        let mut out = [0.0f32; 16];
        out[0] = x_scale;
        out[5] = y_scale;
        out[8] = -((left_tan - right_tan) * x_scale * 0.5);
        out[9] = (up_tan - down_tan) * y_scale * 0.5;
        out[10] = far / (near - far);
        out[11] = -1.0;
        out[14] = (far * near) / (near - far);
        Matrix4(out)
    }

    /// Element-wise comparison with an absolute tolerance
    pub fn approx_eq(&self, other: &Matrix4, epsilon: f32) -> bool {
        self.0
            .iter()
            .zip(other.0.iter())
            .all(|(a, b)| (a - b).abs() <= epsilon)
    }
}

impl Default for Matrix4 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mul for Matrix4 {
    type Output = Matrix4;

    fn mul(self, rhs: Self) -> Self::Output {
        self.multiply(&rhs)
    }
}

impl From<[f32; 16]> for Matrix4 {
    fn from(elements: [f32; 16]) -> Self {
        Self(elements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn test_inverse_round_trip() {
        let q = Quaternion::from_axis_angle(Vector3D::new(0.3, 1.0, -0.2), 1.1);
        let m = Matrix4::from_rotation_translation(q, Vector3D::new(4.0, -2.0, 0.5));
        let inv = m.invert().unwrap();
        assert!((m * inv).approx_eq(&Matrix4::IDENTITY, 0.0001));
        assert!((inv * m).approx_eq(&Matrix4::IDENTITY, 0.0001));
    }

    #[test]
    fn test_singular_matrix_has_no_inverse() {
        let m = Matrix4::from_elements([0.0; 16]);
        assert!(m.invert().is_none());
    }

    #[test]
    fn test_multiply_applies_rhs_first() {
        let rotate = Matrix4::from_rotation_translation(
            Quaternion::from_axis_angle(Vector3D::UP, PI / 2.0),
            Vector3D::ZERO,
        );
        let shift = Matrix4::from_translation(Vector3D::new(0.0, 0.0, 1.0));
        // shift first, then rotate: (0,0,1) -> (1,0,0)
        let p = (rotate * shift).transform_point(Vector3D::ZERO);
        assert!((p.x - 1.0).abs() < 0.0001);
        assert!(p.z.abs() < 0.0001);
    }

    #[test]
    fn test_translate_and_position() {
        let m = Matrix4::from_translation(Vector3D::new(1.0, 2.0, 3.0))
            .translate(Vector3D::new(1.0, 0.0, -1.0));
        let p = m.position();
        assert!((p.x - 2.0).abs() < 0.0001);
        assert!((p.y - 2.0).abs() < 0.0001);
        assert!((p.z - 2.0).abs() < 0.0001);
    }

    #[test]
    fn test_symmetric_perspective() {
        let m = Matrix4::perspective_from_fov(35.0, 35.0, 35.0, 35.0, 0.1, 1000.0);
        let e = m.elements();
        let expected = 1.0 / 35.0f32.to_radians().tan();
        assert!((e[0] - expected).abs() < 0.0001);
        assert!((e[5] - expected).abs() < 0.0001);
        assert!(e[8].abs() < 0.0001);
        assert!((e[11] + 1.0).abs() < 0.0001);

        // depth range is [0, 1] from near to far
        let near = m.transform_point(Vector3D::new(0.0, 0.0, -0.1));
        let far = m.transform_point(Vector3D::new(0.0, 0.0, -1000.0));
        assert!(near.z.abs() < 0.001);
        assert!((far.z - 1.0).abs() < 0.001);
    }
}
