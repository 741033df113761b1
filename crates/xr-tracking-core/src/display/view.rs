//! Views, viewports and field of view

use crate::spatial::Matrix4;
use serde::{Deserialize, Serialize};

/// Which eye a view renders for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Eye {
    None,
    Left,
    Right,
}

/// Pixel rectangle inside the framebuffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Half angles (degrees) from the view axis to each frustum side
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldOfView {
    pub up: f32,
    pub down: f32,
    pub left: f32,
    pub right: f32,
}

impl FieldOfView {
    /// Same half angle on all four sides
    pub fn symmetric(fov_y_degrees: f32) -> Self {
        let half = fov_y_degrees / 2.0;
        Self {
            up: half,
            down: half,
            left: half,
            right: half,
        }
    }

    pub fn projection(&self, depth_near: f32, depth_far: f32) -> Matrix4 {
        Matrix4::perspective_from_fov(
            self.up,
            self.down,
            self.left,
            self.right,
            depth_near,
            depth_far,
        )
    }
}

/// One rendered view: what the renderer consumes each frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct View {
    pub eye: Eye,
    /// As delivered by the pose source
    pub view_matrix: Matrix4,
    pub projection_matrix: Matrix4,
}

impl View {
    pub fn new(fov: FieldOfView, depth_near: f32, depth_far: f32, eye: Eye) -> Self {
        Self {
            eye,
            view_matrix: Matrix4::IDENTITY,
            projection_matrix: fov.projection(depth_near, depth_far),
        }
    }

    /// Stereo views split the framebuffer width in half
    pub fn viewport(&self, framebuffer_width: u32, framebuffer_height: u32) -> Viewport {
        let half = framebuffer_width / 2;
        match self.eye {
            Eye::None => Viewport {
                x: 0,
                y: 0,
                width: framebuffer_width,
                height: framebuffer_height,
            },
            Eye::Left => Viewport {
                x: 0,
                y: 0,
                width: half,
                height: framebuffer_height,
            },
            Eye::Right => Viewport {
                x: half,
                y: 0,
                width: half,
                height: framebuffer_height,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stereo_viewports_split_width() {
        let fov = FieldOfView::symmetric(70.0);
        let left = View::new(fov, 0.1, 1000.0, Eye::Left);
        let right = View::new(fov, 0.1, 1000.0, Eye::Right);

        assert_eq!(left.viewport(1920, 1080).width, 960);
        assert_eq!(right.viewport(1920, 1080).x, 960);
        assert_eq!(View::new(fov, 0.1, 1000.0, Eye::None).viewport(1920, 1080).width, 1920);
    }

    #[test]
    fn test_symmetric_fov_halves_angle() {
        let fov = FieldOfView::symmetric(70.0);
        assert!((fov.up - 35.0).abs() < 0.0001);
        assert!((fov.right - 35.0).abs() < 0.0001);
    }
}
