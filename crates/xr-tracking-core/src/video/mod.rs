//! Camera frames handed to computer-vision consumers

mod pool;

pub use pool::BufferPool;

use crate::spatial::Matrix4;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Pixel layouts a frame may carry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PixelFormat {
    Rgba32,
    Bgra32,
    Rgb24,
    Bgr24,
    Gray8,
    Yuv444p,
    Yuv422p,
    Yuv420p,
    Nv12,
    Nv21,
    Hsv,
    Lab,
    Depth,
    /// Anything the tracker reports that has no mapping here
    Other(String),
}

impl PixelFormat {
    pub fn as_str(&self) -> &str {
        match self {
            PixelFormat::Rgba32 => "RGBA32",
            PixelFormat::Bgra32 => "BGRA32",
            PixelFormat::Rgb24 => "RGB24",
            PixelFormat::Bgr24 => "BGR24",
            PixelFormat::Gray8 => "GRAY8",
            PixelFormat::Yuv444p => "YUV444P",
            PixelFormat::Yuv422p => "YUV422P",
            PixelFormat::Yuv420p => "YUV420P",
            PixelFormat::Nv12 => "NV12",
            PixelFormat::Nv21 => "NV21",
            PixelFormat::Hsv => "HSV",
            PixelFormat::Lab => "Lab",
            PixelFormat::Depth => "DEPTH",
            PixelFormat::Other(name) => name,
        }
    }

    /// Map a native pixel format tag (CoreVideo names included)
    pub fn from_native(tag: &str) -> Self {
        match tag {
            "kCVPixelFormatType_420YpCbCr8BiPlanarFullRange" | "YUV420P" => PixelFormat::Yuv420p,
            "RGBA32" => PixelFormat::Rgba32,
            "BGRA32" => PixelFormat::Bgra32,
            "RGB24" => PixelFormat::Rgb24,
            "BGR24" => PixelFormat::Bgr24,
            "GRAY8" => PixelFormat::Gray8,
            "YUV444P" => PixelFormat::Yuv444p,
            "YUV422P" => PixelFormat::Yuv422p,
            "NV12" => PixelFormat::Nv12,
            "NV21" => PixelFormat::Nv21,
            "HSV" => PixelFormat::Hsv,
            "Lab" => PixelFormat::Lab,
            "DEPTH" => PixelFormat::Depth,
            other => PixelFormat::Other(other.to_string()),
        }
    }
}

/// Geometry of one pixel plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BufferSize {
    pub width: u32,
    pub height: u32,
    pub bytes_per_row: u32,
    pub bytes_per_pixel: u32,
}

impl BufferSize {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrameBuffer {
    pub size: BufferSize,
    pub data: Vec<u8>,
}

/// Camera model for a frame
#[derive(Debug, Clone, PartialEq)]
pub struct CameraInfo {
    /// Row-major 3x3: fx 0 px / 0 fy py / 0 0 1
    pub intrinsics: [f32; 9],
    pub image_width: u32,
    pub image_height: u32,
    pub view_matrix: Matrix4,
    pub projection_matrix: Matrix4,
    /// Degrees the image is rotated relative to the display
    pub camera_orientation: i32,
}

impl CameraInfo {
    /// Pinhole model for a camera with a known field of view
    pub fn from_fov(width: u32, height: u32, fov_degrees: f32) -> Self {
        let half_size = width.max(height) as f32 / 2.0;
        let focal = half_size / (fov_degrees.to_radians() / 2.0).tan();
        let (px, py) = (width as f32 / 2.0, height as f32 / 2.0);
        Self {
            intrinsics: [focal, 0.0, px, 0.0, focal, py, 0.0, 0.0, 1.0],
            image_width: width,
            image_height: height,
            view_matrix: Matrix4::IDENTITY,
            projection_matrix: Matrix4::IDENTITY,
            camera_orientation: 0,
        }
    }

    pub fn focal_length(&self) -> f32 {
        self.intrinsics[0]
    }
}

/// An RGBA image pulled from a plain camera stream
#[derive(Debug, Clone)]
pub struct CapturedImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// Camera stream used when no native tracker supplies frames
pub trait VideoSource: Send + Sync {
    /// Latest image, or `None` when the stream has nothing new
    fn capture(&self) -> Option<CapturedImage>;
}

/// One captured frame. Buffers go back to the pool when the frame is dropped.
#[derive(Debug)]
pub struct VideoFrame {
    buffers: Vec<FrameBuffer>,
    pixel_format: PixelFormat,
    timestamp: f64,
    camera: CameraInfo,
    pool: Arc<BufferPool>,
}

impl VideoFrame {
    pub fn new(
        buffers: Vec<FrameBuffer>,
        pixel_format: PixelFormat,
        timestamp: f64,
        camera: CameraInfo,
        pool: Arc<BufferPool>,
    ) -> Self {
        Self {
            buffers,
            pixel_format,
            timestamp,
            camera,
            pool,
        }
    }

    /// Single-plane RGBA32 frame; pixels are copied into a pooled buffer
    pub fn from_rgba(
        image: &CapturedImage,
        timestamp: f64,
        camera: CameraInfo,
        pool: Arc<BufferPool>,
    ) -> Self {
        let mut data = pool.acquire(image.rgba.len());
        data.copy_from_slice(&image.rgba);
        let size = BufferSize {
            width: image.width,
            height: image.height,
            bytes_per_row: image.width * 4,
            bytes_per_pixel: 4,
        };
        Self::new(
            vec![FrameBuffer { size, data }],
            PixelFormat::Rgba32,
            timestamp,
            camera,
            pool,
        )
    }

    pub fn buffers(&self) -> &[FrameBuffer] {
        &self.buffers
    }

    pub fn pixel_format(&self) -> &PixelFormat {
        &self.pixel_format
    }

    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn camera(&self) -> &CameraInfo {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut CameraInfo {
        &mut self.camera
    }

    /// Return buffers to the pool now
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for VideoFrame {
    fn drop(&mut self) {
        for buffer in self.buffers.drain(..) {
            self.pool.release(buffer.data);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_format_mapping() {
        assert_eq!(
            PixelFormat::from_native("kCVPixelFormatType_420YpCbCr8BiPlanarFullRange"),
            PixelFormat::Yuv420p
        );
        assert_eq!(PixelFormat::from_native("RGBA32").as_str(), "RGBA32");
        assert_eq!(PixelFormat::from_native("weird").as_str(), "weird");
    }

    #[test]
    fn test_fov_intrinsics() {
        let camera = CameraInfo::from_fov(640, 480, 90.0);
        // tan(45deg) = 1, so the focal length equals half the larger side
        assert!((camera.focal_length() - 320.0).abs() < 0.01);
        assert!((camera.intrinsics[2] - 320.0).abs() < 0.0001);
        assert!((camera.intrinsics[5] - 240.0).abs() < 0.0001);
    }

    #[test]
    fn test_release_recycles_buffers() {
        let pool = Arc::new(BufferPool::new());
        let image = CapturedImage {
            width: 2,
            height: 2,
            rgba: vec![255; 16],
        };
        let camera = CameraInfo::from_fov(2, 2, 70.0);
        let frame = VideoFrame::from_rgba(&image, 1.0, camera, pool.clone());

        assert_eq!(frame.buffers()[0].size.bytes_per_row, 8);
        assert_eq!(frame.pixel_format(), &PixelFormat::Rgba32);

        frame.release();
        assert_eq!(pool.available(16), 1);
    }
}
