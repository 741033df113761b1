//! Decoding of computer-vision captures pushed by the host

use super::protocol::CvDetail;
use crate::video::{BufferPool, CameraInfo, FrameBuffer, PixelFormat, VideoFrame};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::sync::Arc;

/// Degrees the captured image is rotated for a native interface orientation
pub fn camera_orientation(interface_orientation: u8) -> i32 {
    match interface_orientation {
        1 => -90,
        2 => 90,
        4 => 180,
        _ => 0,
    }
}

/// Build a frame from a capture. `Err` carries the reason the capture was
/// unusable; the caller asks the host for a fresh one.
pub fn decode_frame(
    detail: Option<&CvDetail>,
    timestamp: impl FnOnce(f64) -> f64,
    pool: &Arc<BufferPool>,
) -> Result<VideoFrame, String> {
    let detail = detail.ok_or("capture carried no detail")?;
    let frame = detail.frame.as_ref().ok_or("capture carried no frame")?;
    let camera = detail.camera.as_ref().ok_or("capture carried no camera")?;
    if frame.buffers.is_empty() {
        return Err("capture carried no buffers".to_string());
    }
    if let Some(empty) = frame.buffers.iter().position(|b| b.size.is_empty()) {
        return Err(format!("capture buffer {empty} has zero size"));
    }

    let mut buffers = Vec::with_capacity(frame.buffers.len());
    for (index, encoded) in frame.buffers.iter().enumerate() {
        let expected = match (encoded.size.bytes_per_row as usize)
            .checked_mul(encoded.size.height as usize)
        {
            Some(len) if len <= base64::decoded_len_estimate(encoded.buffer.len()) => len,
            Some(len) => {
                release_all(pool, &mut buffers);
                return Err(format!(
                    "capture buffer {index} declares {len} bytes but carries less"
                ));
            }
            None => {
                release_all(pool, &mut buffers);
                return Err(format!("capture buffer {index} size overflows"));
            }
        };
        let mut data = pool.acquire(expected);
        data.clear();
        if let Err(err) = STANDARD.decode_vec(&encoded.buffer, &mut data) {
            pool.release(data);
            release_all(pool, &mut buffers);
            return Err(format!("capture buffer {index} is not valid base64: {err}"));
        }
        buffers.push(FrameBuffer {
            size: encoded.size,
            data,
        });
    }

    let camera_info = CameraInfo {
        intrinsics: camera.camera_intrinsics,
        image_width: camera.camera_image_resolution.width,
        image_height: camera.camera_image_resolution.height,
        view_matrix: camera.inverse_view_matrix,
        projection_matrix: camera.projection_matrix,
        camera_orientation: camera_orientation(camera.interface_orientation),
    };

    Ok(VideoFrame::new(
        buffers,
        PixelFormat::from_native(&frame.pixel_format_type),
        timestamp(frame.timestamp),
        camera_info,
        pool.clone(),
    ))
}

fn release_all(pool: &BufferPool, buffers: &mut Vec<FrameBuffer>) {
    for FrameBuffer { data, .. } in buffers.drain(..) {
        pool.release(data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::protocol::{CvBuffer, CvCamera, CvFrame, ImageResolution};
    use crate::video::BufferSize;

    fn detail(buffers: Vec<CvBuffer>) -> CvDetail {
        CvDetail {
            frame: Some(CvFrame {
                buffers,
                pixel_format_type: "kCVPixelFormatType_420YpCbCr8BiPlanarFullRange".to_string(),
                timestamp: 100.0,
            }),
            camera: Some(CvCamera {
                camera_image_resolution: ImageResolution {
                    width: 2,
                    height: 1,
                },
                interface_orientation: 3,
                ..CvCamera::default()
            }),
        }
    }

    fn plane(bytes: &[u8], width: u32, height: u32) -> CvBuffer {
        CvBuffer {
            buffer: STANDARD.encode(bytes),
            size: BufferSize {
                width,
                height,
                bytes_per_row: width,
                bytes_per_pixel: 1,
            },
        }
    }

    #[test]
    fn test_decodes_planes() {
        let pool = Arc::new(BufferPool::new());
        let capture = detail(vec![plane(&[1, 2], 2, 1), plane(&[9], 1, 1)]);

        let frame = decode_frame(Some(&capture), |t| t + 5.0, &pool).unwrap();
        assert_eq!(frame.pixel_format(), &PixelFormat::Yuv420p);
        assert_eq!(frame.buffers()[0].data, vec![1, 2]);
        assert_eq!(frame.buffers()[1].data, vec![9]);
        assert!((frame.timestamp() - 105.0).abs() < 0.0001);
        assert_eq!(frame.camera().camera_orientation, 0);
    }

    #[test]
    fn test_rejects_malformed_captures() {
        let pool = Arc::new(BufferPool::new());
        assert!(decode_frame(None, |t| t, &pool).is_err());
        assert!(decode_frame(Some(&detail(Vec::new())), |t| t, &pool).is_err());
        assert!(decode_frame(Some(&detail(vec![plane(&[], 0, 0)])), |t| t, &pool).is_err());

        let mut garbage = plane(&[1, 2], 2, 1);
        garbage.buffer = "***".to_string();
        assert!(decode_frame(Some(&detail(vec![garbage])), |t| t, &pool).is_err());
    }

    #[test]
    fn test_rejects_oversized_buffer_headers() {
        let pool = Arc::new(BufferPool::new());

        let mut huge = plane(&[1, 2], 2, 1);
        huge.size.bytes_per_row = 70_000;
        huge.size.height = 70_000;
        let result = decode_frame(Some(&detail(vec![huge])), |t| t, &pool);
        assert!(result.is_err());

        let mut overflowing = plane(&[1, 2], 2, 1);
        overflowing.size.bytes_per_row = u32::MAX;
        overflowing.size.height = u32::MAX;
        assert!(decode_frame(Some(&detail(vec![overflowing])), |t| t, &pool).is_err());

        // earlier planes go back to the pool when a later one is rejected
        let mut short = plane(&[9], 1, 1);
        short.size.height = 4096;
        let capture = detail(vec![plane(&[1, 2], 2, 1), short]);
        assert!(decode_frame(Some(&capture), |t| t, &pool).is_err());
        let frame = decode_frame(Some(&detail(vec![plane(&[3, 4], 2, 1)])), |t| t, &pool).unwrap();
        assert_eq!(frame.buffers()[0].data, vec![3, 4]);
    }

    #[test]
    fn test_orientation_mapping() {
        assert_eq!(camera_orientation(1), -90);
        assert_eq!(camera_orientation(2), 90);
        assert_eq!(camera_orientation(3), 0);
        assert_eq!(camera_orientation(4), 180);
    }
}
