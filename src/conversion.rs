//! Decoded-frame to [`image`] conversion helpers.

use ffmpeg_next::frame::Video as VideoFrame;
use image::{DynamicImage, RgbImage};

use crate::error::FramemoodError;

/// Copy the first plane of a packed RGB24 frame into a tightly-packed buffer.
///
/// FFmpeg frames frequently carry per-row padding (linesize > width × 3),
/// which [`RgbImage::from_raw`] does not accept.
pub(crate) fn packed_rgb_buffer(video_frame: &VideoFrame, width: u32, height: u32) -> Vec<u8> {
    let linesize = video_frame.stride(0);
    let row_bytes = (width as usize) * 3;
    let data = video_frame.data(0);

    if linesize == row_bytes {
        data[..row_bytes * (height as usize)].to_vec()
    } else {
        let mut buffer = Vec::with_capacity(row_bytes * (height as usize));
        for row in 0..(height as usize) {
            let row_start = row * linesize;
            buffer.extend_from_slice(&data[row_start..row_start + row_bytes]);
        }
        buffer
    }
}

/// Wrap a scaled RGB24 frame as a [`DynamicImage`].
pub(crate) fn rgb_frame_to_image(
    video_frame: &VideoFrame,
    width: u32,
    height: u32,
) -> Result<DynamicImage, FramemoodError> {
    let buffer = packed_rgb_buffer(video_frame, width, height);
    RgbImage::from_raw(width, height, buffer)
        .map(DynamicImage::ImageRgb8)
        .ok_or_else(|| {
            FramemoodError::VideoDecodeError(
                "Failed to construct RGB image from decoded frame data".to_string(),
            )
        })
}

/// Number of samples a stream of `total_frames` yields at `stride`.
pub(crate) fn sampled_count(total_frames: u64, stride: u64) -> u64 {
    if stride == 0 {
        return 0;
    }
    total_frames.div_ceil(stride)
}
