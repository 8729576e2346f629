//! Strided, sequential frame sampling.
//!
//! [`VideoSource`] opens a media file through FFmpeg and decodes it strictly
//! front to back. [`SampledFrames`] walks any [`FrameReader`] one decoded frame
//! at a time and keeps only every `stride`-th one, so no seeking support is
//! required from the container or codec.
//!
//! # Example
//!
//! ```no_run
//! use framemood::{FrameReader, VideoSource};
//!
//! let source = VideoSource::open("input.mp4")?;
//! for frame in source.sample(30)? {
//!     frame.image.save(format!("frame_{}.png", frame.index))?;
//! }
//! # Ok::<(), framemood::FramemoodError>(())
//! ```

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
};

use ffmpeg_next::{
    Error as FfmpegError, Packet,
    codec::context::Context as CodecContext,
    decoder::Video as VideoDecoder,
    format::{Pixel, context::Input},
    frame::Video as VideoFrame,
    media::Type,
    software::scaling::{Context as ScalingContext, Flags as ScalingFlags},
};
use image::DynamicImage;

use crate::error::FramemoodError;

/// One sampled frame: its position in the original stream and its pixels.
#[derive(Debug, Clone)]
pub struct Frame {
    /// 0-based position of the frame in decode order.
    pub index: u64,
    /// Decoded RGB image.
    pub image: DynamicImage,
}

/// Stream-level facts read once when a [`VideoSource`] is opened.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub struct VideoInfo {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Average frames per second (0.0 when the container does not say).
    pub frames_per_second: f64,
    /// Total frame count, from the stream header or estimated from duration.
    pub frame_count: u64,
    /// Codec name (e.g. `"h264"`).
    pub codec: String,
}

/// A sequential decoder that can be sampled.
///
/// Implementors decode one frame per [`advance`](FrameReader::advance) call
/// and convert it only when [`current_image`](FrameReader::current_image) is
/// asked for, so skipped frames cost a decode but never a pixel conversion.
pub trait FrameReader {
    /// Total number of frames, read once at open time.
    fn total_frames(&self) -> u64;

    /// Decode the next frame. `Ok(false)` means the stream has no more data.
    fn advance(&mut self) -> Result<bool, FramemoodError>;

    /// Convert the most recently decoded frame into an image.
    fn current_image(&mut self) -> Result<DynamicImage, FramemoodError>;

    /// Consume the reader and yield every `stride`-th frame starting at 0.
    ///
    /// # Errors
    ///
    /// [`FramemoodError::InvalidStride`] if `stride` is zero.
    fn sample(self, stride: u64) -> Result<SampledFrames<Self>, FramemoodError>
    where
        Self: Sized,
    {
        SampledFrames::new(self, stride)
    }
}

/// Lazy, single-pass iterator over sampled frames.
///
/// Ends when `total_frames` positions have been walked, or as soon as the
/// reader fails or runs dry, even between two sampled positions.
pub struct SampledFrames<R> {
    reader: R,
    stride: u64,
    total_frames: u64,
    /// Position of the next frame the reader will decode.
    position: u64,
    finished: bool,
    stopped_early: bool,
}

impl<R: FrameReader> SampledFrames<R> {
    pub(crate) fn new(reader: R, stride: u64) -> Result<Self, FramemoodError> {
        if stride == 0 {
            return Err(FramemoodError::InvalidStride);
        }
        let total_frames = reader.total_frames();
        Ok(Self {
            reader,
            stride,
            total_frames,
            position: 0,
            finished: false,
            stopped_early: false,
        })
    }

    /// The sampling stride.
    pub fn stride(&self) -> u64 {
        self.stride
    }

    /// Total frames the underlying reader reported.
    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    /// `true` once iteration ended before every position was reached.
    pub fn stopped_early(&self) -> bool {
        self.stopped_early
    }

    fn stop_early(&mut self, reason: &str) {
        log::warn!(
            "Frame source stopped at position {} of {}: {reason}",
            self.position,
            self.total_frames
        );
        self.finished = true;
        self.stopped_early = true;
    }
}

impl<R: FrameReader> Iterator for SampledFrames<R> {
    type Item = Frame;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished && self.position < self.total_frames {
            let index = self.position;
            match self.reader.advance() {
                Ok(true) => {}
                Ok(false) => {
                    self.stop_early("no more data");
                    return None;
                }
                Err(error) => {
                    self.stop_early(&error.to_string());
                    return None;
                }
            }
            self.position += 1;

            if index % self.stride != 0 {
                continue;
            }

            match self.reader.current_image() {
                Ok(image) => return Some(Frame { index, image }),
                Err(error) => {
                    self.stop_early(&error.to_string());
                    return None;
                }
            }
        }
        self.finished = true;
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.finished {
            return (0, Some(0));
        }
        let remaining_positions = self.total_frames.saturating_sub(self.position);
        let first_offset = (self.stride - self.position % self.stride) % self.stride;
        let remaining = if remaining_positions > first_offset {
            crate::conversion::sampled_count(remaining_positions - first_offset, self.stride)
        } else {
            0
        };
        (0, usize::try_from(remaining).ok())
    }
}

/// An opened video file, decoded front to back through FFmpeg.
pub struct VideoSource {
    input_context: Input,
    decoder: VideoDecoder,
    scaler: ScalingContext,
    video_stream_index: usize,
    info: VideoInfo,
    decoded_frame: VideoFrame,
    scaled_frame: VideoFrame,
    eof_sent: bool,
    file_path: PathBuf,
}

impl Debug for VideoSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("VideoSource")
            .field("info", &self.info)
            .field("video_stream_index", &self.video_stream_index)
            .field("file_path", &self.file_path)
            .finish_non_exhaustive()
    }
}

impl VideoSource {
    /// Open a video file for sequential sampling.
    ///
    /// # Errors
    ///
    /// [`FramemoodError::UnreadableMedia`] if FFmpeg cannot open the file,
    /// it has no decodable video stream, or it reports zero frames.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, FramemoodError> {
        let path = path.as_ref();
        let file_path = path.to_path_buf();
        let unreadable = |reason: String| FramemoodError::UnreadableMedia {
            path: file_path.clone(),
            reason,
        };

        log::debug!("Opening video: {}", file_path.display());

        ffmpeg_next::init().map_err(|error| unreadable(format!("FFmpeg initialisation failed: {error}")))?;

        let input_context =
            ffmpeg_next::format::input(&path).map_err(|error| unreadable(error.to_string()))?;

        let stream = input_context
            .streams()
            .best(Type::Video)
            .ok_or_else(|| unreadable("no video stream".to_string()))?;
        let video_stream_index = stream.index();

        let decoder_context = CodecContext::from_parameters(stream.parameters())
            .map_err(|error| unreadable(format!("bad codec parameters: {error}")))?;
        let decoder = decoder_context
            .decoder()
            .video()
            .map_err(|error| unreadable(format!("cannot create video decoder: {error}")))?;

        let frame_rate = stream.avg_frame_rate();
        let frames_per_second = if frame_rate.denominator() != 0 {
            frame_rate.numerator() as f64 / frame_rate.denominator() as f64
        } else {
            0.0
        };

        let header_frames = stream.frames();
        let frame_count = if header_frames > 0 {
            header_frames as u64
        } else {
            let duration_microseconds = input_context.duration();
            if duration_microseconds > 0 && frames_per_second > 0.0 {
                (duration_microseconds as f64 / 1_000_000.0 * frames_per_second) as u64
            } else {
                0
            }
        };

        if frame_count == 0 {
            return Err(unreadable("stream reports zero frames".to_string()));
        }

        let codec = decoder
            .codec()
            .map(|codec| codec.name().to_string())
            .unwrap_or_else(|| "unknown".to_string());

        let width = decoder.width();
        let height = decoder.height();
        let scaler = ScalingContext::get(
            decoder.format(),
            width,
            height,
            Pixel::RGB24,
            width,
            height,
            ScalingFlags::BILINEAR,
        )
        .map_err(|error| unreadable(format!("cannot create scaler: {error}")))?;

        let info = VideoInfo {
            width,
            height,
            frames_per_second,
            frame_count,
            codec,
        };
        log::debug!("Video stream {video_stream_index}: {info:?}");

        Ok(Self {
            input_context,
            decoder,
            scaler,
            video_stream_index,
            info,
            decoded_frame: VideoFrame::empty(),
            scaled_frame: VideoFrame::empty(),
            eof_sent: false,
            file_path,
        })
    }

    /// Stream facts captured at open time.
    pub fn info(&self) -> &VideoInfo {
        &self.info
    }

    /// Path the source was opened from.
    pub fn path(&self) -> &Path {
        &self.file_path
    }
}

impl FrameReader for VideoSource {
    fn total_frames(&self) -> u64 {
        self.info.frame_count
    }

    fn advance(&mut self) -> Result<bool, FramemoodError> {
        loop {
            if self.decoder.receive_frame(&mut self.decoded_frame).is_ok() {
                return Ok(true);
            }

            if self.eof_sent {
                return Ok(false);
            }

            let mut packet = Packet::empty();
            match packet.read(&mut self.input_context) {
                Ok(()) => {
                    if packet.stream() == self.video_stream_index {
                        self.decoder.send_packet(&packet)?;
                    }
                }
                Err(FfmpegError::Eof) => {
                    self.decoder.send_eof()?;
                    self.eof_sent = true;
                }
                Err(error) => return Err(error.into()),
            }
        }
    }

    fn current_image(&mut self) -> Result<DynamicImage, FramemoodError> {
        self.scaler.run(&self.decoded_frame, &mut self.scaled_frame)?;
        crate::conversion::rgb_frame_to_image(&self.scaled_frame, self.info.width, self.info.height)
    }
}

#[cfg(test)]
mod tests {
    use image::{DynamicImage, RgbImage};

    use super::{FrameReader, FramemoodError};

    /// Reader over `available` synthetic frames that claims `total` frames.
    struct Synthetic {
        total: u64,
        available: u64,
        decoded: u64,
        converted: u64,
    }

    impl FrameReader for Synthetic {
        fn total_frames(&self) -> u64 {
            self.total
        }

        fn advance(&mut self) -> Result<bool, FramemoodError> {
            if self.decoded >= self.available {
                return Ok(false);
            }
            self.decoded += 1;
            Ok(true)
        }

        fn current_image(&mut self) -> Result<DynamicImage, FramemoodError> {
            self.converted += 1;
            Ok(DynamicImage::ImageRgb8(RgbImage::new(2, 2)))
        }
    }

    fn synthetic(total: u64, available: u64) -> Synthetic {
        Synthetic {
            total,
            available,
            decoded: 0,
            converted: 0,
        }
    }

    #[test]
    fn stride_three_over_ten_frames() {
        let indices: Vec<u64> = synthetic(10, 10)
            .sample(3)
            .unwrap()
            .map(|frame| frame.index)
            .collect();
        assert_eq!(indices, vec![0, 3, 6, 9]);
    }

    #[test]
    fn sample_length_is_ceiling_of_total_over_stride() {
        for total in 1..=25u64 {
            for stride in 1..=7u64 {
                let frames: Vec<_> = synthetic(total, total).sample(stride).unwrap().collect();
                assert_eq!(frames.len() as u64, total.div_ceil(stride));
                for (n, frame) in frames.iter().enumerate() {
                    assert_eq!(frame.index, n as u64 * stride);
                    assert!(frame.index < total);
                }
            }
        }
    }

    #[test]
    fn zero_stride_is_rejected() {
        assert!(matches!(
            synthetic(10, 10).sample(0),
            Err(FramemoodError::InvalidStride)
        ));
    }

    #[test]
    fn short_stream_stops_mid_stride() {
        let mut frames = synthetic(20, 7).sample(5).unwrap();
        let indices: Vec<u64> = frames.by_ref().map(|frame| frame.index).collect();
        assert_eq!(indices, vec![0, 5]);
        assert!(frames.stopped_early());
    }

    #[test]
    fn full_walk_is_not_early() {
        let mut frames = synthetic(6, 6).sample(2).unwrap();
        assert_eq!(frames.by_ref().count(), 3);
        assert!(!frames.stopped_early());
        assert!(frames.next().is_none());
    }

    #[test]
    fn only_sampled_frames_are_converted() {
        let mut frames = synthetic(10, 10).sample(4).unwrap();
        assert_eq!(frames.by_ref().count(), 3);
        assert_eq!(frames.reader.decoded, 10);
        assert_eq!(frames.reader.converted, 3);
    }

    #[test]
    fn size_hint_upper_bound_tracks_remaining_samples() {
        let mut frames = synthetic(10, 10).sample(3).unwrap();
        assert_eq!(frames.size_hint(), (0, Some(4)));
        frames.next();
        assert_eq!(frames.size_hint(), (0, Some(3)));
    }
}
