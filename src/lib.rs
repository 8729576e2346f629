//! # framemood
//!
//! Sample a video at a fixed frame stride, score each sampled frame for facial
//! emotion through a remote image-classification endpoint, and collect the
//! scores into a fixed seven-column table.
//!
//! Frames are decoded with FFmpeg via the
//! [`ffmpeg-next`](https://crates.io/crates/ffmpeg-next) crate, strictly front
//! to back. Each kept frame is compressed to JPEG and posted (base64) to the
//! endpoint with a bearer token. A model that is still loading is retried
//! after a constant delay; every other failure turns that frame's row into
//! zeros and the run carries on.
//!
//! ## Quick Start
//!
//! ```no_run
//! use framemood::{Credential, PipelineConfig, TableOptions};
//!
//! let config = PipelineConfig::new("input.mp4", Credential::new("hf_xxx"))
//!     .with_stride(30);
//! let rows = framemood::run(&config)?;
//! framemood::write_table(&rows, "emotions.csv", &TableOptions::default())?;
//! # Ok::<(), framemood::FramemoodError>(())
//! ```
//!
//! ## Output
//!
//! One row per sampled frame, in frame order, with the columns
//! `Frame, sad, disgust, angry, neutral, fear, surprise, happy`. A row whose
//! classification failed is all zeros; enable
//! [`TableOptions::status_column`] to tell those apart from genuine zeros.
//!
//! ### Optional Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `rayon` | `run_parallel` classifies batches of frames concurrently, rows stay in frame order |
//!
//! ## Requirements
//!
//! FFmpeg development libraries must be installed on your system.

pub mod aggregate;
pub mod client;
mod conversion;
pub mod error;
pub mod ffmpeg;
#[cfg(feature = "rayon")]
pub mod parallel;
pub mod pipeline;
pub mod progress;
pub mod source;
pub mod table;

pub use aggregate::{Emotion, EmotionRow, RowStatus, to_row};
pub use client::{
    ClientOptions, Credential, DEFAULT_ENDPOINT, DEFAULT_LOADING_MARKER, HttpTransport,
    InferenceClient, InferenceResult, LabelScore, RawResponse, Transport, encode_image,
};
pub use error::{FramemoodError, InferenceFailure};
pub use ffmpeg::{FfmpegLogLevel, set_ffmpeg_log_level};
#[cfg(feature = "rayon")]
pub use parallel::{drive_parallel, run_parallel};
pub use pipeline::{
    Classify, DEFAULT_STRIDE, PipelineConfig, PipelineReport, drive, run, run_with_report,
};
pub use progress::{CancellationToken, ProgressCallback, ProgressInfo};
pub use source::{Frame, FrameReader, SampledFrames, VideoInfo, VideoSource};
pub use table::{TableFormat, TableOptions, header, write_csv, write_json, write_table};
