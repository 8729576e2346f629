//! Error types for the `framemood` crate.
//!
//! Two families live here. [`FramemoodError`] is returned by every fallible
//! operation that affects a whole run (opening media, writing the table,
//! building the HTTP client). [`InferenceFailure`] describes why a single
//! frame could not be classified; it never aborts a run and is carried inside
//! [`InferenceResult`](crate::InferenceResult) instead of an `Err`.

use std::{io::Error as IoError, path::PathBuf};

use ffmpeg_next::Error as FfmpegError;
use image::ImageError;
use serde_json::Error as JsonError;
use thiserror::Error;

/// The unified error type for run-level `framemood` operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FramemoodError {
    /// The media file could not be opened or reports zero frames.
    #[error("Failed to open media file at {path}: {reason}")]
    UnreadableMedia {
        /// Path that was passed to [`crate::VideoSource::open`].
        path: PathBuf,
        /// Underlying reason the open failed.
        reason: String,
    },

    /// A video frame could not be decoded or converted.
    #[error("Failed to decode video frame: {0}")]
    VideoDecodeError(String),

    /// A sampling stride of zero was provided.
    #[error("Stride must be greater than zero")]
    InvalidStride,

    /// An error originating from the FFmpeg libraries.
    #[error("FFmpeg error: {0}")]
    FfmpegError(String),

    /// An I/O error occurred while writing the output table.
    #[error("I/O error: {0}")]
    IoError(#[from] IoError),

    /// An error from the `image` crate during frame conversion.
    #[error("Image processing error: {0}")]
    ImageError(#[from] ImageError),

    /// The HTTP client could not be constructed.
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    /// Rows could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] JsonError),

    /// The output path has an extension no table writer understands.
    #[error("Unsupported table format for {path} (expected .csv or .json)")]
    UnsupportedTableFormat {
        /// Destination that was requested.
        path: PathBuf,
    },

    /// A pipeline setting is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl From<FfmpegError> for FramemoodError {
    fn from(error: FfmpegError) -> Self {
        FramemoodError::FfmpegError(error.to_string())
    }
}

/// Why a single frame could not be classified.
///
/// Every variant degrades to a zero row in the output table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum InferenceFailure {
    /// The frame could not be compressed for upload.
    #[error("Failed to encode frame: {0}")]
    EncodeError(String),

    /// The remote model was still loading after every allowed attempt.
    #[error("Model still loading after {attempts} attempts")]
    TransientUnavailable {
        /// Number of requests that were made.
        attempts: u32,
    },

    /// The endpoint answered with a status other than success or loading, or
    /// with a success body that could not be parsed.
    #[error("Endpoint returned {status}: {body}")]
    HttpError {
        /// HTTP status code.
        status: u16,
        /// Response body as text.
        body: String,
    },

    /// The request never produced a response (DNS, timeout, reset).
    #[error("Transport error: {0}")]
    TransportException(String),
}

impl InferenceFailure {
    /// Short machine-friendly tag, used for the optional status column.
    pub fn kind(&self) -> &'static str {
        match self {
            InferenceFailure::EncodeError(_) => "encode_error",
            InferenceFailure::TransientUnavailable { .. } => "transient_unavailable",
            InferenceFailure::HttpError { .. } => "http_error",
            InferenceFailure::TransportException(_) => "transport_error",
        }
    }
}
