//! The sample → classify → aggregate driver.
//!
//! [`run`] opens the video named in a [`PipelineConfig`], walks it at the
//! configured stride, classifies each sampled frame and reduces the result to
//! an [`EmotionRow`]. Frames are handled strictly one at a time in index
//! order. A frame whose classification fails still produces a (zero) row;
//! only an unreadable video aborts the run. Cancellation ends it early with
//! the rows gathered so far.

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use image::DynamicImage;

use crate::{
    aggregate::{EmotionRow, to_row},
    client::{ClientOptions, Credential, InferenceClient, InferenceResult, Transport},
    conversion::sampled_count,
    error::FramemoodError,
    progress::{CancellationToken, NoOpProgress, ProgressCallback, ProgressTracker},
    source::{FrameReader, VideoSource},
};

/// Default sampling stride: one frame in thirty.
pub const DEFAULT_STRIDE: u64 = 30;

/// Upper bound on rows reserved up front. Frame counts come from container
/// headers and may be wildly wrong.
const MAX_PREALLOCATED_ROWS: u64 = 4096;

/// Anything that can turn one image into an [`InferenceResult`].
pub trait Classify {
    /// Classify `image` on behalf of `credential`.
    fn classify(&self, image: &DynamicImage, credential: &Credential) -> InferenceResult;
}

impl<T: Transport> Classify for InferenceClient<T> {
    fn classify(&self, image: &DynamicImage, credential: &Credential) -> InferenceResult {
        InferenceClient::classify(self, image, credential)
    }
}

/// Everything a run needs, fixed before it starts.
///
/// ```no_run
/// use std::time::Duration;
///
/// use framemood::{Credential, PipelineConfig};
///
/// let config = PipelineConfig::new("input.mp4", Credential::new("hf_xxx"))
///     .with_stride(15)
///     .with_max_retries(5)
///     .with_retry_delay(Duration::from_secs(10));
/// let rows = framemood::run(&config)?;
/// # Ok::<(), framemood::FramemoodError>(())
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    pub(crate) video_path: PathBuf,
    pub(crate) stride: u64,
    pub(crate) credential: Credential,
    pub(crate) client: ClientOptions,
    pub(crate) progress: Arc<dyn ProgressCallback>,
    pub(crate) cancellation: Option<CancellationToken>,
}

impl Debug for PipelineConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("PipelineConfig")
            .field("video_path", &self.video_path)
            .field("stride", &self.stride)
            .field("credential", &self.credential)
            .field("client", &self.client)
            .field("has_cancellation", &self.cancellation.is_some())
            .finish()
    }
}

impl PipelineConfig {
    /// Configuration with stride 30, three attempts and a 20 second delay.
    pub fn new(video_path: impl AsRef<Path>, credential: Credential) -> Self {
        Self {
            video_path: video_path.as_ref().to_path_buf(),
            stride: DEFAULT_STRIDE,
            credential,
            client: ClientOptions::default(),
            progress: Arc::new(NoOpProgress),
            cancellation: None,
        }
    }

    /// Keep every `stride`-th frame. Zero is rejected when the run starts.
    #[must_use]
    pub fn with_stride(mut self, stride: u64) -> Self {
        self.stride = stride;
        self
    }

    /// Request budget per frame while the model is loading.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.client.max_retries = max_retries;
        self
    }

    /// Constant pause between loading responses.
    #[must_use]
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.client.retry_delay = retry_delay;
        self
    }

    /// Classification URL.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.client.endpoint = endpoint.into();
        self
    }

    /// Per-request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client.timeout = timeout;
        self
    }

    /// Substring of a `503` body that marks the model as still loading.
    #[must_use]
    pub fn with_loading_marker(mut self, marker: impl Into<String>) -> Self {
        self.client.loading_marker = marker.into();
        self
    }

    /// Replace all client settings at once.
    #[must_use]
    pub fn with_client_options(mut self, options: ClientOptions) -> Self {
        self.client = options;
        self
    }

    /// Attach a progress callback, invoked after every frame.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Attach a cancellation token, checked before every frame.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Video to sample.
    pub fn video_path(&self) -> &Path {
        &self.video_path
    }

    /// Sampling stride.
    pub fn stride(&self) -> u64 {
        self.stride
    }

    /// Client settings.
    pub fn client_options(&self) -> &ClientOptions {
        &self.client
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(|token| token.is_cancelled())
    }

    pub(crate) fn validate(&self) -> Result<(), FramemoodError> {
        if self.stride == 0 {
            return Err(FramemoodError::InvalidStride);
        }
        if self.client.endpoint.trim().is_empty() {
            return Err(FramemoodError::InvalidConfiguration(
                "endpoint must not be empty".to_string(),
            ));
        }
        if self.credential.is_empty() {
            log::warn!("No API token configured; the endpoint will likely reject requests");
        }
        Ok(())
    }
}

/// Rows of a finished run plus what happened along the way.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub struct PipelineReport {
    /// One row per sampled frame, in frame order.
    pub rows: Vec<EmotionRow>,
    /// Frame count the video reported.
    pub frames_total: u64,
    /// Frames that were sampled and classified.
    pub frames_sampled: u64,
    /// Sampled frames whose classification failed.
    pub failures: u64,
    /// `true` when the video ran out of data before its reported length.
    pub stopped_early: bool,
    /// `true` when the cancellation token fired before every frame was
    /// classified. `rows` then holds the frames finished so far.
    pub cancelled: bool,
}

/// Run the pipeline and return the rows.
///
/// # Errors
///
/// - [`FramemoodError::InvalidStride`] for a zero stride.
/// - [`FramemoodError::UnreadableMedia`] if the video cannot be opened.
///
/// A cancelled run is not an error: the rows classified before the token
/// fired are returned.
pub fn run(config: &PipelineConfig) -> Result<Vec<EmotionRow>, FramemoodError> {
    run_with_report(config).map(|report| report.rows)
}

/// Run the pipeline and return the rows with run statistics.
pub fn run_with_report(config: &PipelineConfig) -> Result<PipelineReport, FramemoodError> {
    config.validate()?;
    let source = VideoSource::open(&config.video_path)?;
    let client = InferenceClient::new(config.client.clone())?;
    drive(source, &client, config)
}

/// Drive any reader through any classifier. [`run_with_report`] is this over
/// FFmpeg and HTTPS.
pub fn drive<R: FrameReader, C: Classify>(
    reader: R,
    classifier: &C,
    config: &PipelineConfig,
) -> Result<PipelineReport, FramemoodError> {
    config.validate()?;
    let mut rows = RowCollector::start(reader.total_frames(), config);
    let mut frames = reader.sample(config.stride)?;

    loop {
        if config.is_cancelled() {
            log::info!("Run cancelled after {} frames", rows.len());
            return Ok(rows.finish(frames.stopped_early(), true));
        }
        let Some(frame) = frames.next() else {
            break;
        };

        log::debug!("Classifying frame {}", frame.index);
        let result = classifier.classify(&frame.image, &config.credential);
        rows.record(frame.index, &result);
    }

    Ok(rows.finish(frames.stopped_early(), false))
}

/// Accumulates rows in frame order and keeps the run statistics.
pub(crate) struct RowCollector {
    rows: Vec<EmotionRow>,
    frames_total: u64,
    failures: u64,
    tracker: ProgressTracker,
}

impl RowCollector {
    pub(crate) fn start(frames_total: u64, config: &PipelineConfig) -> Self {
        let expected = sampled_count(frames_total, config.stride);
        log::info!(
            "Sampling {expected} of {frames_total} frames (stride {})",
            config.stride
        );
        Self {
            rows: Vec::with_capacity(
                usize::try_from(expected.min(MAX_PREALLOCATED_ROWS)).unwrap_or_default(),
            ),
            frames_total,
            failures: 0,
            tracker: ProgressTracker::new(config.progress.clone(), Some(expected)),
        }
    }

    #[cfg(test)]
    pub(crate) fn capacity(&self) -> usize {
        self.rows.capacity()
    }

    pub(crate) fn len(&self) -> usize {
        self.rows.len()
    }

    pub(crate) fn record(&mut self, frame: u64, result: &InferenceResult) {
        let failed = !result.is_success();
        if failed {
            self.failures += 1;
        }
        let row = to_row(frame, result);
        log::debug!("Frame {}: {:?}", row.frame, row.scores());
        self.tracker.advance(frame, failed);
        self.rows.push(row);
    }

    pub(crate) fn finish(self, stopped_early: bool, cancelled: bool) -> PipelineReport {
        let report = PipelineReport {
            frames_sampled: self.rows.len() as u64,
            rows: self.rows,
            frames_total: self.frames_total,
            failures: self.failures,
            stopped_early,
            cancelled,
        };
        let note = if cancelled {
            ", cancelled"
        } else if stopped_early {
            ", video ended early"
        } else {
            ""
        };
        log::info!(
            "Classified {} frames ({} failed{note})",
            report.frames_sampled,
            report.failures,
        );
        report
    }
}
