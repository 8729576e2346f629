//! Progress reporting and cancellation support.
//!
//! A run can take minutes: every sampled frame is a network round trip and a
//! cold model may add a long retry delay. [`ProgressCallback`] observes the
//! run frame by frame and [`CancellationToken`] stops it between frames.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use framemood::{Credential, PipelineConfig, ProgressCallback, ProgressInfo};
//!
//! struct PrintProgress;
//!
//! impl ProgressCallback for PrintProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         if let Some(pct) = info.percentage {
//!             println!("frame {:?}: {pct:.1}%", info.current_frame);
//!         }
//!     }
//! }
//!
//! let config = PipelineConfig::new("input.mp4", Credential::new("hf_xxx"))
//!     .with_progress(Arc::new(PrintProgress));
//! let rows = framemood::run(&config)?;
//! # Ok::<(), framemood::FramemoodError>(())
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::{Duration, Instant};

/// A snapshot of run progress, delivered after each classified frame.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Frames classified so far.
    pub current: u64,
    /// Frames expected to be sampled, if known.
    pub total: Option<u64>,
    /// Completion percentage (0.0 – 100.0), if `total` is known.
    pub percentage: Option<f32>,
    /// Wall-clock time since the run started.
    pub elapsed: Duration,
    /// Estimated time remaining, based on throughput so far.
    pub estimated_remaining: Option<Duration>,
    /// Index of the frame just classified.
    pub current_frame: Option<u64>,
    /// Whether that frame's classification failed.
    pub failed: bool,
}

/// Receives progress updates during a run.
///
/// Callbacks observe but cannot halt the run; use [`CancellationToken`] for
/// that.
pub trait ProgressCallback: Send + Sync {
    /// Called after each frame.
    fn on_progress(&self, info: &ProgressInfo);
}

/// Discards every notification. The default callback.
pub(crate) struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_progress(&self, _info: &ProgressInfo) {}
}

/// Cooperative cancellation token backed by an [`AtomicBool`].
///
/// ```
/// use framemood::CancellationToken;
///
/// let token = CancellationToken::new();
/// let handle = token.clone();
/// handle.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new, non-cancelled token.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation. All clones observe it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks timing for a run and emits callbacks.
pub(crate) struct ProgressTracker {
    callback: Arc<dyn ProgressCallback>,
    total: Option<u64>,
    current: u64,
    start_time: Instant,
}

impl ProgressTracker {
    pub(crate) fn new(callback: Arc<dyn ProgressCallback>, total: Option<u64>) -> Self {
        Self {
            callback,
            total,
            current: 0,
            start_time: Instant::now(),
        }
    }

    /// Record one classified frame and notify the callback.
    pub(crate) fn advance(&mut self, frame: u64, failed: bool) {
        self.current += 1;
        let info = self.snapshot(Some(frame), failed);
        self.callback.on_progress(&info);
    }

    fn snapshot(&self, current_frame: Option<u64>, failed: bool) -> ProgressInfo {
        let elapsed = self.start_time.elapsed();

        let percentage = self
            .total
            .filter(|&total| total > 0)
            .map(|total| (self.current as f32 / total as f32) * 100.0);

        let estimated_remaining = if self.current > 0 {
            self.total.and_then(|total| {
                let remaining = total.saturating_sub(self.current);
                let per_item = elapsed.div_f64(self.current as f64);
                per_item.checked_mul(u32::try_from(remaining).ok()?)
            })
        } else {
            None
        };

        ProgressInfo {
            current: self.current,
            total: self.total,
            percentage,
            elapsed,
            estimated_remaining,
            current_frame,
            failed,
        }
    }
}
