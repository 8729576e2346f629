//! Concurrent classification of frame batches.
//!
//! Decoding stays sequential: the media handle is never shared. Sampled
//! frames are gathered into batches of `batch_size` and each batch is sent to
//! the endpoint across [`rayon`] worker threads. Results are collected back in
//! frame order before aggregation, so the rows are identical to a sequential
//! run given the same responses.

use ::rayon::iter::{IntoParallelRefIterator, ParallelIterator};

use crate::{
    client::{InferenceClient, InferenceResult},
    error::FramemoodError,
    pipeline::{Classify, PipelineConfig, PipelineReport, RowCollector},
    source::{Frame, FrameReader, VideoSource},
};

/// Like [`run_with_report`](crate::run_with_report), with up to `batch_size`
/// requests in flight.
pub fn run_parallel(
    config: &PipelineConfig,
    batch_size: usize,
) -> Result<PipelineReport, FramemoodError> {
    config.validate()?;
    let source = VideoSource::open(config.video_path())?;
    let client = InferenceClient::new(config.client_options().clone())?;
    drive_parallel(source, &client, config, batch_size)
}

/// Batched counterpart of [`drive`](crate::drive).
pub fn drive_parallel<R: FrameReader, C: Classify + Sync>(
    reader: R,
    classifier: &C,
    config: &PipelineConfig,
    batch_size: usize,
) -> Result<PipelineReport, FramemoodError> {
    config.validate()?;
    let batch_size = batch_size.max(1);
    let mut rows = RowCollector::start(reader.total_frames(), config);
    let mut frames = reader.sample(config.stride())?;

    loop {
        if config.is_cancelled() {
            log::info!("Run cancelled after {} frames", rows.len());
            return Ok(rows.finish(frames.stopped_early(), true));
        }

        let batch: Vec<Frame> = frames.by_ref().take(batch_size).collect();
        if batch.is_empty() {
            break;
        }
        log::debug!(
            "Classifying frames {}..={} in parallel",
            batch[0].index,
            batch[batch.len() - 1].index
        );

        let results: Vec<InferenceResult> = batch
            .par_iter()
            .map(|frame| classifier.classify(&frame.image, &config.credential))
            .collect();

        for (frame, result) in batch.iter().zip(&results) {
            rows.record(frame.index, result);
        }
    }

    Ok(rows.finish(frames.stopped_early(), false))
}
