//! Single-job diarization pipeline
//!
//! Fetch the audio into a scratch file, run the engine on the blocking thread pool while
//! holding an engine slot, then label speakers by talk time. Used by the worker pool for
//! queued jobs and by the synchronous HTTP route.

use log::debug;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;

use crate::audio_fetcher::{AudioFetcher, FetchError};
use crate::engine::{DiarizationEngine, EngineError, EngineOutput};
use crate::queue_manager::{DiarizationResult, Segment};
use crate::role_estimator;

/// Pipeline errors
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    /// Engine slots closed, the blocking task died, or no HTTP client could be built
    #[error("Diarization engine unavailable: {0}")]
    Unavailable(String),
}

/// Fetch → diarize → label, sharing the engine slots of its owner
#[derive(Clone)]
pub struct Pipeline {
    fetcher: AudioFetcher,
    engine: Arc<dyn DiarizationEngine>,
    engine_slots: Arc<Semaphore>,
}

impl Pipeline {
    pub fn new(
        fetcher: AudioFetcher,
        engine: Arc<dyn DiarizationEngine>,
        engine_slots: Arc<Semaphore>,
    ) -> Self {
        Self {
            fetcher,
            engine,
            engine_slots,
        }
    }

    /// Diarize the audio at `audio_url`. The scratch file is gone once this returns,
    /// or once the engine call finishes if the caller is cancelled first.
    pub async fn run(&self, audio_url: &str) -> Result<DiarizationResult, PipelineError> {
        let scratch = self.fetcher.fetch(audio_url).await?;

        let slot = Arc::clone(&self.engine_slots)
            .acquire_owned()
            .await
            .map_err(|e| PipelineError::Unavailable(e.to_string()))?;
        let engine = Arc::clone(&self.engine);

        // Slot and scratch file live inside the blocking task, which outlives an aborted caller
        let output = tokio::task::spawn_blocking(move || {
            let _slot = slot;
            let output = engine.diarize(scratch.path());
            drop(scratch);
            output
        })
        .await
        .map_err(|e| PipelineError::Unavailable(format!("diarization task failed: {}", e)))??;

        debug!("Labelling {} segments", output.segments.len());
        Ok(label_segments(output))
    }
}

/// Attach an estimated role to every segment
pub fn label_segments(output: EngineOutput) -> DiarizationResult {
    let roles = role_estimator::estimate(&output.segments);
    let segments = output
        .segments
        .into_iter()
        .map(|segment| Segment {
            role: role_estimator::role_for(&roles, &segment.speaker),
            speaker: segment.speaker,
            start: segment.start,
            end: segment.end,
        })
        .collect();

    DiarizationResult {
        segments,
        processing_time_ms: output.processing_time_ms,
    }
}
