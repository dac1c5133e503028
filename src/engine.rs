//! Diarization engine interface
//!
//! The worker pool consumes diarization through the narrow [`DiarizationEngine`] trait: a
//! local audio path goes in, ordered speaker turns come out. The engine is a heavyweight,
//! long-lived dependency owned by the application and injected into the pool; its
//! `diarize` call is blocking and is always run on the blocking thread pool.
//!
//! [`CommandEngine`] is the production implementation. It runs an external diarization
//! program and parses the JSON it prints on stdout:
//!
//! ```json
//! {"segments": [{"speaker": "SPEAKER_00", "start": 0.0, "end": 4.2}]}
//! ```

use log::{debug, info, warn};
use serde::Deserialize;
use std::path::Path;
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use thiserror::Error;

use crate::config::EngineConfig;

/// A speaker turn as reported by the engine
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RawSegment {
    pub speaker: String,
    pub start: f64,
    pub end: f64,
}

/// Output of one diarization call
#[derive(Debug, Clone, PartialEq)]
pub struct EngineOutput {
    /// Speaker turns in the order the engine produced them
    pub segments: Vec<RawSegment>,
    /// Wall time spent inside the engine
    pub processing_time_ms: u64,
}

/// Diarization engine errors
#[derive(Error, Debug)]
pub enum EngineError {
    /// The engine has not been initialized or is unavailable
    #[error("Diarization engine not ready: {0}")]
    NotReady(String),
    /// The engine program could not be started
    #[error("Failed to run diarization command: {0}")]
    Launch(#[from] std::io::Error),
    /// The engine ran and reported a failure
    #[error("Diarization failed: {0}")]
    Failed(String),
    /// The engine output could not be understood
    #[error("Invalid diarization output: {0}")]
    InvalidOutput(String),
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::InvalidOutput(err.to_string())
    }
}

/// Contract between the worker pool and the diarization engine
pub trait DiarizationEngine: Send + Sync {
    /// Diarize a local audio file. Labels are only stable within this call.
    fn diarize(&self, audio_path: &Path) -> Result<EngineOutput, EngineError>;

    /// Load or check whatever the engine needs before the first call
    fn warmup(&self) -> Result<(), EngineError> {
        Ok(())
    }

    /// Number of simultaneous `diarize` calls the engine can sustain, `None` if unbounded.
    /// Engines that are not safe for concurrent use keep the default of one.
    fn max_concurrency(&self) -> Option<usize> {
        Some(1)
    }

    /// Whether the engine has been warmed up
    fn is_ready(&self) -> bool {
        true
    }
}

#[derive(Deserialize)]
struct CommandOutput {
    #[serde(default)]
    segments: Vec<RawSegment>,
}

/// Engine backed by an external diarization program
pub struct CommandEngine {
    config: EngineConfig,
    ready: AtomicBool,
}

impl CommandEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            ready: AtomicBool::new(false),
        }
    }

    /// Run the program once, optionally constraining the speaker count
    fn run(&self, audio_path: &Path, bounded: bool) -> Result<Vec<RawSegment>, EngineError> {
        let mut command = Command::new(&self.config.command_path);
        command.arg(audio_path);

        if bounded {
            command
                .arg("--min_speakers")
                .arg(self.config.min_speakers.to_string())
                .arg("--max_speakers")
                .arg(self.config.max_speakers.to_string());
        }

        debug!("Running diarization command: {:?}", command);
        let output = command.output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(EngineError::Failed(if stderr.is_empty() {
                format!("command exited with {}", output.status)
            } else {
                stderr
            }));
        }

        let parsed: CommandOutput = serde_json::from_slice(&output.stdout)?;
        for segment in &parsed.segments {
            if !(segment.start.is_finite() && segment.end.is_finite()) || segment.end < segment.start {
                return Err(EngineError::InvalidOutput(format!(
                    "segment for {} has invalid bounds {}..{}",
                    segment.speaker, segment.start, segment.end
                )));
            }
        }
        Ok(parsed.segments)
    }
}

impl DiarizationEngine for CommandEngine {
    fn diarize(&self, audio_path: &Path) -> Result<EngineOutput, EngineError> {
        let started = Instant::now();

        let bounded = self.run(audio_path, true)?;
        let segments = if bounded.is_empty() {
            info!(
                "No segments with speaker bounds {}..{}, retrying without bounds",
                self.config.min_speakers, self.config.max_speakers
            );
            self.run(audio_path, false)?
        } else {
            bounded
        };

        self.ready.store(true, Ordering::Release);
        let processing_time_ms = started.elapsed().as_millis() as u64;
        info!(
            "Diarization completed: {} segments in {} ms",
            segments.len(),
            processing_time_ms
        );

        Ok(EngineOutput {
            segments,
            processing_time_ms,
        })
    }

    fn warmup(&self) -> Result<(), EngineError> {
        let command = Path::new(&self.config.command_path);
        if !command.is_file() {
            warn!("Diarization command not found: {}", command.display());
            return Err(EngineError::NotReady(format!(
                "command {} does not exist",
                command.display()
            )));
        }
        self.ready.store(true, Ordering::Release);
        info!("Diarization engine ready: {}", command.display());
        Ok(())
    }

    fn max_concurrency(&self) -> Option<usize> {
        Some(self.config.max_concurrency.max(1))
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }
}
