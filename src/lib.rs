// Diarization API Library
//
// This crate provides an HTTP API for asynchronous speaker diarization.
// Jobs are queued by the HTTP layer and processed by a fixed pool of workers that
// download the audio, run the diarization engine, label speaker roles and report
// the outcome to a caller-supplied webhook.

pub mod audio_fetcher;
pub mod callback;
pub mod config;
pub mod config_loader;
pub mod config_validator;
pub mod engine;
pub mod error;
pub mod file_utils;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod queue_manager;
pub mod role_estimator;
pub mod worker_pool;


// Re-export common types for easier access
pub use config::AppConfig;
pub use config_validator::ConfigValidator;
pub use engine::{CommandEngine, DiarizationEngine, EngineError};
pub use error::HandlerError;
pub use metrics::Metrics;
pub use models::{DiarizationRequest, ErrorResponse, StatusResponse, SubmitResponse};
pub use queue_manager::{Job, JobStatus, QueueManager};
pub use role_estimator::Role;
pub use worker_pool::WorkerPool;
