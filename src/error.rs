// Error handling for Diarization API
//
// This module defines the HTTP layer error type and its mapping to responses.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;

use crate::models::ErrorResponse;
use crate::pipeline::PipelineError;
use crate::queue_manager::QueueError;

/// Errors that can occur in the Diarization API handlers
#[derive(Error, Debug)]
pub enum HandlerError {
    /// Malformed body or invalid URL
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// Missing or wrong API key
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Engine warmup failed, or no engine slot could be taken
    #[error("Diarization engine unavailable: {0}")]
    EngineUnavailable(String),

    /// The audio host could not be reached or refused the download
    #[error("Audio download failed: {0}")]
    AudioFetchFailed(String),

    #[error("{0}")]
    DiarizationFailed(String),

    #[error("Queue error: {0}")]
    QueueError(String),

    #[error("Metrics error: {0}")]
    MetricsError(String),
}

impl ResponseError for HandlerError {
    fn status_code(&self) -> StatusCode {
        match self {
            HandlerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            HandlerError::JobNotFound(_) => StatusCode::NOT_FOUND,
            HandlerError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            HandlerError::EngineUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            HandlerError::AudioFetchFailed(_) => StatusCode::BAD_GATEWAY,
            HandlerError::DiarizationFailed(_)
            | HandlerError::QueueError(_)
            | HandlerError::MetricsError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.to_string(),
            status: None,
        })
    }
}

/// Convert QueueError to HandlerError
impl From<QueueError> for HandlerError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::JobNotFound(id) => HandlerError::JobNotFound(id),
            other => HandlerError::QueueError(other.to_string()),
        }
    }
}

impl From<PipelineError> for HandlerError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Fetch(e) => HandlerError::AudioFetchFailed(e.to_string()),
            PipelineError::Engine(e) => HandlerError::DiarizationFailed(e.to_string()),
            PipelineError::Unavailable(reason) => HandlerError::EngineUnavailable(reason),
        }
    }
}

impl From<crate::metrics::MetricsError> for HandlerError {
    fn from(err: crate::metrics::MetricsError) -> Self {
        HandlerError::MetricsError(err.to_string())
    }
}
