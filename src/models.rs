// Diarization API data models
//
// This module contains the request and response types of the HTTP API.

use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::HandlerError;
use crate::queue_manager::{Job, JobStatus};

/// Body of a diarization request
#[derive(Debug, Deserialize)]
pub struct DiarizationRequest {
    /// Remote audio to analyze
    pub audio_url: String,
    /// Webhook notified when the job finishes
    pub callback_url: String,
    /// Opaque caller data echoed back in the callback
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

impl DiarizationRequest {
    /// Both URLs must be absolute http(s) URLs
    pub fn validate(&self) -> Result<(), HandlerError> {
        validate_url("audio_url", &self.audio_url)?;
        validate_url("callback_url", &self.callback_url)
    }
}

/// Body of a synchronous diarization request
#[derive(Debug, Deserialize)]
pub struct SyncDiarizationRequest {
    pub audio_url: String,
}

impl SyncDiarizationRequest {
    pub fn validate(&self) -> Result<(), HandlerError> {
        validate_url("audio_url", &self.audio_url)
    }
}

fn validate_url(field: &str, value: &str) -> Result<(), HandlerError> {
    let url = Url::parse(value)
        .map_err(|e| HandlerError::InvalidRequest(format!("{} is not a valid URL: {}", field, e)))?;

    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(()),
        "http" | "https" => Err(HandlerError::InvalidRequest(format!(
            "{} has no host",
            field
        ))),
        scheme => Err(HandlerError::InvalidRequest(format!(
            "{} must use http or https, not {}",
            field, scheme
        ))),
    }
}

/// Response for an accepted diarization request
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    /// Job ID assigned to the request
    pub job_id: String,
    pub status: JobStatus,
    /// URL to poll for the job status
    pub status_url: String,
}

/// Job snapshot returned by the status endpoint
#[derive(Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub job: Job,
    /// Position in the queue (1-based), if the job is pending
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<usize>,
}

/// Liveness and engine readiness
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
    pub timestamp: DateTime<Utc>,
}

/// Readiness check answer
#[derive(Debug, Serialize, Deserialize)]
pub struct ReadinessResponse {
    /// "ready" or "not_ready"
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Error response for API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,
    /// Optional status information
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Success response for API
#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
    /// Message describing the successful operation
    pub message: String,
}
