// API route handlers for Diarization API
//
// This module contains the route handlers for the Diarization API.
// Queued requests only talk to the queue manager's submit/status contract and are
// processed by the worker pool. `/diarize/sync` borrows the pool's pipeline directly.

use actix_web::{get, http::StatusCode, post, web, HttpResponse, ResponseError};
use chrono::Utc;
use log::{error, info};
use serde::Serialize;
use std::time::Instant;

use crate::config::AppConfig;
use crate::engine::DiarizationEngine;
use crate::error::HandlerError;
use crate::metrics::Metrics;
use crate::models::{
    DiarizationRequest, HealthResponse, ReadinessResponse, StatusResponse, SubmitResponse,
    SuccessResponse, SyncDiarizationRequest,
};
use crate::queue_manager::{JobStatus, QueueManager};
use crate::worker_pool::WorkerPool;

/// Handler for diarization requests
///
/// Validates the request, creates a pending job and returns immediately with
/// the job id. The outcome is delivered to `callback_url` once processing ends.
#[post("/diarize")]
pub async fn diarize(
    body: web::Json<DiarizationRequest>,
    queue_manager: web::Data<QueueManager>,
    metrics: web::Data<Metrics>,
) -> Result<HttpResponse, HandlerError> {
    let start_time = Instant::now();
    let request = body.into_inner();
    request.validate()?;

    let job_id = queue_manager
        .submit(request.audio_url, request.callback_url, request.metadata)
        .await;
    let status_url = format!("/diarize/{}", job_id);

    metrics
        .record_http_request(
            "/diarize",
            "POST",
            "202",
            start_time.elapsed().as_secs_f64(),
        )
        .await;

    Ok(HttpResponse::Accepted().json(SubmitResponse {
        job_id,
        status: JobStatus::Pending,
        status_url,
    }))
}

/// Handler for synchronous diarization
///
/// Downloads and diarizes the audio within the request and returns the labelled segments.
/// Shares engine slots with the worker pool, so it waits behind queued jobs already running.
#[post("/diarize/sync")]
pub async fn diarize_sync(
    body: web::Json<SyncDiarizationRequest>,
    pool: web::Data<WorkerPool>,
    metrics: web::Data<Metrics>,
) -> Result<HttpResponse, HandlerError> {
    let start_time = Instant::now();
    let request = body.into_inner();
    request.validate()?;

    info!("Synchronous diarization of {}", request.audio_url);
    let outcome = pool.diarize_now(&request.audio_url).await.map_err(|e| {
        error!("Synchronous diarization failed: {}", e);
        HandlerError::from(e)
    });
    let status = match &outcome {
        Ok(_) => StatusCode::OK,
        Err(e) => e.status_code(),
    };
    metrics
        .record_http_request(
            "/diarize/sync",
            "POST",
            status.as_str(),
            start_time.elapsed().as_secs_f64(),
        )
        .await;

    Ok(HttpResponse::Ok().json(outcome?))
}

/// Handler for job status requests
///
/// Returns the job snapshot, with its queue position while it is still pending.
#[get("/diarize/{job_id}")]
pub async fn job_status(
    job_id: web::Path<String>,
    queue_manager: web::Data<QueueManager>,
    metrics: web::Data<Metrics>,
) -> Result<HttpResponse, HandlerError> {
    let start_time = Instant::now();
    let job_id = job_id.into_inner();

    let job = queue_manager.status(&job_id).await?;
    let queue_position = if job.status == JobStatus::Pending {
        queue_manager.queue_position(&job_id).await?
    } else {
        None
    };

    metrics
        .record_http_request(
            "/diarize/{job_id}",
            "GET",
            "200",
            start_time.elapsed().as_secs_f64(),
        )
        .await;

    Ok(HttpResponse::Ok().json(StatusResponse {
        job,
        queue_position,
    }))
}

fn health_response(engine: &dyn DiarizationEngine) -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "healthy".to_string(),
        model_loaded: engine.is_ready(),
        timestamp: Utc::now(),
    })
}

#[get("/health")]
pub async fn health(engine: web::Data<dyn DiarizationEngine>) -> HttpResponse {
    health_response(engine.get_ref())
}

#[get("/")]
pub async fn root(engine: web::Data<dyn DiarizationEngine>) -> HttpResponse {
    health_response(engine.get_ref())
}

/// Readiness check: 503 until the engine has been warmed up
#[get("/ready")]
pub async fn ready(engine: web::Data<dyn DiarizationEngine>) -> HttpResponse {
    if engine.is_ready() {
        HttpResponse::Ok().json(ReadinessResponse {
            status: "ready".to_string(),
            reason: None,
        })
    } else {
        HttpResponse::ServiceUnavailable().json(ReadinessResponse {
            status: "not_ready".to_string(),
            reason: Some("Diarization engine not loaded".to_string()),
        })
    }
}

/// Handler for engine warmup
///
/// Runs the engine's warmup hook on the blocking pool so the first job does not pay
/// the initialization cost.
#[post("/warmup")]
pub async fn warmup(
    engine: web::Data<dyn DiarizationEngine>,
) -> Result<HttpResponse, HandlerError> {
    let engine = engine.into_inner();
    web::block(move || engine.warmup())
        .await
        .map_err(|e| HandlerError::EngineUnavailable(e.to_string()))?
        .map_err(|e| {
            error!("Engine warmup failed: {}", e);
            HandlerError::EngineUnavailable(e.to_string())
        })?;

    info!("Engine warmup completed");
    Ok(HttpResponse::Ok().json(SuccessResponse {
        success: true,
        message: "Diarization engine is ready".to_string(),
    }))
}

/// API status endpoint
///
/// Reports the effective configuration and the current queue state.
#[get("/status")]
pub async fn api_status(
    config: web::Data<AppConfig>,
    queue_manager: web::Data<QueueManager>,
    pool: web::Data<WorkerPool>,
    engine: web::Data<dyn DiarizationEngine>,
) -> HttpResponse {
    #[derive(Serialize)]
    struct ApiStatusResponse {
        server: ServerInfo,
        processing: ProcessingInfo,
        callbacks: CallbackInfo,
        queue_state: QueueState,
    }

    #[derive(Serialize)]
    struct ServerInfo {
        host: String,
        port: u16,
        worker_number: usize,
        authorization_enabled: bool,
        metrics_backend: String,
    }

    #[derive(Serialize)]
    struct ProcessingInfo {
        pool_running: bool,
        max_concurrent_jobs: usize,
        engine_concurrency: usize,
        engine_ready: bool,
        min_speakers: u32,
        max_speakers: u32,
        download_timeout_seconds: u64,
    }

    #[derive(Serialize)]
    struct CallbackInfo {
        timeout_seconds: u64,
        max_retries: u32,
        backoff_base_ms: u128,
    }

    #[derive(Serialize)]
    struct QueueState {
        queued_jobs: usize,
        processing_jobs: usize,
    }

    let response = ApiStatusResponse {
        server: ServerInfo {
            host: config.server.host.to_string(),
            port: config.server.port,
            worker_number: config.server.worker_count(),
            authorization_enabled: config.server.api_key.is_some(),
            metrics_backend: config.server.metrics_backend.clone(),
        },
        processing: ProcessingInfo {
            pool_running: pool.is_running().await,
            max_concurrent_jobs: pool.worker_count(),
            engine_concurrency: pool.engine_concurrency(),
            engine_ready: engine.is_ready(),
            min_speakers: config.engine.min_speakers,
            max_speakers: config.engine.max_speakers,
            download_timeout_seconds: config.worker.download_timeout.as_secs(),
        },
        callbacks: CallbackInfo {
            timeout_seconds: config.worker.callback_timeout.as_secs(),
            max_retries: config.worker.max_retries,
            backoff_base_ms: config.worker.backoff_base.as_millis(),
        },
        queue_state: QueueState {
            queued_jobs: queue_manager.queued_count().await,
            processing_jobs: queue_manager.processing_count().await,
        },
    };

    HttpResponse::Ok().json(response)
}

/// Metrics endpoint handler
#[get("/metrics")]
pub async fn metrics_handler(metrics: web::Data<Metrics>) -> Result<HttpResponse, HandlerError> {
    let data = metrics.export().await?;
    Ok(HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4; charset=utf-8")
        .body(data))
}
