//! Queue Manager for Diarization API
//!
//! This module holds the job registry and the FIFO queue that hands pending job ids to the
//! worker pool. The registry is the single source of truth for job status: jobs are created
//! here as `Pending`, and the worker that dequeues a job is the only caller that moves it
//! through `Processing` to a terminal state. Jobs are never removed.

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use uuid::Uuid;

use crate::metrics::Metrics;
use crate::role_estimator::Role;

/// Job status enum for tracking the progress of diarization jobs
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Job is waiting in the queue
    Pending,
    /// Job is owned by a worker
    Processing,
    /// Job finished with a result
    Completed,
    /// Job finished with an error message
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Transitions only move forward: pending -> processing -> completed | failed
    fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A speaker turn with the role estimated for its speaker
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Segment {
    /// Speaker label, only meaningful within one diarization call
    pub speaker: String,
    /// Start offset in seconds
    pub start: f64,
    /// End offset in seconds
    pub end: f64,
    /// Role derived from relative talk time
    pub role: Role,
}

/// Diarization result stored on completed jobs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiarizationResult {
    pub segments: Vec<Segment>,
    pub processing_time_ms: u64,
}

/// Diarization job record
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Job {
    /// Unique identifier for the job
    #[serde(rename = "job_id")]
    pub id: String,
    /// Remote audio to analyze
    pub audio_url: String,
    /// Webhook notified once the job is terminal
    pub callback_url: String,
    /// Caller metadata, passed through verbatim
    pub metadata: Option<Map<String, Value>>,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<DiarizationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Job {
    fn new(audio_url: String, callback_url: String, metadata: Option<Map<String, Value>>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            audio_url,
            callback_url,
            metadata,
            status: JobStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
        }
    }
}

/// Queue manager error types
#[derive(Error, Debug, PartialEq)]
pub enum QueueError {
    /// Job not found in the registry
    #[error("Job not found: {0}")]
    JobNotFound(String),
    /// Attempted a backwards or skipping status change
    #[error("Invalid transition for job {job_id}: {from} -> {to}")]
    InvalidTransition {
        job_id: String,
        from: JobStatus,
        to: JobStatus,
    },
}

/// Internal state of the queue manager
struct QueueState {
    /// Ids of jobs waiting to be processed, oldest first
    queue: VecDeque<String>,
    /// Every job ever submitted, by id
    jobs: HashMap<String, Job>,
    /// Jobs currently in `Processing`, maintained by `transition`
    processing: usize,
}

/// Job registry and FIFO queue shared by the HTTP layer and the worker pool
#[derive(Clone)]
pub struct QueueManager {
    /// Internal state protected by a mutex
    state: Arc<Mutex<QueueState>>,
    /// One permit per queued id; workers wait on it with a timeout
    available: Arc<Semaphore>,
    /// Metrics collection and export
    metrics: Metrics,
}

impl QueueManager {
    pub fn new(metrics: Metrics) -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState {
                queue: VecDeque::new(),
                jobs: HashMap::new(),
                processing: 0,
            })),
            available: Arc::new(Semaphore::new(0)),
            metrics,
        }
    }

    /// Create a pending job and enqueue it. Returns without waiting for processing.
    pub async fn submit(
        &self,
        audio_url: String,
        callback_url: String,
        metadata: Option<Map<String, Value>>,
    ) -> String {
        let job = Job::new(audio_url, callback_url, metadata);
        let job_id = job.id.clone();

        let queue_size = {
            let mut state = self.state.lock().await;
            state.jobs.insert(job_id.clone(), job);
            state.queue.push_back(job_id.clone());
            state.queue.len()
        };

        // Published after the push so a woken worker always finds an id
        self.available.add_permits(1);

        self.metrics.record_job_submitted().await;
        self.metrics.record_queue_size(queue_size).await;

        info!("Job {} added to queue (queue size: {})", job_id, queue_size);
        job_id
    }

    /// Snapshot of a job
    pub async fn status(&self, job_id: &str) -> Result<Job, QueueError> {
        let state = self.state.lock().await;
        state
            .jobs
            .get(job_id)
            .cloned()
            .ok_or_else(|| QueueError::JobNotFound(job_id.to_string()))
    }

    /// Wait up to `timeout` for the next queued job id
    pub async fn dequeue(&self, timeout: Duration) -> Option<String> {
        let permit = match tokio::time::timeout(timeout, self.available.acquire()).await {
            Ok(Ok(permit)) => permit,
            // Timed out, or the semaphore was closed
            _ => return None,
        };
        let (job_id, queue_size) = {
            let mut state = self.state.lock().await;
            // Consumed only once the lock is held, so a cancelled waiter gives it back
            permit.forget();
            let job_id = state.queue.pop_front();
            (job_id, state.queue.len())
        };
        self.metrics.record_queue_size(queue_size).await;

        if let Some(id) = &job_id {
            debug!("Dequeued job {}", id);
        }
        job_id
    }

    /// Move a pending job to processing and stamp its start time
    pub async fn mark_processing(&self, job_id: &str) -> Result<Job, QueueError> {
        self.transition(job_id, JobStatus::Processing, |job| {
            job.started_at.get_or_insert_with(Utc::now);
        })
        .await
    }

    /// Store the result of a processing job and mark it completed
    pub async fn complete(
        &self,
        job_id: &str,
        result: DiarizationResult,
    ) -> Result<Job, QueueError> {
        self.transition(job_id, JobStatus::Completed, |job| {
            job.result = Some(result);
            job.completed_at.get_or_insert_with(Utc::now);
        })
        .await
    }

    /// Record the error of a processing job and mark it failed
    pub async fn fail(&self, job_id: &str, error: String) -> Result<Job, QueueError> {
        self.transition(job_id, JobStatus::Failed, |job| {
            job.error = Some(error);
            job.completed_at.get_or_insert_with(Utc::now);
        })
        .await
    }

    /// Apply a forward transition and publish the new processing count
    async fn transition<F>(
        &self,
        job_id: &str,
        next: JobStatus,
        apply: F,
    ) -> Result<Job, QueueError>
    where
        F: FnOnce(&mut Job),
    {
        let (snapshot, processing) = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            let job = state
                .jobs
                .get_mut(job_id)
                .ok_or_else(|| QueueError::JobNotFound(job_id.to_string()))?;

            if !job.status.can_transition_to(next) {
                return Err(QueueError::InvalidTransition {
                    job_id: job_id.to_string(),
                    from: job.status,
                    to: next,
                });
            }

            if next == JobStatus::Processing {
                state.processing += 1;
            } else if job.status == JobStatus::Processing {
                state.processing = state.processing.saturating_sub(1);
            }

            job.status = next;
            apply(job);
            (job.clone(), state.processing)
        };

        self.metrics.record_jobs_processing(processing).await;
        Ok(snapshot)
    }

    /// Get the position of a job in the queue (1-based index)
    ///
    /// Returns Some(position) if the job is waiting in the queue, None otherwise.
    pub async fn queue_position(&self, job_id: &str) -> Result<Option<usize>, QueueError> {
        let state = self.state.lock().await;

        match state.jobs.get(job_id) {
            None => Err(QueueError::JobNotFound(job_id.to_string())),
            Some(job) if job.status != JobStatus::Pending => Ok(None),
            Some(_) => Ok(state
                .queue
                .iter()
                .position(|id| id == job_id)
                .map(|position| position + 1)),
        }
    }

    /// Number of jobs waiting in the queue
    pub async fn queued_count(&self) -> usize {
        self.state.lock().await.queue.len()
    }

    /// Number of jobs currently owned by a worker
    pub async fn processing_count(&self) -> usize {
        self.state.lock().await.processing
    }
}
