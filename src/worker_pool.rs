//! Worker pool for Diarization API
//!
//! A fixed number of worker tasks drain the job queue. Each worker owns a job from dequeue
//! to terminal state and runs it end to end: download the audio into a scratch file,
//! diarize it on the blocking thread pool, estimate speaker roles, store the outcome in the
//! registry, then notify the job's webhook. A failure inside one job only fails that job;
//! the worker moves on to the next one.
//!
//! Diarization calls are additionally gated by a semaphore sized
//! `min(max_concurrent_jobs, engine.max_concurrency())`. Synchronous requests served through
//! [`WorkerPool::diarize_now`] take slots from the same semaphore.
//!
//! Shutdown aborts the worker tasks without draining the queue. Pending jobs and jobs that
//! were in flight stay in the registry in their last state and are not resumed.

use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;

use crate::audio_fetcher::AudioFetcher;
use crate::callback::{CallbackDispatcher, CallbackPayload, DeliveryOutcome};
use crate::config::WorkerConfig;
use crate::engine::DiarizationEngine;
use crate::metrics::Metrics;
use crate::pipeline::{Pipeline, PipelineError};
use crate::queue_manager::{DiarizationResult, Job, QueueError, QueueManager};

/// Worker pool errors
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Fixed-size set of workers draining the job queue
pub struct WorkerPool {
    config: WorkerConfig,
    queue: QueueManager,
    engine: Arc<dyn DiarizationEngine>,
    metrics: Metrics,
    /// Limits simultaneous `diarize` calls across all workers
    engine_slots: Arc<Semaphore>,
    engine_concurrency: usize,
    stop: Arc<AtomicBool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    /// Shared by downloads and callbacks. Built on demand, released by `shutdown`.
    client: Mutex<Option<reqwest::Client>>,
}

impl WorkerPool {
    pub fn new(
        config: WorkerConfig,
        queue: QueueManager,
        engine: Arc<dyn DiarizationEngine>,
        metrics: Metrics,
    ) -> Self {
        let pool_size = config.max_concurrent_jobs.max(1);
        let engine_concurrency = engine
            .max_concurrency()
            .map_or(pool_size, |limit| limit.clamp(1, pool_size));

        Self {
            config,
            queue,
            engine,
            metrics,
            engine_slots: Arc::new(Semaphore::new(engine_concurrency)),
            engine_concurrency,
            stop: Arc::new(AtomicBool::new(false)),
            workers: Mutex::new(Vec::new()),
            client: Mutex::new(None),
        }
    }

    /// Launch the worker tasks. Starting a running pool is a no-op.
    pub async fn start(&self) -> Result<(), PoolError> {
        let mut workers = self.workers.lock().await;
        if !workers.is_empty() {
            debug!("Worker pool already running");
            return Ok(());
        }

        let client = self.shared_client().await?;
        self.stop.store(false, Ordering::Release);

        let pipeline = self.pipeline(client.clone());
        let dispatcher = CallbackDispatcher::new(
            client,
            self.config.callback_timeout,
            self.config.max_retries,
            self.config.backoff_base,
        );

        let pool_size = self.config.max_concurrent_jobs.max(1);
        for worker_id in 0..pool_size {
            let worker = Worker {
                id: worker_id,
                queue: self.queue.clone(),
                pipeline: pipeline.clone(),
                dispatcher: dispatcher.clone(),
                metrics: self.metrics.clone(),
                stop: Arc::clone(&self.stop),
                poll_timeout: self.config.poll_timeout,
            };
            workers.push(tokio::spawn(worker.run()));
        }

        info!(
            "Worker pool started: {} workers, {} concurrent diarization call(s)",
            pool_size, self.engine_concurrency
        );
        Ok(())
    }

    /// Stop the workers, then release the shared HTTP client once no worker holds a copy
    pub async fn shutdown(&self) {
        self.stop.store(true, Ordering::Release);

        let handles = std::mem::take(&mut *self.workers.lock().await);
        for handle in &handles {
            handle.abort();
        }
        for handle in handles {
            match handle.await {
                Err(e) if !e.is_cancelled() => error!("Worker task failed: {}", e),
                _ => {}
            }
        }

        self.client.lock().await.take();
        info!("Worker pool stopped");
    }

    /// Run one diarization outside the queue, sharing the pool's engine slots
    pub async fn diarize_now(&self, audio_url: &str) -> Result<DiarizationResult, PipelineError> {
        let client = self
            .shared_client()
            .await
            .map_err(|e| PipelineError::Unavailable(e.to_string()))?;
        self.pipeline(client).run(audio_url).await
    }

    pub async fn is_running(&self) -> bool {
        !self.workers.lock().await.is_empty()
    }

    pub fn worker_count(&self) -> usize {
        self.config.max_concurrent_jobs.max(1)
    }

    /// Effective number of simultaneous diarization calls
    pub fn engine_concurrency(&self) -> usize {
        self.engine_concurrency
    }

    async fn shared_client(&self) -> Result<reqwest::Client, PoolError> {
        let mut slot = self.client.lock().await;
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }

        let client = reqwest::Client::builder()
            .user_agent(concat!("diarization_api/", env!("CARGO_PKG_VERSION")))
            .build()?;
        *slot = Some(client.clone());
        Ok(client)
    }

    fn pipeline(&self, client: reqwest::Client) -> Pipeline {
        let fetcher = AudioFetcher::new(
            client,
            self.config.scratch_dir.clone(),
            self.config.download_timeout,
        );
        Pipeline::new(fetcher, Arc::clone(&self.engine), Arc::clone(&self.engine_slots))
    }
}

/// State owned by one worker task
struct Worker {
    id: usize,
    queue: QueueManager,
    pipeline: Pipeline,
    dispatcher: CallbackDispatcher,
    metrics: Metrics,
    stop: Arc<AtomicBool>,
    poll_timeout: Duration,
}

impl Worker {
    async fn run(self) {
        debug!("Worker {} started", self.id);
        while !self.stop.load(Ordering::Acquire) {
            if let Some(job_id) = self.queue.dequeue(self.poll_timeout).await {
                self.process(&job_id).await;
            }
        }
        debug!("Worker {} stopped", self.id);
    }

    async fn process(&self, job_id: &str) {
        let job = match self.queue.mark_processing(job_id).await {
            Ok(job) => job,
            Err(QueueError::JobNotFound(_)) => {
                debug!("Worker {}: job {} no longer exists, skipping", self.id, job_id);
                return;
            }
            Err(e) => {
                warn!("Worker {}: cannot take job {}: {}", self.id, job_id, e);
                return;
            }
        };

        info!("Worker {} processing job {}", self.id, job_id);
        let started = Instant::now();

        let stored = match self.pipeline.run(&job.audio_url).await {
            Ok(result) => {
                info!(
                    "Worker {}: job {} completed with {} segments",
                    self.id,
                    job_id,
                    result.segments.len()
                );
                self.queue.complete(job_id, result).await
            }
            Err(e) => {
                error!("Worker {}: job {} failed: {}", self.id, job_id, e);
                self.queue.fail(job_id, e.to_string()).await
            }
        };

        let job = match stored {
            Ok(job) => job,
            Err(e) => {
                error!("Worker {}: failed to store outcome of job {}: {}", self.id, job_id, e);
                return;
            }
        };

        self.metrics
            .record_job_finished(job.status.as_str(), started.elapsed().as_secs_f64())
            .await;

        self.notify(&job).await;
    }

    async fn notify(&self, job: &Job) {
        let payload = CallbackPayload::from_job(job);
        let outcome = self.dispatcher.deliver(&job.callback_url, &payload).await;

        if let DeliveryOutcome::Exhausted {
            attempts,
            last_error,
        } = &outcome
        {
            error!(
                "Worker {}: callback for job {} abandoned after {} attempts: {}",
                self.id, job.id, attempts, last_error
            );
        }

        self.metrics
            .record_callback(outcome.label(), outcome.attempts())
            .await;
    }
}
