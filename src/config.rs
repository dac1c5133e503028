// Diarization API configuration
//
// This module contains configuration structures and constants for the Diarization API.
// Values are populated by the config validator from environment variables (optionally
// seeded from the TOML config file); the `Default` impls mirror the documented defaults.

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Default values for configuration
pub mod defaults {
    // Server bind address
    pub const HOST: &str = "127.0.0.1";

    // Server port
    pub const PORT: u16 = 8000;

    // Number of HTTP workers (0 = number of CPU cores)
    pub const HTTP_WORKERS: usize = 0;

    // Metrics backend ("prometheus", "none", "disabled")
    pub const METRICS_BACKEND: &str = "none";

    // Number of concurrent diarization workers
    pub const MAX_CONCURRENT_JOBS: usize = 2;

    // How long a worker waits on an empty queue before re-checking the stop flag
    pub const QUEUE_POLL_TIMEOUT_MS: u64 = 1000;

    // Scratch directory for downloaded audio
    pub const SCRATCH_DIR: &str = "/tmp/diarization";

    // Per-request timeout for audio downloads
    pub const DOWNLOAD_TIMEOUT_SECONDS: u64 = 60;

    // Per-attempt timeout for webhook callbacks
    pub const CALLBACK_TIMEOUT_SECONDS: u64 = 30;

    // Total callback attempts before giving up
    pub const CALLBACK_MAX_RETRIES: u32 = 3;

    // Base delay of the callback backoff (doubles after each failed attempt)
    pub const CALLBACK_BACKOFF_BASE_MS: u64 = 1000;

    // External diarization program
    pub const DIARIZATION_CMD: &str = "/opt/diarization/diarize.sh";

    // Speaker count hints passed to the diarization program
    pub const MIN_SPEAKERS: u32 = 2;
    pub const MAX_SPEAKERS: u32 = 2;

    // Number of simultaneous invocations the engine can sustain
    pub const ENGINE_CONCURRENCY: usize = 1;

    // Audio extensions kept on scratch files
    pub const AUDIO_EXTENSIONS: [&str; 8] = ["wav", "mp3", "m4a", "mp4", "webm", "ogg", "flac", "aac"];

    // Extension used when the URL does not carry a known one
    pub const FALLBACK_AUDIO_EXTENSION: &str = "wav";
}

/// Configuration for the HTTP server
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Bind address
    pub host: IpAddr,
    /// Bind port
    pub port: u16,
    /// Number of HTTP workers (0 = CPU cores)
    pub workers: usize,
    /// API key required as bearer token; `None` disables authentication
    pub api_key: Option<String>,
    /// Metrics backend name
    pub metrics_backend: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::from([127, 0, 0, 1]),
            port: defaults::PORT,
            workers: defaults::HTTP_WORKERS,
            api_key: None,
            metrics_backend: defaults::METRICS_BACKEND.to_string(),
        }
    }
}

impl ServerConfig {
    /// Resolved number of HTTP workers
    pub fn worker_count(&self) -> usize {
        if self.workers == 0 {
            num_cpus::get()
        } else {
            self.workers
        }
    }
}

/// Configuration for the worker pool, fetcher and callback dispatcher
#[derive(Clone, Debug)]
pub struct WorkerConfig {
    /// Number of worker loops started by the pool
    pub max_concurrent_jobs: usize,
    /// Queue poll timeout; bounds how long shutdown takes to be observed
    pub poll_timeout: Duration,
    /// Directory holding downloaded audio while a job runs
    pub scratch_dir: PathBuf,
    /// Timeout applied to each audio download request
    pub download_timeout: Duration,
    /// Timeout applied to each callback attempt
    pub callback_timeout: Duration,
    /// Total number of callback attempts
    pub max_retries: u32,
    /// First backoff delay between callback attempts
    pub backoff_base: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: defaults::MAX_CONCURRENT_JOBS,
            poll_timeout: Duration::from_millis(defaults::QUEUE_POLL_TIMEOUT_MS),
            scratch_dir: PathBuf::from(defaults::SCRATCH_DIR),
            download_timeout: Duration::from_secs(defaults::DOWNLOAD_TIMEOUT_SECONDS),
            callback_timeout: Duration::from_secs(defaults::CALLBACK_TIMEOUT_SECONDS),
            max_retries: defaults::CALLBACK_MAX_RETRIES,
            backoff_base: Duration::from_millis(defaults::CALLBACK_BACKOFF_BASE_MS),
        }
    }
}

impl WorkerConfig {
    /// Ensures the scratch directory exists
    pub fn ensure_scratch_dir(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.scratch_dir)
    }
}

/// Configuration for the command-line diarization engine
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Path to the diarization program
    pub command_path: String,
    /// Lower bound on detected speakers
    pub min_speakers: u32,
    /// Upper bound on detected speakers
    pub max_speakers: u32,
    /// Simultaneous invocations the engine can sustain
    pub max_concurrency: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            command_path: defaults::DIARIZATION_CMD.to_string(),
            min_speakers: defaults::MIN_SPEAKERS,
            max_speakers: defaults::MAX_SPEAKERS,
            max_concurrency: defaults::ENGINE_CONCURRENCY,
        }
    }
}

/// Complete validated application configuration
#[derive(Clone, Debug, Default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub worker: WorkerConfig,
    pub engine: EngineConfig,
}
