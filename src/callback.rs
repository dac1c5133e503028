//! Callback dispatcher
//!
//! Delivers the outcome of a terminal job to the caller's webhook. Delivery is at-least-once
//! within a bounded number of attempts: each attempt is a JSON POST with its own timeout, any
//! status below 400 counts as delivered, and failed attempts are retried after an exponential
//! backoff of `base * 2^attempt`. Running out of attempts is reported to the caller as
//! [`DeliveryOutcome::Exhausted`]; it never changes the stored job.

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;
use serde_json::{Map, Value};
use std::time::Duration;

use crate::queue_manager::{DiarizationResult, Job, JobStatus};

/// Body POSTed to the callback URL
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CallbackPayload {
    pub job_id: String,
    pub status: JobStatus,
    /// `true` iff the job completed
    pub success: bool,
    pub metadata: Option<Map<String, Value>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<DiarizationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CallbackPayload {
    pub fn from_job(job: &Job) -> Self {
        Self {
            job_id: job.id.clone(),
            status: job.status,
            success: job.status == JobStatus::Completed,
            metadata: job.metadata.clone(),
            started_at: job.started_at,
            completed_at: job.completed_at,
            result: job.result.clone(),
            error: job.error.clone(),
        }
    }
}

/// Result of a delivery attempt-sequence
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryOutcome {
    Delivered { attempts: u32 },
    Exhausted { attempts: u32, last_error: String },
}

impl DeliveryOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            DeliveryOutcome::Delivered { attempts } => *attempts,
            DeliveryOutcome::Exhausted { attempts, .. } => *attempts,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DeliveryOutcome::Delivered { .. } => "delivered",
            DeliveryOutcome::Exhausted { .. } => "exhausted",
        }
    }
}

/// Delay before the retry that follows the zero-based `attempt`
pub fn backoff_delay(attempt: u32, base: Duration) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
}

/// Webhook client with bounded retries
#[derive(Clone)]
pub struct CallbackDispatcher {
    client: reqwest::Client,
    timeout: Duration,
    max_retries: u32,
    backoff_base: Duration,
}

impl CallbackDispatcher {
    /// `max_retries` is the total number of attempts; values below one are treated as one
    pub fn new(
        client: reqwest::Client,
        timeout: Duration,
        max_retries: u32,
        backoff_base: Duration,
    ) -> Self {
        Self {
            client,
            timeout,
            max_retries: max_retries.max(1),
            backoff_base,
        }
    }

    pub async fn deliver(&self, target_url: &str, payload: &CallbackPayload) -> DeliveryOutcome {
        let mut last_error = String::new();

        for attempt in 0..self.max_retries {
            match self.attempt(target_url, payload).await {
                Ok(()) => {
                    info!(
                        "Callback for job {} delivered to {} (attempt {}/{})",
                        payload.job_id,
                        target_url,
                        attempt + 1,
                        self.max_retries
                    );
                    return DeliveryOutcome::Delivered {
                        attempts: attempt + 1,
                    };
                }
                Err(e) => {
                    warn!(
                        "Callback for job {} failed (attempt {}/{}): {}",
                        payload.job_id,
                        attempt + 1,
                        self.max_retries,
                        e
                    );
                    last_error = e;
                }
            }

            if attempt + 1 < self.max_retries {
                tokio::time::sleep(backoff_delay(attempt, self.backoff_base)).await;
            }
        }

        DeliveryOutcome::Exhausted {
            attempts: self.max_retries,
            last_error,
        }
    }

    async fn attempt(&self, target_url: &str, payload: &CallbackPayload) -> Result<(), String> {
        let response = self
            .client
            .post(target_url)
            .json(payload)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if status.as_u16() < 400 {
            Ok(())
        } else {
            Err(format!("webhook answered HTTP {}", status.as_u16()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue_manager::Segment;
    use crate::role_estimator::Role;
    use std::time::Instant;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn payload() -> CallbackPayload {
        CallbackPayload {
            job_id: "job-1".to_string(),
            status: JobStatus::Completed,
            success: true,
            metadata: None,
            started_at: Some(Utc::now()),
            completed_at: Some(Utc::now()),
            result: Some(DiarizationResult {
                segments: vec![Segment {
                    speaker: "SPEAKER_00".to_string(),
                    start: 0.0,
                    end: 10.0,
                    role: Role::Stylist,
                }],
                processing_time_ms: 7,
            }),
            error: None,
        }
    }

    fn dispatcher(max_retries: u32, backoff_base: Duration) -> CallbackDispatcher {
        CallbackDispatcher::new(
            reqwest::Client::new(),
            Duration::from_secs(5),
            max_retries,
            backoff_base,
        )
    }

    #[test]
    fn test_backoff_doubles_from_base() {
        let base = Duration::from_secs(1);
        let delays: Vec<Duration> = (0..3).map(|attempt| backoff_delay(attempt, base)).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4)
            ]
        );
    }

    #[test]
    fn test_backoff_saturates() {
        assert_eq!(
            backoff_delay(64, Duration::from_secs(1)),
            Duration::from_secs(u64::from(u32::MAX))
        );
        assert_eq!(backoff_delay(3, Duration::MAX), Duration::MAX);
    }

    #[test]
    fn test_payload_fields() {
        let json = serde_json::to_value(payload()).expect("serialize payload");
        assert_eq!(json["job_id"], "job-1");
        assert_eq!(json["status"], "completed");
        assert_eq!(json["success"], true);
        assert!(json["metadata"].is_null());
        assert_eq!(json["result"]["segments"][0]["role"], "stylist");
        assert!(json.get("error").is_none());
    }

    #[tokio::test]
    async fn test_delivered_after_two_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_partial_json(serde_json::json!({"job_id": "job-1", "success": true})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = dispatcher(3, Duration::from_millis(10))
            .deliver(&format!("{}/hook", server.uri()), &payload())
            .await;

        assert_eq!(outcome, DeliveryOutcome::Delivered { attempts: 3 });
    }

    #[tokio::test]
    async fn test_exhausted_after_max_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let outcome = dispatcher(3, Duration::from_millis(10))
            .deliver(&format!("{}/hook", server.uri()), &payload())
            .await;

        match outcome {
            DeliveryOutcome::Exhausted {
                attempts,
                last_error,
            } => {
                assert_eq!(attempts, 3);
                assert!(last_error.contains("503"));
            }
            other => panic!("expected exhaustion, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_redirect_class_status_counts_as_delivered() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(304))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = dispatcher(3, Duration::from_millis(10))
            .deliver(&format!("{}/hook", server.uri()), &payload())
            .await;
        assert_eq!(outcome.attempts(), 1);
        assert_eq!(outcome.label(), "delivered");
    }

    #[tokio::test]
    async fn test_backoff_waits_between_attempts_only() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        // 3 attempts wait 50ms + 100ms; nothing after the last one
        let started = Instant::now();
        let outcome = dispatcher(3, Duration::from_millis(50))
            .deliver(&format!("{}/hook", server.uri()), &payload())
            .await;
        let elapsed = started.elapsed();

        assert_eq!(outcome.attempts(), 3);
        assert!(elapsed >= Duration::from_millis(150), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(350), "elapsed {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_unreachable_target_is_exhausted() {
        let outcome = dispatcher(2, Duration::from_millis(1))
            .deliver("http://127.0.0.1:9/hook", &payload())
            .await;
        assert!(matches!(outcome, DeliveryOutcome::Exhausted { attempts: 2, .. }));
    }
}
