use actix_web::{http::StatusCode, test, web, App};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::config::AppConfig;
use crate::engine::{DiarizationEngine, EngineError, EngineOutput, RawSegment};
use crate::handlers::{configure, Authentication};
use crate::metrics::{create_null_exporter, create_prometheus_exporter, Metrics};
use crate::models::SubmitResponse;
use crate::queue_manager::{JobStatus, QueueManager};
use crate::worker_pool::WorkerPool;

struct TestEngine {
    ready: AtomicBool,
    warmup_succeeds: bool,
    diarize_fails: bool,
    saw_audio: AtomicBool,
}

impl DiarizationEngine for TestEngine {
    fn diarize(&self, audio_path: &Path) -> Result<EngineOutput, EngineError> {
        self.saw_audio.store(audio_path.exists(), Ordering::SeqCst);
        if self.diarize_fails {
            return Err(EngineError::Failed("unsupported codec".to_string()));
        }
        Ok(EngineOutput {
            segments: vec![
                RawSegment {
                    speaker: "SPEAKER_01".to_string(),
                    start: 0.0,
                    end: 2.0,
                },
                RawSegment {
                    speaker: "SPEAKER_00".to_string(),
                    start: 2.0,
                    end: 9.0,
                },
            ],
            processing_time_ms: 7,
        })
    }

    fn warmup(&self) -> Result<(), EngineError> {
        if self.warmup_succeeds {
            self.ready.store(true, Ordering::SeqCst);
            Ok(())
        } else {
            Err(EngineError::NotReady("model files missing".to_string()))
        }
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

struct TestState {
    config: AppConfig,
    queue: QueueManager,
    metrics: Metrics,
    engine: Arc<TestEngine>,
    pool: Arc<WorkerPool>,
    scratch: TempDir,
}

impl TestState {
    fn new(api_key: Option<&str>, warmup_succeeds: bool) -> Self {
        Self::build(api_key, warmup_succeeds, false)
    }

    fn with_failing_engine() -> Self {
        Self::build(None, true, true)
    }

    fn build(api_key: Option<&str>, warmup_succeeds: bool, diarize_fails: bool) -> Self {
        let scratch = TempDir::new().expect("tempdir");
        let mut config = AppConfig::default();
        config.server.api_key = api_key.map(str::to_string);
        config.worker.scratch_dir = scratch.path().to_path_buf();

        let metrics = Metrics::new(create_prometheus_exporter());
        let queue = QueueManager::new(metrics.clone());
        let engine = Arc::new(TestEngine {
            ready: AtomicBool::new(false),
            warmup_succeeds,
            diarize_fails,
            saw_audio: AtomicBool::new(false),
        });
        // Never started: submitted jobs stay pending
        let pool = Arc::new(WorkerPool::new(
            config.worker.clone(),
            queue.clone(),
            Arc::clone(&engine) as Arc<dyn DiarizationEngine>,
            Metrics::new(create_null_exporter()),
        ));

        Self {
            config,
            queue,
            metrics,
            engine,
            pool,
            scratch,
        }
    }

    fn scratch_entries(&self) -> usize {
        std::fs::read_dir(self.scratch.path())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

macro_rules! test_app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .wrap(Authentication::new($state.config.server.api_key.as_deref()))
                .app_data(web::Data::new($state.config.clone()))
                .app_data(web::Data::new($state.queue.clone()))
                .app_data(web::Data::new($state.metrics.clone()))
                .app_data(web::Data::from(
                    Arc::clone(&$state.engine) as Arc<dyn DiarizationEngine>
                ))
                .app_data(web::Data::from(Arc::clone(&$state.pool)))
                .configure(configure),
        )
        .await
    };
}

fn submit_body() -> Value {
    json!({
        "audio_url": "https://cdn.example.com/audio/session.wav",
        "callback_url": "https://app.example.com/hooks/diarization",
        "metadata": {"appointment_id": 42}
    })
}

#[actix_web::test]
async fn test_submit_returns_accepted_job() {
    let state = TestState::new(None, true);
    let app = test_app!(state);

    let req = test::TestRequest::post()
        .uri("/diarize")
        .set_json(submit_body())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::ACCEPTED);

    let body: SubmitResponse = test::read_body_json(resp).await;
    assert_eq!(body.status, JobStatus::Pending);
    assert_eq!(body.status_url, format!("/diarize/{}", body.job_id));

    let job = state.queue.status(&body.job_id).await.expect("job stored");
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.metadata.expect("metadata")["appointment_id"], 42);
}

#[actix_web::test]
async fn test_submit_rejects_invalid_urls() {
    let state = TestState::new(None, true);
    let app = test_app!(state);

    let req = test::TestRequest::post()
        .uri("/diarize")
        .set_json(json!({"audio_url": "ftp://x/a.wav", "callback_url": "https://y/cb"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"]
        .as_str()
        .expect("error message")
        .contains("audio_url"));
    assert_eq!(state.queue.queued_count().await, 0);
}

#[actix_web::test]
async fn test_submit_rejects_malformed_body() {
    let state = TestState::new(None, true);
    let app = test_app!(state);

    let req = test::TestRequest::post()
        .uri("/diarize")
        .set_json(json!({"audio_url": "https://x/a.wav"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_status_of_pending_job_has_queue_position() {
    let state = TestState::new(None, true);
    let app = test_app!(state);

    state
        .queue
        .submit("https://x/1.wav".into(), "https://y/cb".into(), None)
        .await;
    let second = state
        .queue
        .submit("https://x/2.wav".into(), "https://y/cb".into(), None)
        .await;

    let req = test::TestRequest::get()
        .uri(&format!("/diarize/{}", second))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["job_id"], second.as_str());
    assert_eq!(body["status"], "pending");
    assert_eq!(body["queue_position"], 2);
    assert!(body["metadata"].is_null());
    assert!(body.get("result").is_none());
}

#[actix_web::test]
async fn test_unknown_job_is_not_found() {
    let state = TestState::new(None, true);
    let app = test_app!(state);

    let req = test::TestRequest::get()
        .uri("/diarize/does-not-exist")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_missing_key_is_unauthorized() {
    let state = TestState::new(Some("s3cret"), true);
    let app = test_app!(state);

    let req = test::TestRequest::post()
        .uri("/diarize")
        .set_json(submit_body())
        .to_request();
    let err = test::try_call_service(&app, req)
        .await
        .err()
        .expect("request should be rejected");
    assert_eq!(err.error_response().status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::get()
        .uri("/status")
        .insert_header(("Authorization", "Bearer wrong"))
        .to_request();
    let err = test::try_call_service(&app, req)
        .await
        .err()
        .expect("request should be rejected");
    assert_eq!(err.error_response().status(), StatusCode::UNAUTHORIZED);
    assert_eq!(state.queue.queued_count().await, 0);
}

#[actix_web::test]
async fn test_bearer_and_bare_keys_are_accepted() {
    let state = TestState::new(Some("s3cret"), true);
    let app = test_app!(state);

    for header in ["Bearer s3cret", "s3cret"] {
        let req = test::TestRequest::post()
            .uri("/diarize")
            .insert_header(("Authorization", header))
            .set_json(submit_body())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED, "header {}", header);
    }
    assert_eq!(state.queue.queued_count().await, 2);
}

#[actix_web::test]
async fn test_health_routes_skip_authentication() {
    let state = TestState::new(Some("s3cret"), true);
    let app = test_app!(state);

    for uri in ["/", "/health"] {
        let req = test::TestRequest::get().uri(uri).to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["model_loaded"], false);
        assert!(body["timestamp"].is_string());
    }
}

#[actix_web::test]
async fn test_warmup_marks_engine_ready() {
    let state = TestState::new(None, true);
    let app = test_app!(state);

    let req = test::TestRequest::post().uri("/warmup").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let req = test::TestRequest::get().uri("/health").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["model_loaded"], true);
}

#[actix_web::test]
async fn test_failed_warmup_is_unavailable() {
    let state = TestState::new(None, false);
    let app = test_app!(state);

    let req = test::TestRequest::post().uri("/warmup").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[actix_web::test]
async fn test_status_reports_queue_state() {
    let state = TestState::new(None, true);
    let app = test_app!(state);
    state
        .queue
        .submit("https://x/1.wav".into(), "https://y/cb".into(), None)
        .await;

    let req = test::TestRequest::get().uri("/status").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["queue_state"]["queued_jobs"], 1);
    assert_eq!(body["queue_state"]["processing_jobs"], 0);
    assert_eq!(body["processing"]["pool_running"], false);
    assert_eq!(body["processing"]["max_concurrent_jobs"], 2);
    assert_eq!(body["processing"]["engine_concurrency"], 1);
    assert_eq!(body["callbacks"]["max_retries"], 3);
    assert_eq!(body["server"]["authorization_enabled"], false);
}

#[actix_web::test]
async fn test_metrics_endpoint_exports_prometheus_text() {
    let state = TestState::new(None, true);
    let app = test_app!(state);

    let req = test::TestRequest::post()
        .uri("/diarize")
        .set_json(submit_body())
        .to_request();
    test::call_service(&app, req).await;

    let req = test::TestRequest::get().uri("/metrics").to_request();
    let body = test::call_and_read_body(&app, req).await;
    let text = String::from_utf8(body.to_vec()).expect("utf8");
    assert!(text.contains("diarization_jobs_submitted_total 1"));
    assert!(text.contains("diarization_http_requests_total"));
}

async fn audio_host() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/session.wav"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"RIFF....WAVE".to_vec()))
        .mount(&server)
        .await;
    server
}

#[actix_web::test]
async fn test_sync_diarization_returns_labelled_segments() {
    let state = TestState::new(None, true);
    let app = test_app!(state);
    let audio = audio_host().await;

    let req = test::TestRequest::post()
        .uri("/diarize/sync")
        .set_json(json!({"audio_url": format!("{}/session.wav", audio.uri())}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    let segments = body["segments"].as_array().expect("segments array");
    assert_eq!(segments.len(), 2);
    assert_eq!(segments[0]["speaker"], "SPEAKER_01");
    assert_eq!(segments[0]["role"], "customer");
    assert_eq!(segments[1]["speaker"], "SPEAKER_00");
    assert_eq!(segments[1]["role"], "stylist");
    assert_eq!(body["processing_time_ms"], 7);

    assert!(state.engine.saw_audio.load(Ordering::SeqCst));
    assert_eq!(state.scratch_entries(), 0);
    // Nothing goes through the queue
    assert_eq!(state.queue.queued_count().await, 0);
}

#[actix_web::test]
async fn test_sync_engine_failure_is_server_error_and_cleans_scratch() {
    let state = TestState::with_failing_engine();
    let app = test_app!(state);
    let audio = audio_host().await;

    let req = test::TestRequest::post()
        .uri("/diarize/sync")
        .set_json(json!({"audio_url": format!("{}/session.wav", audio.uri())}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Diarization failed: unsupported codec");
    assert!(state.engine.saw_audio.load(Ordering::SeqCst));
    assert_eq!(state.scratch_entries(), 0);
}

#[actix_web::test]
async fn test_sync_download_failure_is_bad_gateway() {
    let state = TestState::new(None, true);
    let app = test_app!(state);
    let audio = audio_host().await;

    let req = test::TestRequest::post()
        .uri("/diarize/sync")
        .set_json(json!({"audio_url": format!("{}/missing.wav", audio.uri())}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    assert!(!state.engine.saw_audio.load(Ordering::SeqCst));
    assert_eq!(state.scratch_entries(), 0);
}

#[actix_web::test]
async fn test_sync_rejects_invalid_url() {
    let state = TestState::new(None, true);
    let app = test_app!(state);

    let req = test::TestRequest::post()
        .uri("/diarize/sync")
        .set_json(json!({"audio_url": "file:///etc/passwd"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_ready_waits_for_warmup() {
    let state = TestState::new(Some("s3cret"), true);
    let app = test_app!(state);

    // No credentials needed for readiness
    let req = test::TestRequest::get().uri("/ready").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "not_ready");

    let req = test::TestRequest::post()
        .uri("/warmup")
        .insert_header(("Authorization", "Bearer s3cret"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

    let req = test::TestRequest::get().uri("/ready").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "ready");
    assert!(body.get("reason").is_none());
}
