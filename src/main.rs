use actix_web::{middleware::Logger, web, App, HttpServer};
use env_logger::Env;
use log::{error, info, warn};
use std::sync::Arc;

use diarization_api::config_loader;
use diarization_api::config_validator::ConfigValidator;
use diarization_api::engine::{CommandEngine, DiarizationEngine};
use diarization_api::handlers::{self, Authentication};
use diarization_api::metrics::{create_metrics_exporter, Metrics};
use diarization_api::queue_manager::QueueManager;
use diarization_api::worker_pool::WorkerPool;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize logger
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    if std::env::args().any(|arg| arg == "--sample-config") {
        print!("{}", ConfigValidator::generate_sample_config());
        return Ok(());
    }

    // Load configurations (environment wins over the config file)
    config_loader::load_config();
    let config = match ConfigValidator::validate_and_load() {
        Ok(config) => config,
        Err(results) => {
            error!(
                "Refusing to start with {} configuration error(s)",
                results.errors.len()
            );
            std::process::exit(1);
        }
    };

    // Initialize metrics
    let metrics = Metrics::new(create_metrics_exporter(&config.server.metrics_backend));

    if let Err(e) = config.worker.ensure_scratch_dir() {
        warn!(
            "Failed to create scratch directory {}: {}",
            config.worker.scratch_dir.display(),
            e
        );
    }

    let queue_manager = QueueManager::new(metrics.clone());
    let engine: Arc<dyn DiarizationEngine> = Arc::new(CommandEngine::new(config.engine.clone()));

    // Pay the engine start-up cost before the first job arrives
    let warmup_engine = Arc::clone(&engine);
    match tokio::task::spawn_blocking(move || warmup_engine.warmup()).await {
        Ok(Ok(())) => info!("Diarization engine is ready"),
        Ok(Err(e)) => warn!("Engine warmup failed, jobs will fail until it is fixed: {}", e),
        Err(e) => warn!("Engine warmup task failed: {}", e),
    }

    let pool = Arc::new(WorkerPool::new(
        config.worker.clone(),
        queue_manager.clone(),
        Arc::clone(&engine),
        metrics.clone(),
    ));
    pool.start()
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

    let host = config.server.host;
    let port = config.server.port;
    let workers = config.server.worker_count();

    info!("Starting Diarization API server on http://{}:{}", host, port);
    info!("Scratch directory: {}", config.worker.scratch_dir.display());
    info!("Diarization command: {}", config.engine.command_path);
    info!(
        "Workers: {} (engine concurrency {})",
        pool.worker_count(),
        pool.engine_concurrency()
    );
    info!("Metrics exporter: {}", config.server.metrics_backend);

    let app_config = config.clone();
    let app_pool = Arc::clone(&pool);
    let result = HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(Authentication::new(app_config.server.api_key.as_deref()))
            .app_data(web::Data::new(app_config.clone()))
            .app_data(web::Data::new(queue_manager.clone()))
            .app_data(web::Data::new(metrics.clone()))
            .app_data(web::Data::from(Arc::clone(&engine)))
            .app_data(web::Data::from(Arc::clone(&app_pool)))
            .configure(handlers::configure)
    })
    .bind((host, port))?
    .workers(workers)
    .run()
    .await;

    info!("HTTP server stopped, shutting down worker pool");
    pool.shutdown().await;
    result
}
