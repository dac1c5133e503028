// Diarization API HTTP handlers
//
// This module contains the HTTP handlers for the Diarization API.
// It provides the interface between HTTP requests and the job queue.

pub mod authentication;
pub mod routes;

#[cfg(test)]
mod tests;

use actix_web::web;

use crate::error::HandlerError;

// Re-export handlers for easier access
pub use self::routes::{
    api_status, diarize, diarize_sync, health, job_status, metrics_handler, ready, root, warmup,
};
// Re-export authentication middleware
pub use self::authentication::Authentication;

/// Register every route plus JSON body handling
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _req| {
        HandlerError::InvalidRequest(err.to_string()).into()
    }))
    .service(diarize)
    .service(diarize_sync)
    .service(job_status)
    .service(health)
    .service(ready)
    .service(root)
    .service(warmup)
    .service(api_status)
    .service(metrics_handler);
}
