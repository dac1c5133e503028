// Authentication middleware for Diarization API
//
// When an API key is configured, requests must carry it in the Authorization header,
// either as `Bearer <key>` or as the bare key. OPTIONS requests and the health routes
// are always allowed so pre-flight checks and liveness checks work without credentials.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::{header, Method},
    web, Error,
};
use futures::future::{ok, LocalBoxFuture, Ready};
use log::{debug, info, warn};
use std::rc::Rc;

use crate::error::HandlerError;
use crate::metrics::Metrics;

/// Paths reachable without credentials
const PUBLIC_PATHS: [&str; 3] = ["/", "/health", "/ready"];

/// Middleware factory for authentication
#[derive(Clone)]
pub struct Authentication {
    api_key: Option<Rc<str>>,
}

impl Authentication {
    /// `None` or an empty key disables authentication
    pub fn new(api_key: Option<&str>) -> Self {
        Self {
            api_key: api_key.filter(|key| !key.is_empty()).map(Rc::from),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for Authentication
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = AuthenticationMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        if self.api_key.is_none() {
            info!("No API key configured, authentication is disabled");
        }
        ok(AuthenticationMiddleware {
            service: Rc::new(service),
            api_key: self.api_key.clone(),
        })
    }
}

/// Authentication middleware implementation
pub struct AuthenticationMiddleware<S> {
    service: Rc<S>,
    api_key: Option<Rc<str>>,
}

impl<S, B> Service<ServiceRequest> for AuthenticationMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let api_key = match &self.api_key {
            Some(key) if !is_exempt(&req) => Rc::clone(key),
            _ => return Box::pin(self.service.call(req)),
        };

        let service = Rc::clone(&self.service);
        Box::pin(async move {
            let verdict = authenticate(&req, &api_key);

            if let Some(metrics) = req.app_data::<web::Data<Metrics>>() {
                let status = if verdict.is_ok() { "accepted" } else { "rejected" };
                metrics.record_auth_attempt(status).await;
            }

            verdict?;
            service.call(req).await
        })
    }
}

fn is_exempt(req: &ServiceRequest) -> bool {
    if req.method() == Method::OPTIONS {
        debug!("OPTIONS request - bypassing authentication check");
        return true;
    }
    req.method() == Method::GET && PUBLIC_PATHS.contains(&req.path())
}

/// Check the Authorization header against the configured key
fn authenticate(req: &ServiceRequest, api_key: &str) -> Result<(), HandlerError> {
    let header_value = req
        .headers()
        .get(header::AUTHORIZATION)
        .ok_or_else(|| {
            warn!("Missing Authorization header on {} {}", req.method(), req.path());
            HandlerError::Unauthorized("Authorization header is required".to_string())
        })?
        .to_str()
        .map_err(|_| {
            warn!("Authorization header contains invalid characters");
            HandlerError::Unauthorized("Invalid Authorization header".to_string())
        })?;

    let presented = header_value
        .strip_prefix("Bearer ")
        .unwrap_or(header_value)
        .trim();

    if keys_match(presented, api_key) {
        Ok(())
    } else {
        warn!("Invalid API key on {} {}", req.method(), req.path());
        Err(HandlerError::Unauthorized("Invalid API key".to_string()))
    }
}

/// Compare keys without stopping at the first differing byte. Only the length can leak.
fn keys_match(presented: &str, expected: &str) -> bool {
    let (presented, expected) = (presented.as_bytes(), expected.as_bytes());
    if presented.len() != expected.len() {
        return false;
    }
    presented
        .iter()
        .zip(expected)
        .fold(0u8, |diff, (a, b)| diff | (a ^ b))
        == 0
}
