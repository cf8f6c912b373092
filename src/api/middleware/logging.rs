use std::time::{Duration, Instant};

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderName, HeaderValue},
    Error,
};
use futures_util::future::{ok, LocalBoxFuture, Ready};
use log::{debug, error, info, warn};

use crate::utils::generate_id;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Logs every engine call with its request id and flags slow responses
pub struct RequestLogger {
    slow_after: Duration,
}

impl RequestLogger {
    pub fn new() -> Self {
        RequestLogger {
            slow_after: Duration::from_millis(500),
        }
    }
}

impl Default for RequestLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, B> Transform<S, ServiceRequest> for RequestLogger
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = RequestLoggerMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(RequestLoggerMiddleware {
            service,
            slow_after: self.slow_after,
        })
    }
}

pub struct RequestLoggerMiddleware<S> {
    service: S,
    slow_after: Duration,
}

impl<S, B> Service<ServiceRequest> for RequestLoggerMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let start_time = Instant::now();
        let slow_after = self.slow_after;
        let method = req.method().clone();
        let path = req.path().to_string();
        let request_id = req
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| generate_id("req"));

        debug!("[{}] {} {} received", request_id, method, path);
        let fut = self.service.call(req);

        Box::pin(async move {
            match fut.await {
                Ok(mut res) => {
                    let elapsed = start_time.elapsed();
                    let status = res.status();
                    if status.is_server_error() {
                        warn!("[{}] {} {} - {:?} - Status: {}", request_id, method, path, elapsed, status);
                    } else if elapsed > slow_after {
                        warn!("[{}] {} {} - slow response {:?} - Status: {}", request_id, method, path, elapsed, status);
                    } else {
                        info!("[{}] {} {} - {:?} - Status: {}", request_id, method, path, elapsed, status);
                    }

                    if let Ok(value) = HeaderValue::from_str(&request_id) {
                        res.headers_mut()
                            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
                    }
                    Ok(res)
                }
                Err(err) => {
                    error!("[{}] {} {} - Error: {:?}", request_id, method, path, err);
                    Err(err)
                }
            }
        })
    }
}
