//! Host-level HTTP limits for the routes behind the request pipeline.
//!
//! Responsibility:
//! - Body size limit (413)
//! - Route timeout (408, rendered as `AppError::Timeout`)
//!
//! Notes:
//! - Applied to the routes before `pipeline::apply`, so the pipeline wraps
//!   these layers and a rejected or timed-out request still gets its request
//!   id and its access-log record.
//! - A timed-out handler future is dropped; the pipeline itself keeps running.

use axum::Router;
use axum::error_handling::HandleErrorLayer;
use tower::timeout::TimeoutLayer;
use tower::{BoxError, ServiceBuilder};
use tower_http::limit::RequestBodyLimitLayer;

use crate::config::Config;
use crate::error::AppError;

/// Apply HTTP-level limits to the given Router.
pub fn apply<S>(router: Router<S>, config: &Config) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let timeout = config.request_timeout;
    let layers = ServiceBuilder::new()
        // Make the service error `Infallible` by converting errors into responses.
        .layer(HandleErrorLayer::new(move |err: BoxError| async move {
            if err.is::<tower::timeout::error::Elapsed>() {
                AppError::Timeout(timeout)
            } else {
                AppError::Internal(err.to_string())
            }
        }))
        .layer(RequestBodyLimitLayer::new(config.request_body_limit_bytes))
        .layer(TimeoutLayer::new(config.request_timeout));

    router.layer(layers)
}
