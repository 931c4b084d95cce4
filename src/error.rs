/*
 * Responsibility
 * - Application-wide AppError
 * - IntoResponse (HTTP status / JSON error body); this is the single place errors are rendered
 * - Leave the rendered error's message on the response (ErrorReport) for the access log
 */
use std::time::Duration;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::services::session::SessionError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{code}: {message}")]
    BadRequest { code: &'static str, message: String },
    #[error(transparent)]
    SessionCheck(#[from] SessionError),
    #[error("panic: {0}")]
    Panic(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::BadRequest {
            code,
            message: message.into(),
        }
    }
}

/// Message of the error a response was rendered from.
///
/// Attached to the response extensions by `AppError::into_response`, so layers
/// outside the handler can still see what went wrong after rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport(String);

impl ErrorReport {
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let report = ErrorReport(self.to_string());

        let (status, code, message) = match self {
            AppError::BadRequest { code, message } => (StatusCode::BAD_REQUEST, code, message),
            AppError::Timeout(_) => (
                StatusCode::REQUEST_TIMEOUT,
                "REQUEST_TIMEOUT",
                "request timed out".into(),
            ),
            // Session backend / panic details stay in the logs, not in the body.
            AppError::SessionCheck(_) | AppError::Panic(_) | AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_SERVER_ERROR",
                "internal server error".into(),
            ),
        };

        let body = ErrorResponse {
            error: ErrorBody { code, message },
        };

        let mut response = (status, Json(body)).into_response();
        response.extensions_mut().insert(report);
        response
    }
}
