/*
 * Responsibility
 * - POST /api/v1/echo
 * - Echo the request body back; empty bodies are a client error (AppError::BadRequest)
 */
use axum::{Extension, Json};

use crate::api::v1::dto::echo::EchoResponse;
use crate::error::AppError;
use crate::middleware::pipeline::RequestId;

pub async fn echo(
    Extension(request_id): Extension<RequestId>,
    body: String,
) -> Result<Json<EchoResponse>, AppError> {
    if body.trim().is_empty() {
        return Err(AppError::bad_request(
            "EMPTY_BODY",
            "request body must not be empty",
        ));
    }

    Ok(Json(EchoResponse {
        request_id: request_id.to_string(),
        length: body.len(),
        body,
    }))
}
