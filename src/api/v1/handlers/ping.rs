/*
 * Responsibility
 * - GET /api/v1/ping (authenticated liveness)
 * - Returns the correlation id so clients can quote it
 */
use axum::{Extension, Json};

use crate::api::v1::dto::echo::PingResponse;
use crate::middleware::pipeline::RequestId;

pub async fn ping(Extension(request_id): Extension<RequestId>) -> Json<PingResponse> {
    Json(PingResponse {
        status: "ok",
        request_id: request_id.to_string(),
    })
}
