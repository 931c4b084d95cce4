//! Access log stage.
//!
//! Emits exactly one `request completed` event per request, after the rest of
//! the chain has finished and any error has been rendered, so `status` is the
//! one the client actually gets.

use axum::{
    body::{Body, HttpBody},
    http::{Request, header},
    response::{IntoResponse, Response},
};

use super::{BoxFuture, Next, RequestContext, Stage, StageResult};
use crate::error::ErrorReport;

/// Message of the access-log event.
pub const ACCESS_LOG_MESSAGE: &str = "request completed";

#[derive(Debug, Clone, Copy, Default)]
pub struct AccessLog;

impl Stage for AccessLog {
    fn name(&self) -> &'static str {
        "access_log"
    }

    fn call<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        request: Request<Body>,
        next: Next<'a>,
    ) -> BoxFuture<'a, StageResult> {
        Box::pin(async move {
            ctx.start_timer();

            // Render before logging; the record must carry the final status.
            let response = match next.run(&mut *ctx, request).await {
                Ok(response) => response,
                Err(err) => err.into_response(),
            };

            finish(ctx, &response);
            Ok(response)
        })
    }
}

/// Emits the access-log record for `response` if one is still pending.
///
/// Also called by `Recover` when a panic unwound past this stage after the
/// timer was started.
pub(crate) fn finish(ctx: &mut RequestContext, response: &Response) {
    let Some(elapsed) = ctx.stop_timer() else {
        return;
    };

    let error = response
        .extensions()
        .get::<ErrorReport>()
        .map(ErrorReport::message)
        .unwrap_or_default();

    tracing::info!(
        request_id = ctx.request_id().map(tracing::field::display),
        remote_addr = %ctx.remote_addr_field(),
        method = %ctx.method(),
        url = %ctx.uri(),
        error = error,
        status = response.status().as_u16(),
        bytes_in = ctx.bytes_in(),
        bytes_out = response_size(response),
        latency = ?elapsed,
        latency_us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX),
        "{}",
        ACCESS_LOG_MESSAGE
    );
}

/// Body size when known up front, otherwise the declared `Content-Length`.
fn response_size(response: &Response) -> u64 {
    response.body().size_hint().exact().unwrap_or_else(|| {
        response
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    })
}
