//! Correlation id stage.
//!
//! Generates a fresh `RequestId` for every request, stores it in the
//! `RequestContext` for the stages that log, and in the request extensions so
//! handlers can take it with `Extension<RequestId>`. The id is echoed back in
//! the `x-request-id` response header.
//!
//! Incoming `x-request-id` headers are ignored; ids are always generated here.

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    response::Response,
};

use super::{BoxFuture, Next, RequestContext, RequestId, Stage, StageResult};

/// Response header carrying the correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug, Clone, Copy, Default)]
pub struct AssignRequestId;

impl Stage for AssignRequestId {
    fn name(&self) -> &'static str {
        "request_id"
    }

    fn call<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        mut request: Request<Body>,
        next: Next<'a>,
    ) -> BoxFuture<'a, StageResult> {
        Box::pin(async move {
            let request_id = ctx.assign_request_id(RequestId::new());
            request.extensions_mut().insert(request_id);

            let mut response = next.run(ctx, request).await?;
            set_header(&mut response, request_id);
            Ok(response)
        })
    }
}

/// Writes `request_id` into the `x-request-id` response header.
pub(crate) fn set_header(response: &mut Response, request_id: RequestId) {
    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
}
