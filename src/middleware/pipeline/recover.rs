//! Panic recovery stage.
//!
//! Outermost stage. A panic anywhere in the inner chain is caught here once,
//! turned into `AppError::Panic`, logged at ERROR and rendered, so the client
//! always gets a response and the panic never reaches the server task.

use std::any::Any;
use std::error::Error;
use std::io;
use std::panic::AssertUnwindSafe;

use axum::{body::Body, http::Request, response::IntoResponse};
use futures_util::FutureExt;

use super::{BoxFuture, Next, RequestContext, Stage, StageResult, access_log, request_id};
use crate::error::AppError;

#[derive(Debug, Clone, Copy, Default)]
pub struct Recover;

impl Stage for Recover {
    fn name(&self) -> &'static str {
        "recover"
    }

    fn call<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        request: Request<Body>,
        next: Next<'a>,
    ) -> BoxFuture<'a, StageResult> {
        Box::pin(async move {
            let outcome = AssertUnwindSafe(next.run(&mut *ctx, request))
                .catch_unwind()
                .await;

            let payload = match outcome {
                Ok(result) => return result,
                Err(payload) => payload,
            };

            let err = AppError::Panic(panic_message(payload.as_ref()));
            tracing::error!(
                request_id = ctx.request_id().map(tracing::field::display),
                remote_addr = %ctx.remote_addr_field(),
                method = %ctx.method(),
                url = %ctx.uri(),
                "{}",
                err
            );

            let mut response = err.into_response();
            // The unwind skipped the header and access-log steps of the inner stages.
            if let Some(id) = ctx.request_id() {
                request_id::set_header(&mut response, id);
            }
            if ctx.access_log_pending() {
                access_log::finish(ctx, &response);
            }
            Ok(response)
        })
    }
}

/// Text of a panic payload. `panic!` produces `&'static str` or `String`;
/// error values passed to `panic_any` keep their `Display`. Anything else has
/// no printable form.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else if let Some(err) = payload.downcast_ref::<Box<dyn Error + Send + Sync>>() {
        err.to_string()
    } else if let Some(err) = payload.downcast_ref::<anyhow::Error>() {
        format!("{err:#}")
    } else if let Some(err) = payload.downcast_ref::<io::Error>() {
        err.to_string()
    } else {
        "non-string panic payload".to_string()
    }
}
