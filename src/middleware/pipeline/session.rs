//! Session gate.
//!
//! Rejects requests without a valid session before they reach route handlers.
//!
//! - valid session: continue; the principal is not kept by this layer
//! - `SessionError::NoSession`: empty `401`, not an error (expected traffic)
//! - anything else: logged at ERROR and returned as `AppError::SessionCheck`

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::IntoResponse,
};

use super::{BoxFuture, Next, RequestContext, Stage, StageResult};
use crate::error::AppError;
use crate::services::session::{SessionError, SessionService};

pub struct SessionGate {
    sessions: Arc<dyn SessionService>,
}

impl SessionGate {
    pub fn new(sessions: Arc<dyn SessionService>) -> Self {
        Self { sessions }
    }
}

impl Stage for SessionGate {
    fn name(&self) -> &'static str {
        "session_gate"
    }

    fn call<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        request: Request<Body>,
        next: Next<'a>,
    ) -> BoxFuture<'a, StageResult> {
        Box::pin(async move {
            let checked = self.sessions.check_session(request.headers()).await;

            match checked {
                Ok(_principal) => next.run(ctx, request).await,
                Err(SessionError::NoSession) => Ok(StatusCode::UNAUTHORIZED.into_response()),
                Err(err) => {
                    tracing::error!(
                        request_id = ctx.request_id().map(tracing::field::display),
                        remote_addr = %ctx.remote_addr_field(),
                        method = %ctx.method(),
                        url = %ctx.uri(),
                        "session check failed: {}",
                        err
                    );
                    Err(AppError::SessionCheck(err))
                }
            }
        })
    }
}
