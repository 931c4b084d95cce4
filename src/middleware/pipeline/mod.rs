//! Fixed-order request pipeline.
//!
//! Every request behind the pipeline flows through these stages, outermost
//! first:
//!
//! ```text
//! Recover → RequestId → AccessLog → SessionGate → terminal handler
//! ```
//!
//! - `Recover` must be outermost so it catches panics from every other stage,
//!   including the access log's own bookkeeping.
//! - `RequestId` runs before anything that logs, so every line of a request
//!   (the 401 short-circuit included) carries the same identifier.
//! - `AccessLog` wraps the gate, so rejected requests are still logged.
//!
//! The order is not configurable.
//!
//! Stages receive the same `RequestContext` by `&mut` and return
//! `Result<Response, AppError>`; an `Err` is the pipeline's error channel and
//! is rendered by `AccessLog` through `IntoResponse`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::State,
    http::Request,
    middleware::{self, Next as RouterNext},
    response::{IntoResponse, Response},
};

use crate::error::AppError;
use crate::services::session::SessionService;
use crate::state::AppState;

pub mod access_log;
pub mod context;
pub mod recover;
pub mod request_id;
pub mod session;

pub use access_log::AccessLog;
pub use context::{RequestContext, RequestId};
pub use recover::Recover;
pub use request_id::{AssignRequestId, REQUEST_ID_HEADER};
pub use session::SessionGate;

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What every stage (and the terminal handler) produces.
pub type StageResult = Result<Response, AppError>;

/// One step of the pipeline.
///
/// A stage either calls `next.run(ctx, request)` exactly once or
/// short-circuits by returning its own response. It must not swallow an `Err`
/// coming from downstream unless rendering it is its job.
pub trait Stage: Send + Sync + 'static {
    /// Name used in logs and tests.
    fn name(&self) -> &'static str;

    fn call<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        request: Request<Body>,
        next: Next<'a>,
    ) -> BoxFuture<'a, StageResult>;
}

type Terminal<'a> =
    Box<dyn FnOnce(Request<Body>) -> BoxFuture<'static, StageResult> + Send + 'a>;

/// The rest of the chain, handed to a stage.
pub struct Next<'a> {
    inner: NextInner<'a>,
}

enum NextInner<'a> {
    Stage {
        stage: &'a dyn Stage,
        next: Box<Next<'a>>,
    },
    Terminal(Terminal<'a>),
}

impl<'a> Next<'a> {
    fn stage(stage: &'a dyn Stage, next: Next<'a>) -> Self {
        Self {
            inner: NextInner::Stage {
                stage,
                next: Box::new(next),
            },
        }
    }

    /// Terminal link invoking the business handler.
    pub fn terminal<F>(handler: F) -> Self
    where
        F: FnOnce(Request<Body>) -> BoxFuture<'static, StageResult> + Send + 'a,
    {
        Self {
            inner: NextInner::Terminal(Box::new(handler)),
        }
    }

    /// Runs the next stage, or the terminal handler at the end of the chain.
    ///
    /// Consumes `self`, so it can only be called once.
    pub fn run<'b>(
        self,
        ctx: &'b mut RequestContext,
        request: Request<Body>,
    ) -> BoxFuture<'b, StageResult>
    where
        'a: 'b,
    {
        match self.inner {
            NextInner::Stage { stage, next } => stage.call(ctx, request, *next),
            NextInner::Terminal(handler) => handler(request),
        }
    }
}

/// The composed pipeline: fixed stages around a terminal handler.
pub struct Pipeline {
    stages: Vec<Arc<dyn Stage>>,
}

impl Pipeline {
    /// Builds the pipeline in its fixed order.
    pub fn new(sessions: Arc<dyn SessionService>) -> Self {
        let stages: Vec<Arc<dyn Stage>> = vec![
            Arc::new(Recover),
            Arc::new(AssignRequestId),
            Arc::new(AccessLog),
            Arc::new(SessionGate::new(sessions)),
        ];
        Self { stages }
    }

    /// Stage names, outermost first.
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Runs one request through every stage and then `terminal`.
    pub async fn handle<F>(&self, request: Request<Body>, terminal: F) -> Response
    where
        F: FnOnce(Request<Body>) -> BoxFuture<'static, StageResult> + Send + 'static,
    {
        let mut ctx = RequestContext::from_request(&request);

        // Build from the inside out
        let mut next = Next::terminal(terminal);
        for stage in self.stages.iter().rev() {
            next = Next::stage(stage.as_ref(), next);
        }

        match next.run(&mut ctx, request).await {
            Ok(response) => response,
            Err(err) => err.into_response(),
        }
    }
}

/// Installs the pipeline in front of every route of `router`.
///
/// The terminal handler is the router's own inner service, so route handlers
/// only run once the gate has let the request through.
pub fn apply(router: Router<AppState>, pipeline: Arc<Pipeline>) -> Router<AppState> {
    tracing::debug!(stages = ?pipeline.stage_names(), "request pipeline installed");
    router.layer(middleware::from_fn_with_state(pipeline, pipeline_middleware))
}

async fn pipeline_middleware(
    State(pipeline): State<Arc<Pipeline>>,
    request: Request<Body>,
    next: RouterNext,
) -> Response {
    pipeline
        .handle(request, move |request| {
            Box::pin(async move { Ok(next.run(request).await) })
        })
        .await
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::time::Duration;

    use axum::body::to_bytes;
    use axum::http::{StatusCode, header};
    use futures_util::future::join_all;
    use tracing::Level;

    use super::*;
    use crate::services::session::SessionError;
    use crate::testing::{self, StaticSessions};

    fn pipeline(sessions: StaticSessions) -> Pipeline {
        Pipeline::new(Arc::new(sessions))
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn ok_terminal(_request: Request<Body>) -> BoxFuture<'static, StageResult> {
        Box::pin(async { Ok(StatusCode::OK.into_response()) })
    }

    #[test]
    fn stages_run_in_fixed_order() {
        let pipeline = pipeline(StaticSessions::authenticated("u"));
        assert_eq!(
            pipeline.stage_names(),
            vec!["recover", "request_id", "access_log", "session_gate"]
        );
    }

    #[tokio::test]
    async fn successful_request_is_logged_with_sizes() {
        let (logs, _guard) = testing::capture_logs();
        let pipeline = pipeline(StaticSessions::authenticated("u"));

        let request = Request::builder()
            .method("POST")
            .uri("/items")
            .header(header::CONTENT_LENGTH, "10")
            .body(Body::from("0123456789"))
            .unwrap();

        let response = pipeline
            .handle(request, |_req| {
                Box::pin(async { Ok(Response::new(Body::from(vec![b'x'; 42]))) })
            })
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        let header_id = response.headers()[REQUEST_ID_HEADER].to_str().unwrap().to_string();

        let entries = logs.access_entries();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.field("status"), Some("200"));
        assert_eq!(entry.field("bytes_out"), Some("42"));
        assert_eq!(entry.field("bytes_in"), Some("10"));
        assert_eq!(entry.field("error"), Some(""));
        assert_eq!(entry.field("method"), Some("POST"));
        assert_eq!(entry.field("url"), Some("/items"));
        assert_eq!(entry.field("request_id"), Some(header_id.as_str()));
        assert!(logs.at_level(Level::ERROR).is_empty());
    }

    #[tokio::test]
    async fn missing_session_is_a_silent_401() {
        let (logs, _guard) = testing::capture_logs();
        let pipeline = pipeline(StaticSessions::no_session());

        let response = pipeline
            .handle(get("/private"), |_req| {
                Box::pin(testing::panicking_handler("terminal handler must not run"))
            })
            .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(body.is_empty());

        let entries = logs.access_entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].field("status"), Some("401"));
        assert_eq!(entries[0].field("error"), Some(""));
        assert!(logs.at_level(Level::ERROR).is_empty());
    }

    #[tokio::test]
    async fn session_backend_failure_is_logged_once_and_rendered() {
        let (logs, _guard) = testing::capture_logs();
        let pipeline = pipeline(StaticSessions::failing("store unreachable"));

        let response = pipeline.handle(get("/private"), ok_terminal).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let header_id = response.headers()[REQUEST_ID_HEADER].to_str().unwrap().to_string();

        let errors = logs.at_level(Level::ERROR);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "session check failed: store unreachable");
        assert_eq!(errors[0].field("request_id"), Some(header_id.as_str()));

        let entries = logs.access_entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].field("error"), Some("store unreachable"));
        assert_eq!(entries[0].field("status"), Some("500"));
        assert_eq!(entries[0].field("request_id"), Some(header_id.as_str()));
    }

    #[tokio::test]
    async fn terminal_panic_is_recovered() {
        let (logs, _guard) = testing::capture_logs();
        let pipeline = pipeline(StaticSessions::authenticated("u"));

        let response = pipeline
            .handle(get("/divide"), |_req| {
                Box::pin(testing::panicking_handler("division by zero"))
            })
            .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let errors = logs.at_level(Level::ERROR);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("division by zero"));
        assert!(errors[0].field("request_id").is_some());

        let entries = logs.access_entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].field("status"), Some("500"));
        assert_eq!(entries[0].field("error"), Some("panic: division by zero"));
        assert_eq!(entries[0].field("request_id"), errors[0].field("request_id"));
    }

    #[tokio::test]
    async fn handler_errors_are_rendered_and_logged() {
        let (logs, _guard) = testing::capture_logs();
        let pipeline = pipeline(StaticSessions::authenticated("u"));

        let response = pipeline
            .handle(get("/items"), |_req| {
                Box::pin(async { Err(AppError::bad_request("EMPTY_BODY", "empty")) })
            })
            .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let entries = logs.access_entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].field("status"), Some("400"));
        assert_eq!(entries[0].field("error"), Some("EMPTY_BODY: empty"));
        assert!(logs.at_level(Level::ERROR).is_empty());
    }

    #[tokio::test]
    async fn latency_covers_handler_time() {
        let (logs, _guard) = testing::capture_logs();
        let pipeline = pipeline(StaticSessions::authenticated("u"));

        pipeline
            .handle(get("/slow"), |_req| {
                Box::pin(async {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok(StatusCode::OK.into_response())
                })
            })
            .await;

        let entries = logs.access_entries();
        let latency_us: u64 = entries[0].field("latency_us").unwrap().parse().unwrap();
        assert!(latency_us >= 50_000, "latency_us = {latency_us}");
    }

    #[tokio::test]
    async fn concurrent_requests_get_distinct_ids() {
        let (logs, _guard) = testing::capture_logs();
        let pipeline = pipeline(StaticSessions::authenticated("u"));

        let responses = join_all((0..32).map(|i| {
            pipeline.handle(get(&format!("/items/{i}")), |_req| {
                Box::pin(async {
                    tokio::task::yield_now().await;
                    Ok(StatusCode::OK.into_response())
                })
            })
        }))
        .await;

        let header_ids: HashSet<String> = responses
            .iter()
            .map(|r| r.headers()[REQUEST_ID_HEADER].to_str().unwrap().to_string())
            .collect();
        assert_eq!(header_ids.len(), 32);

        let entries = logs.access_entries();
        assert_eq!(entries.len(), 32);
        let logged_ids: HashSet<String> = entries
            .iter()
            .map(|e| e.field("request_id").unwrap().to_string())
            .collect();
        assert_eq!(logged_ids, header_ids);
    }

    #[tokio::test]
    async fn gate_sees_the_sentinel_not_the_message() {
        let (logs, _guard) = testing::capture_logs();
        // An anomaly whose text mimics the sentinel is still an anomaly.
        let pipeline = pipeline(StaticSessions::new(|| {
            Err(SessionError::Unavailable("no session".into()))
        }));

        let response = pipeline.handle(get("/private"), ok_terminal).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(logs.at_level(Level::ERROR).len(), 1);
    }
}
