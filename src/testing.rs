//! Test helpers: log capture and session fakes.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::http::HeaderMap;
use tracing::field::{Field, Visit};
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

use crate::middleware::pipeline::StageResult;
use crate::middleware::pipeline::access_log::ACCESS_LOG_MESSAGE;
use crate::services::session::{Principal, SessionError, SessionService};

#[derive(Debug, Clone)]
pub struct CapturedEvent {
    pub level: Level,
    pub message: String,
    pub fields: BTreeMap<String, String>,
}

impl CapturedEvent {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

#[derive(Debug, Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<CapturedEvent>>>);

impl CapturedLogs {
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.0.lock().unwrap().clone()
    }

    pub fn at_level(&self, level: Level) -> Vec<CapturedEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.level == level)
            .collect()
    }

    pub fn access_entries(&self) -> Vec<CapturedEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.message == ACCESS_LOG_MESSAGE)
            .collect()
    }
}

struct CaptureLayer {
    logs: CapturedLogs,
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        self.logs.0.lock().unwrap().push(CapturedEvent {
            level: *event.metadata().level(),
            message: visitor.message,
            fields: visitor.fields,
        });
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: String,
    fields: BTreeMap<String, String>,
}

impl FieldVisitor {
    fn insert(&mut self, field: &Field, value: String) {
        if field.name() == "message" {
            self.message = value;
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert(field, format!("{value:?}"));
    }
}

/// Captures every event emitted on the current thread until the guard drops.
///
/// `#[tokio::test]` runs on a current-thread runtime, so events from the
/// futures under test land here too.
pub fn capture_logs() -> (CapturedLogs, DefaultGuard) {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::registry().with(CaptureLayer { logs: logs.clone() });
    let guard = tracing::subscriber::set_default(subscriber);
    (logs, guard)
}

type Outcome = dyn Fn() -> Result<Principal, SessionError> + Send + Sync;

/// Session service answering every request with the same outcome.
#[derive(Clone)]
pub struct StaticSessions {
    outcome: Arc<Outcome>,
}

impl StaticSessions {
    pub fn new<F>(outcome: F) -> Self
    where
        F: Fn() -> Result<Principal, SessionError> + Send + Sync + 'static,
    {
        Self {
            outcome: Arc::new(outcome),
        }
    }

    pub fn authenticated(subject: &'static str) -> Self {
        Self::new(move || Ok(Principal::new(subject)))
    }

    pub fn no_session() -> Self {
        Self::new(|| Err(SessionError::NoSession))
    }

    pub fn failing(message: &'static str) -> Self {
        Self::new(move || Err(SessionError::Unavailable(message.to_string())))
    }
}

#[async_trait]
impl SessionService for StaticSessions {
    async fn check_session(&self, _headers: &HeaderMap) -> Result<Principal, SessionError> {
        (self.outcome)()
    }
}

/// Terminal handler body that panics with `message`.
pub async fn panicking_handler(message: &'static str) -> StageResult {
    panic!("{message}")
}

/// Terminal handler body that panics with an arbitrary payload.
pub async fn panicking_with<P: Any + Send + 'static>(payload: P) -> StageResult {
    std::panic::panic_any(payload)
}
