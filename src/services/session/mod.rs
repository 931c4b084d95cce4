//! Session validation capability consumed by the authentication gate.
//!
//! The gate only needs to tell three outcomes apart: a valid session, no
//! session at all (expected traffic), and anything else (an anomaly). The
//! second case is the `SessionError::NoSession` variant and must be matched by
//! variant, never by message.

use async_trait::async_trait;
use axum::http::HeaderMap;
use thiserror::Error;

pub mod valkey;

pub use valkey::ValkeySessionService;

/// Authenticated principal resolved from a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub subject: String,
}

impl Principal {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    /// The request carries no session, or the session is unknown/expired.
    #[error("no session")]
    NoSession,
    /// The session backend could not answer.
    #[error("{0}")]
    Unavailable(String),
}

/// Resolve the session carried by a request's headers.
///
/// Implementations are shared across concurrent requests and must not rely on
/// per-request mutable state.
#[async_trait]
pub trait SessionService: Send + Sync + 'static {
    async fn check_session(&self, headers: &HeaderMap) -> Result<Principal, SessionError>;
}
