use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{HeaderMap, header};

use crate::services::cache::CacheClient;
use crate::services::session::{Principal, SessionError, SessionService};

/// Session lookup against a Valkey (Redis protocol) store.
///
/// The token is read from the session cookie, falling back to
/// `Authorization: Bearer <token>`. The stored value under `<prefix>:<token>`
/// is the principal's subject.
#[derive(Clone)]
pub struct ValkeySessionService<C: CacheClient> {
    cache: Arc<C>,
    cookie_name: String,
    // Key prefix to avoid collisions with other data in the same store
    prefix: String,
}

impl<C: CacheClient> ValkeySessionService<C> {
    pub fn new(cache: Arc<C>, cookie_name: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            cache,
            cookie_name: cookie_name.into(),
            prefix: prefix.into(),
        }
    }

    pub fn key(&self, token: &str) -> String {
        format!("{}:{}", self.prefix, token)
    }

    fn token<'h>(&self, headers: &'h HeaderMap) -> Option<&'h str> {
        session_cookie(headers, &self.cookie_name).or_else(|| bearer_token(headers))
    }
}

#[async_trait]
impl<C: CacheClient> SessionService for ValkeySessionService<C> {
    async fn check_session(&self, headers: &HeaderMap) -> Result<Principal, SessionError> {
        let token = self.token(headers).ok_or(SessionError::NoSession)?;

        let subject = self
            .cache
            .get_string(&self.key(token))
            .await
            .map_err(|e| {
                SessionError::Unavailable(format!("{}: {}", self.cache.backend_name(), e))
            })?;

        match subject {
            Some(subject) if !subject.is_empty() => Ok(Principal::new(subject)),
            _ => Err(SessionError::NoSession),
        }
    }
}

fn session_cookie<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.trim())
        .filter(|v| !v.is_empty())
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|v| !v.is_empty())
}
