//! Per-request context threaded through every pipeline stage.
//!
//! One `RequestContext` is created at pipeline entry and handed to each stage
//! as `&mut`. It is never shared between requests and is dropped when the
//! pipeline invocation returns.

use std::fmt;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, OriginalUri},
    http::{Method, Request, Uri, header},
};
use uuid::Uuid;

/// Correlation identifier tagging every log line of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Generates a fresh random (v4) identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Display form of an optional peer address.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RemoteAddr(Option<SocketAddr>);

impl fmt::Display for RemoteAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(addr) => addr.fmt(f),
            None => Ok(()),
        }
    }
}

#[derive(Debug)]
pub struct RequestContext {
    request_id: Option<RequestId>,
    method: Method,
    uri: Uri,
    remote_addr: Option<SocketAddr>,
    bytes_in: u64,
    started_at: Option<Instant>,
}

impl RequestContext {
    /// Captures the inbound metadata the stages log.
    ///
    /// Nested routers strip their prefix from `req.uri()`, so the original URI
    /// is preferred when axum recorded one.
    pub fn from_request(req: &Request<Body>) -> Self {
        let uri = req
            .extensions()
            .get::<OriginalUri>()
            .map(|OriginalUri(uri)| uri.clone())
            .unwrap_or_else(|| req.uri().clone());

        let remote_addr = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        let bytes_in = req
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        Self {
            request_id: None,
            method: req.method().clone(),
            uri,
            remote_addr,
            bytes_in,
            started_at: None,
        }
    }

    /// Sets the correlation identifier. The first assignment wins; the
    /// identifier in effect is returned.
    pub fn assign_request_id(&mut self, request_id: RequestId) -> RequestId {
        *self.request_id.get_or_insert(request_id)
    }

    pub fn request_id(&self) -> Option<RequestId> {
        self.request_id
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Remote address for log fields; empty when the server did not record
    /// one, so every event keeps the same keys.
    pub(crate) fn remote_addr_field(&self) -> RemoteAddr {
        RemoteAddr(self.remote_addr)
    }

    pub fn bytes_in(&self) -> u64 {
        self.bytes_in
    }

    pub(crate) fn start_timer(&mut self) {
        self.started_at = Some(Instant::now());
    }

    /// Whether a timer was started and its access-log record not yet taken.
    pub(crate) fn access_log_pending(&self) -> bool {
        self.started_at.is_some()
    }

    /// Stops the timer. Returns `None` when it was never started or has
    /// already been stopped, so a record can only be produced once.
    pub(crate) fn stop_timer(&mut self) -> Option<Duration> {
        self.started_at.take().map(|start| start.elapsed())
    }
}
