//! HTTP service whose `/api/v1` routes sit behind a fixed request pipeline:
//! panic recovery, correlation ids, access logging and a session gate.
//!
//! See [`middleware::pipeline`] for the stage order.

pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod middleware;
pub mod services;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;
