/*
 * Responsibility
 * - Public interface of the middleware layer
 * - pipeline: per-request stages (recover / request id / access log / session gate)
 * - http: host-level limits applied outside the pipeline
 */
pub mod http;
pub mod pipeline;
