/*
 * Responsibility
 * - Response DTOs of /ping and /echo
 */
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct PingResponse {
    pub status: &'static str,
    pub request_id: String,
}

#[derive(Debug, Serialize)]
pub struct EchoResponse {
    pub request_id: String,
    pub length: usize,
    pub body: String,
}
