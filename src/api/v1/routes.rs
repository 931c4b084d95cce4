/*
 * Responsibility
 * - URL structure of v1
 * - Every route here sits behind the request pipeline (applied in app.rs)
 */
use axum::{
    Router,
    routing::{get, post},
};

use crate::state::AppState;

use crate::api::v1::handlers::{echo::echo, ping::ping};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/ping", get(ping))
        .route("/echo", post(echo))
}
