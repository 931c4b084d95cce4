/*
 * Responsibility
 * - Shared context attached to the Router (AppState)
 * - Built once in app::run and cloned per request (Arc inside, clone is cheap)
 */
use std::sync::Arc;

use crate::services::session::SessionService;

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<dyn SessionService>,
}

impl AppState {
    pub fn new(sessions: Arc<dyn SessionService>) -> Self {
        Self { sessions }
    }
}
