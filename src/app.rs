/*
 * Responsibility
 * - Load Config → build dependencies → assemble the Router
 * - Install the request pipeline on /api/v1, wrapping the host limits
 * - Start axum::serve() and shut down gracefully
 */
use std::net::SocketAddr;
use std::{panic, sync::Arc};

use anyhow::Result;
use axum::{Router, routing::get};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api;
use crate::api::v1::handlers::health::health;
use crate::config::{Config, LogFormat};
use crate::middleware::{self, pipeline::Pipeline};
use crate::services::cache::ValkeyClient;
use crate::services::session::ValkeySessionService;
use crate::state::AppState;

fn init_tracing(format: LogFormat) {
    // Prefer RUST_LOG if set; otherwise use a sensible default.
    // Ex:
    // RUST_LOG=info,request_pipeline=debug cargo run
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().flatten_event(true))
            .init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

fn init_panic_hook() {
    // The pipeline's recover stage logs the panic message at ERROR together
    // with the request id; the hook only keeps the location, at DEBUG.
    panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_default();
        tracing::debug!(location = %location, "panic");
    }))
}

pub async fn run() -> Result<()> {
    let config = Config::from_env()?;
    init_tracing(config.log_format);
    init_panic_hook();

    tracing::info!(
        "starting API in {:?} mode on {}",
        config.app_env,
        config.addr
    );

    let state = build_state(&config).await?;
    let app = build_router(state, &config);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn build_state(config: &Config) -> Result<AppState> {
    // Process-level collaborators are built once here and shared by Arc.
    let cache = ValkeyClient::new(&config.valkey_url).await?;
    let sessions = ValkeySessionService::new(
        Arc::new(cache),
        config.session_cookie_name.clone(),
        config.session_key_prefix.clone(),
    );

    Ok(AppState::new(Arc::new(sessions)))
}

pub fn build_router(state: AppState, config: &Config) -> Router {
    let v1 = behind_pipeline(api::v1::routes(), &state, config);

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", v1)
        .with_state(state)
}

/// Host limits first, then the pipeline around them, so limit rejections and
/// timeouts are logged like any other response.
fn behind_pipeline(
    routes: Router<AppState>,
    state: &AppState,
    config: &Config,
) -> Router<AppState> {
    let pipeline = Arc::new(Pipeline::new(state.sessions.clone()));
    middleware::pipeline::apply(middleware::http::apply(routes, config), pipeline)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
