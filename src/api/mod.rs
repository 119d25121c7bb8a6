mod errors;
pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::AppContext;

/// Build the REST API router over an assembled orchestration core.
pub fn router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/jobs", post(handlers::submit_job))
        .route("/jobs", get(handlers::list_jobs))
        .route("/jobs/{id}", get(handlers::get_job))
        .route("/jobs/{id}/cancel", post(handlers::cancel_job))
        .route("/tasks", get(handlers::list_tasks))
        .route("/tasks/{id}/pause", post(handlers::pause_task))
        .route("/tasks/{id}/resume", post(handlers::resume_task))
        .route("/tasks/{id}/trigger", post(handlers::trigger_task))
        .route("/workflows", get(handlers::list_workflows))
        .route("/workflows/{id}/trigger", post(handlers::trigger_workflow))
        .route("/runs", get(handlers::list_runs))
        .route("/runs/{id}", get(handlers::get_run))
        .route("/runs/{id}/cancel", post(handlers::cancel_run))
        .route("/breakers", get(handlers::list_breakers))
        .route("/breakers/{key}/reset", post(handlers::reset_breaker))
        .route("/executors", get(handlers::list_executors))
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}

/// Start the REST API server.
pub async fn serve(host: &str, port: u16, ctx: Arc<AppContext>) -> Result<()> {
    let app = router(ctx);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Tradeflow API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
