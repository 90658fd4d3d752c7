//! Axum app: state and router.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use forge::{ServiceContext, WorkflowEngine};

use crate::handlers;

pub struct AppState {
    pub ctx: Arc<ServiceContext>,
    pub engine: WorkflowEngine,
}

pub fn router(ctx: Arc<ServiceContext>) -> Router {
    let state = Arc::new(AppState {
        engine: WorkflowEngine::new(Arc::clone(&ctx)),
        ctx,
    });
    Router::new()
        .route("/api/tasks/stream", post(handlers::stream_task))
        .route("/api/logs/stream", get(handlers::stream_logs))
        .route("/api/stats", get(handlers::stats))
        .route("/api/models", get(handlers::models))
        .route("/api/feedback", post(handlers::feedback))
        .with_state(state)
}
