//! HTTP/SSE server for forge (axum).
//!
//! Routes: `POST /api/tasks/stream` (run a task, stream events as SSE),
//! `GET /api/logs/stream` (live filtered log follow), `GET /api/stats`
//! (governor + trace counters), `GET /api/models`, `POST /api/feedback`.
//!
//! **Public API**: [`run_serve`], [`run_serve_on_listener`],
//! [`app::router`].

pub mod app;
mod handlers;

use std::sync::Arc;

use forge::ServiceContext;
use tokio::net::TcpListener;
use tracing::info;

const DEFAULT_ADDR: &str = "127.0.0.1:8090";

/// Runs the server on an existing listener. Used by tests (bind to
/// 127.0.0.1:0 first, then pass the listener in).
pub async fn run_serve_on_listener(
    listener: TcpListener,
    ctx: Arc<ServiceContext>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = listener.local_addr()?;
    info!("forge server listening on http://{}", addr);
    let app = app::router(ctx);
    axum::serve(listener, app).await?;
    Ok(())
}

/// Builds the service context from the default config location and serves
/// on `addr` (default 127.0.0.1:8090).
pub async fn run_serve(addr: Option<&str>) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenv::dotenv().ok();
    let config = config::ConfigHandle::from_default_location();
    let ctx = ServiceContext::from_config(config)?;
    let addr = addr.unwrap_or(DEFAULT_ADDR);
    let listener = TcpListener::bind(addr).await?;
    run_serve_on_listener(listener, ctx).await
}
