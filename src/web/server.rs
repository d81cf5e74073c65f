use axum::{routing::get, Router};
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;

use crate::config::WebConfig;
use crate::pipeline::HarvestJob;

use super::api::{get_status, health_check, AppState};

pub fn router(job: Arc<HarvestJob>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(get_status))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { job })
}

/// Serve the status endpoints until `shutdown_rx` flips to true.
pub async fn run_server(
    job: Arc<HarvestJob>,
    web_config: WebConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let app = router(job);

    let listener = tokio::net::TcpListener::bind(&web_config.listen).await?;
    tracing::info!(listen = %web_config.listen, "Web server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.wait_for(|&v| v).await;
            tracing::info!("Web server shutting down gracefully");
        })
        .await
}
