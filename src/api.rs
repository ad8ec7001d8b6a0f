pub(crate) mod health;
pub(crate) mod metrics;
pub(crate) mod pdf;
pub(crate) mod research;

use axum::{
    routing::{get, post},
    Router,
};

use crate::app::AppState;

pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route("/health/ready", get(health::ready))
        .route("/health/live", get(health::live))
        .route("/metrics", get(metrics::exporter))
        .route("/research", post(research::submit))
        .route("/research/{job_id}", get(research::status))
        .route("/research/{job_id}/report", get(research::report))
        .route("/research/{job_id}/cancel", post(research::cancel))
        .route("/research/ws/{job_id}", get(research::stream))
        .route("/generate-pdf", post(pdf::generate))
        .with_state(state)
}
