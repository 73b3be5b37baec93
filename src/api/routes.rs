//! API route table.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;

use super::handlers::{self, ApiState};

/// Build the v1 API router.
pub fn api_routes(state: ApiState) -> Router {
    let max_upload = state.config.ingest.max_upload_bytes;

    Router::new()
        .route("/health", get(handlers::health))
        .route("/stats", get(handlers::stats))
        .route(
            "/patients/:patient_id/uploads",
            post(handlers::upload).layer(DefaultBodyLimit::max(max_upload)),
        )
        .route("/patients/:patient_id/readings", get(handlers::readings))
        .route("/patients/:patient_id/alerts", get(handlers::patient_alerts))
        .with_state(state)
}
