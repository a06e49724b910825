//! HTTP API for reportflow.

pub mod error;
pub mod handlers;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

pub use error::ApiError;
pub use state::AppState;

use handlers::{admin, events, health, reports};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health::health))
        .route("/api/reports", post(reports::submit).get(reports::list))
        .route("/api/reports/:id/progress", get(reports::progress))
        .route("/api/reports/:id/sections/:order", get(reports::section))
        .route("/api/reports/:id/retry", post(reports::retry))
        .route(
            "/api/reports/:id/sections/:order/retry",
            post(reports::retry_section),
        )
        .route("/api/reports/:id/cancel", post(reports::cancel))
        .route("/api/reports/:id/events/stream", get(events::stream))
        .route("/api/admin/jobs", get(admin::list_jobs))
        .route("/api/admin/queue", get(admin::queue))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
