//! Axum router wiring for the exposition endpoint and health endpoints.

use axum::{routing::get, Router};

use crate::{app_state::AppState, ops};

/// `metrics_path` must start with `/` and differ from the health routes.
pub fn build_router(state: AppState, metrics_path: &str) -> Router {
    Router::new()
        .route(metrics_path, get(ops::metrics))
        .route("/healthz", get(ops::healthz))
        .route("/readyz", get(ops::readyz))
        .with_state(state)
}
