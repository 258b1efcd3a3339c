pub mod health;

use axum::{routing::get, Router};

use crate::personalize::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/v1/topics", get(handlers::handle_topics))
        .route("/api/v1/newsletter", get(handlers::handle_newsletter))
        .with_state(state)
}
