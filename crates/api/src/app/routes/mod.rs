use axum::{
    Router,
    routing::{get, post},
};

pub mod jobs;
pub mod system;

/// Router for every endpoint. Authentication happens per request inside the
/// submission flow, so there is no separate protected tree.
pub fn router() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .route("/jobs", post(jobs::create))
        .route("/jobs/:id", get(jobs::get))
        .route("/jobs/:id/requeue", post(jobs::requeue))
}
