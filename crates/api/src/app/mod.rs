//! HTTP application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store/queue/verifier wiring (in-memory or persistent)
//! - `routes/`: HTTP routes + handlers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::http::header;
use axum::{Extension, Router};
use tower::ServiceBuilder;
use tower_http::sensitive_headers::SetSensitiveRequestHeadersLayer;
use tower_http::trace::TraceLayer;

use crate::cors::{CorsPolicy, cors_middleware};

pub mod errors;
pub mod routes;
pub mod services;

pub use services::AppServices;

/// Build the full HTTP router (public entrypoint used by `main.rs` and tests).
pub fn build_app(services: AppServices, cors: CorsPolicy) -> Router {
    let services = Arc::new(services);

    routes::router()
        .layer(Extension(services))
        .layer(axum::middleware::from_fn_with_state(
            Arc::new(cors),
            cors_middleware,
        ))
        .layer(
            ServiceBuilder::new()
                .layer(SetSensitiveRequestHeadersLayer::new([header::AUTHORIZATION]))
                .layer(TraceLayer::new_for_http()),
        )
}
