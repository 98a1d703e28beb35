use std::sync::Arc;

use axum::{Json, extract::Extension, response::IntoResponse};
use serde_json::json;

use crate::app::services::AppServices;

/// Liveness plus the queue connection state. Does not open a connection.
pub async fn health(Extension(services): Extension<Arc<AppServices>>) -> impl IntoResponse {
    let queue = services.queue();
    Json(json!({
        "status": "ok",
        "queue": {
            "name": queue.name(),
            "connection": queue.connection_state(),
        },
    }))
}
