use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};
use tracing::{error, instrument};

use crate::auth::services::AuthService;

pub async fn root() -> Json<Value> {
    Json(json!({ "message": "Welcome to the userauth API" }))
}

/// Liveness probe for the store connection.
#[instrument(skip(auth))]
pub async fn test_db(State(auth): State<AuthService>) -> (StatusCode, Json<Value>) {
    match auth.store_ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "status": "Database connection is working!" })),
        ),
        Err(e) => {
            error!(error = ?e, "database ping failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "detail": "Database connection failed." })),
            )
        }
    }
}
