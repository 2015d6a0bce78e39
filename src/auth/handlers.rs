use axum::{
    extract::{rejection::JsonRejection, State},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tracing::{instrument, warn};

use crate::{
    auth::{
        dto::{LoginRequest, RegisterRequest, RegisterResponse, TokenResponse},
        error::AuthError,
        services::AuthService,
    },
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/status", get(status))
}

fn malformed(rejection: JsonRejection) -> AuthError {
    warn!(error = %rejection.body_text(), "rejected request body");
    AuthError::MalformedInput(rejection.body_text())
}

#[instrument(skip(auth, payload))]
pub async fn register(
    State(auth): State<AuthService>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Json<RegisterResponse>, AuthError> {
    let Json(payload) = payload.map_err(malformed)?;
    let payload = payload.normalized()?;

    let user_id = auth.register(payload).await?;
    Ok(Json(RegisterResponse {
        message: "User registered successfully.".into(),
        user_id,
    }))
}

#[instrument(skip(auth, payload))]
pub async fn login(
    State(auth): State<AuthService>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>, AuthError> {
    let Json(payload) = payload.map_err(malformed)?;
    let payload = payload.normalized()?;

    let token = auth.login(payload).await?;
    Ok(Json(TokenResponse::bearer(token)))
}

pub async fn status() -> Json<Value> {
    Json(json!({ "status": "success" }))
}
