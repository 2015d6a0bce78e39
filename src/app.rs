use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::auth;
use crate::routes::system::{root, test_db};
use crate::state::AppState;

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/test-db", get(test_db))
        .nest("/api", auth::router())
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!(
                        "http_request",
                        %method,
                        uri = %uri,
                        status = tracing::field::Empty
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     _latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, "response");
                        } else {
                            tracing::info!(%status, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router, addr: &str) -> anyhow::Result<()> {
    let addr: std::net::SocketAddr = addr.parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::auth::{
        jwt::JwtKeys,
        repo::{MemoryUserStore, StoreError, UserStore},
        repo_types::{NewUser, User},
    };
    use crate::config::{AppConfig, JwtConfig};

    fn test_config() -> Arc<AppConfig> {
        Arc::new(AppConfig {
            database_url: "postgres://unused".into(),
            database_max_connections: 1,
            host: "127.0.0.1".into(),
            port: 0,
            jwt: JwtConfig {
                secret: "test-secret".into(),
                issuer: "test-iss".into(),
                audience: "test-aud".into(),
                ttl_minutes: 30,
            },
        })
    }

    fn app_with(store: Arc<dyn UserStore>) -> (Router, Arc<JwtKeys>) {
        let state = AppState::from_parts(test_config(), store);
        let keys = state.keys.clone();
        (build_app(state), keys)
    }

    async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let req = match body {
            Some(b) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    fn register_body(email: &str, password: &str) -> Value {
        json!({
            "firstname": "Ada",
            "lastname": "Lovelace",
            "email": email,
            "password": password,
        })
    }

    #[tokio::test]
    async fn register_login_scenario() {
        let (app, keys) = app_with(Arc::new(MemoryUserStore::new()));

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/register",
            Some(register_body("a@x.com", "secret123")),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "User registered successfully.");
        let user_id = body["user_id"].as_str().expect("user_id").to_string();

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/login",
            Some(json!({ "email": "a@x.com", "password": "secret123" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["token_type"], "bearer");
        let token = body["access_token"].as_str().expect("access_token");
        let claims = keys.verify(token).expect("token verifies");
        assert_eq!(claims.sub.to_string(), user_id);

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/login",
            Some(json!({ "email": "a@x.com", "password": "wrong" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "detail": "Invalid credentials." }));
    }

    #[tokio::test]
    async fn duplicate_email_returns_400() {
        let (app, _) = app_with(Arc::new(MemoryUserStore::new()));
        let (first, _) = call(
            &app,
            Method::POST,
            "/api/register",
            Some(register_body("a@x.com", "secret123")),
        )
        .await;
        assert_eq!(first, StatusCode::OK);

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/register",
            Some(register_body("A@X.com", "secret456")),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "detail": "Email is already registered." }));
    }

    #[tokio::test]
    async fn unknown_email_and_wrong_password_are_indistinguishable() {
        let (app, _) = app_with(Arc::new(MemoryUserStore::new()));
        call(
            &app,
            Method::POST,
            "/api/register",
            Some(register_body("a@x.com", "secret123")),
        )
        .await;

        let wrong = call(
            &app,
            Method::POST,
            "/api/login",
            Some(json!({ "email": "a@x.com", "password": "nope-nope" })),
        )
        .await;
        let unknown = call(
            &app,
            Method::POST,
            "/api/login",
            Some(json!({ "email": "ghost@x.com", "password": "secret123" })),
        )
        .await;
        assert_eq!(wrong, unknown);
    }

    #[tokio::test]
    async fn malformed_bodies_get_422() {
        let (app, _) = app_with(Arc::new(MemoryUserStore::new()));

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/register",
            Some(json!({ "email": "a@x.com", "password": "secret123" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["detail"].is_string());

        let (status, _) = call(
            &app,
            Method::POST,
            "/api/register",
            Some(register_body("not-an-email", "secret123")),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _) = call(
            &app,
            Method::POST,
            "/api/register",
            Some(register_body("a@x.com", "short")),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn status_and_root_respond() {
        let (app, _) = app_with(Arc::new(MemoryUserStore::new()));

        let (status, body) = call(&app, Method::GET, "/api/status", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "success" }));

        let (status, body) = call(&app, Method::GET, "/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["message"].is_string());
    }

    #[tokio::test]
    async fn test_db_reports_working_store() {
        let (app, _) = app_with(Arc::new(MemoryUserStore::new()));
        let (status, body) = call(&app, Method::GET, "/test-db", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "Database connection is working!");
    }

    struct DownStore;

    #[async_trait]
    impl UserStore for DownStore {
        async fn find_by_email(&self, _email: &str) -> Result<Option<User>, StoreError> {
            Err(StoreError::Unavailable(sqlx::Error::PoolTimedOut))
        }
        async fn insert(&self, _user: NewUser) -> Result<User, StoreError> {
            Err(StoreError::Unavailable(sqlx::Error::PoolTimedOut))
        }
        async fn ping(&self) -> Result<(), StoreError> {
            Err(StoreError::Unavailable(sqlx::Error::PoolTimedOut))
        }
    }

    #[tokio::test]
    async fn store_outage_is_5xx_without_internals() {
        let (app, _) = app_with(Arc::new(DownStore));

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/login",
            Some(json!({ "email": "a@x.com", "password": "secret123" })),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body, json!({ "detail": "Service temporarily unavailable." }));

        let (status, body) = call(&app, Method::GET, "/test-db", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body, json!({ "detail": "Database connection failed." }));
    }

    /// Lookups succeed, writes fail.
    struct ReadOnlyStore;

    #[async_trait]
    impl UserStore for ReadOnlyStore {
        async fn find_by_email(&self, _email: &str) -> Result<Option<User>, StoreError> {
            Ok(None)
        }
        async fn insert(&self, _user: NewUser) -> Result<User, StoreError> {
            Err(StoreError::Unavailable(sqlx::Error::PoolTimedOut))
        }
        async fn ping(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn register_store_outage_is_503() {
        let unavailable = json!({ "detail": "Service temporarily unavailable." });

        let (app, _) = app_with(Arc::new(DownStore));
        let (status, body) = call(
            &app,
            Method::POST,
            "/api/register",
            Some(register_body("a@x.com", "secret123")),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body, unavailable);

        let (app, _) = app_with(Arc::new(ReadOnlyStore));
        let (status, body) = call(
            &app,
            Method::POST,
            "/api/register",
            Some(register_body("a@x.com", "secret123")),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body, unavailable);
    }
}
