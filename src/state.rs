use std::sync::Arc;

use axum::extract::FromRef;

use crate::auth::{
    jwt::JwtKeys,
    repo::{PgUserStore, UserStore},
    services::{self, AuthService},
};
use crate::config::AppConfig;
use crate::db::{self, Schema};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn UserStore>,
    pub keys: Arc<JwtKeys>,
}

impl AppState {
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let pool = db::connect(&config).await?;
        let store = Arc::new(PgUserStore::new(pool, &Schema::users()).await?) as Arc<dyn UserStore>;
        Ok(Self::from_parts(Arc::new(config), store))
    }

    /// Signing keys are derived here, once per process.
    pub fn from_parts(config: Arc<AppConfig>, store: Arc<dyn UserStore>) -> Self {
        services::warm_up();
        let keys = Arc::new(JwtKeys::from_config(&config.jwt));
        Self {
            config,
            store,
            keys,
        }
    }
}

impl FromRef<AppState> for AuthService {
    fn from_ref(state: &AppState) -> Self {
        AuthService::new(state.store.clone(), state.keys.clone())
    }
}
