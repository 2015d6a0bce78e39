use std::sync::Arc;

use anyhow::Context;
use lazy_static::lazy_static;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::auth::{
    dto::{LoginRequest, RegisterRequest},
    error::AuthError,
    jwt::JwtKeys,
    password::{hash_password, verify_password},
    repo::UserStore,
    repo_types::NewUser,
};

lazy_static! {
    /// Verified against when the email is unknown, so a miss costs one Argon2 run like a hit does.
    static ref DUMMY_HASH: String = hash_password("not-a-real-user-password").unwrap_or_else(|e| {
        error!(error = %e, "failed to build dummy password hash; unknown-email logins skip argon2");
        String::new()
    });
}

/// Computes the dummy hash now instead of on the first unknown-email login.
pub fn warm_up() {
    lazy_static::initialize(&DUMMY_HASH);
}

/// Registration and login over an injected store and the process-wide signing keys.
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn UserStore>,
    keys: Arc<JwtKeys>,
}

impl AuthService {
    pub fn new(store: Arc<dyn UserStore>, keys: Arc<JwtKeys>) -> Self {
        Self { store, keys }
    }

    /// Creates a user and returns its id. Expects an already-normalized request.
    pub async fn register(&self, req: RegisterRequest) -> Result<Uuid, AuthError> {
        if self.store.find_by_email(&req.email).await?.is_some() {
            warn!(email = %req.email, "email already registered");
            return Err(AuthError::DuplicateEmail);
        }

        let RegisterRequest {
            firstname,
            lastname,
            email,
            password,
        } = req;
        let password_hash = run_blocking(move || hash_password(&password)).await??;

        // The store still rejects a duplicate that raced past the lookup above.
        let user = self
            .store
            .insert(NewUser {
                firstname,
                lastname,
                email,
                password_hash,
            })
            .await?;

        info!(user_id = %user.id, email = %user.email, "user registered");
        Ok(user.id)
    }

    /// Checks credentials and returns a signed access token.
    pub async fn login(&self, req: LoginRequest) -> Result<String, AuthError> {
        let user = self.store.find_by_email(&req.email).await?;

        let stored_hash = user.as_ref().map(|u| u.password_hash.clone());
        let password = req.password;
        let matches = run_blocking(move || match stored_hash {
            Some(h) => verify_password(&password, &h),
            None => {
                let _ = verify_password(&password, &DUMMY_HASH);
                false
            }
        })
        .await?;

        let user = match user {
            Some(u) if matches => u,
            Some(u) => {
                warn!(email = %req.email, user_id = %u.id, "login invalid password");
                return Err(AuthError::InvalidCredentials);
            }
            None => {
                warn!(email = %req.email, "login unknown email");
                return Err(AuthError::InvalidCredentials);
            }
        };

        let token = self.keys.sign_access(user.id)?;
        debug!(user_id = %user.id, "access token issued");
        info!(user_id = %user.id, "user logged in");
        Ok(token)
    }

    pub async fn store_ping(&self) -> Result<(), AuthError> {
        self.store.ping().await?;
        Ok(())
    }
}

/// Argon2 is CPU-bound; keep it off the async workers.
async fn run_blocking<F, T>(f: F) -> Result<T, AuthError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let out = tokio::task::spawn_blocking(f)
        .await
        .context("password hashing task failed")?;
    Ok(out)
}
