use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;

use crate::auth::repo_types::{NewUser, User};
use crate::db::Schema;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("email is already registered")]
    DuplicateEmail,
    #[error("user store unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),
}

/// Persistence for user records keyed by email.
///
/// Implementations must reject a second insert for the same email with
/// [`StoreError::DuplicateEmail`], even under concurrent inserts.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn insert(&self, user: NewUser) -> Result<User, StoreError>;
    /// Round-trips to the backing store.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Postgres-backed store. Uniqueness comes from the UNIQUE constraint on `users.email`.
#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    /// Applies `schema` to the pool and wraps it.
    pub async fn new(db: PgPool, schema: &Schema) -> anyhow::Result<Self> {
        schema.apply(&db).await?;
        Ok(Self { db })
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, firstname, lastname, email, password_hash
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn insert(&self, user: NewUser) -> Result<User, StoreError> {
        // Dropping `tx` without commit rolls back.
        let mut tx = self.db.begin().await?;
        let created = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (firstname, lastname, email, password_hash)
            VALUES ($1, $2, $3, $4)
            RETURNING id, firstname, lastname, email, password_hash
            "#,
        )
        .bind(&user.firstname)
        .bind(&user.lastname)
        .bind(&user.email)
        .bind(&user.password_hash)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_insert_error)?;
        tx.commit().await?;
        Ok(created)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.db).await?;
        Ok(())
    }
}

fn map_insert_error(e: sqlx::Error) -> StoreError {
    let unique_violation = matches!(&e, sqlx::Error::Database(db) if db.is_unique_violation());
    if unique_violation {
        StoreError::DuplicateEmail
    } else {
        StoreError::Unavailable(e)
    }
}

/// In-memory test double; enforces email uniqueness under its lock.
#[cfg(test)]
pub mod memory {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use tokio::sync::Mutex;
    use uuid::Uuid;

    use super::{StoreError, UserStore};
    use crate::auth::repo_types::{NewUser, User};

    #[derive(Default)]
    pub struct MemoryUserStore {
        users: Mutex<HashMap<String, User>>,
    }

    impl MemoryUserStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn count_by_email(&self, email: &str) -> usize {
            let users = self.users.lock().await;
            users.values().filter(|u| u.email == email).count()
        }
    }

    #[async_trait]
    impl UserStore for MemoryUserStore {
        async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
            Ok(self.users.lock().await.get(email).cloned())
        }

        async fn insert(&self, user: NewUser) -> Result<User, StoreError> {
            let mut users = self.users.lock().await;
            if users.contains_key(&user.email) {
                return Err(StoreError::DuplicateEmail);
            }
            let created = User {
                id: Uuid::new_v4(),
                firstname: user.firstname,
                lastname: user.lastname,
                email: user.email,
                password_hash: user.password_hash,
            };
            users.insert(created.email.clone(), created.clone());
            Ok(created)
        }

        async fn ping(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }
}

#[cfg(test)]
pub use memory::MemoryUserStore;
