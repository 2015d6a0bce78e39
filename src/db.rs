use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::info;

use crate::config::AppConfig;

// gen_random_uuid() is built in from Postgres 13.
const CREATE_USERS: &str = r#"
    CREATE TABLE IF NOT EXISTS users (
        id            UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        firstname     TEXT NOT NULL,
        lastname      TEXT NOT NULL,
        email         TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL
    )
"#;

/// Table definitions handed to a store at construction.
///
/// Every statement must be idempotent; they run on each startup.
#[derive(Debug, Clone)]
pub struct Schema {
    statements: Vec<&'static str>,
}

impl Schema {
    pub fn users() -> Self {
        Self {
            statements: vec![CREATE_USERS],
        }
    }

    pub fn statements(&self) -> &[&'static str] {
        &self.statements
    }

    pub async fn apply(&self, db: &PgPool) -> anyhow::Result<()> {
        for stmt in &self.statements {
            sqlx::query(stmt)
                .execute(db)
                .await
                .with_context(|| format!("apply schema statement: {}", stmt.trim()))?;
        }
        info!(statements = self.statements.len(), "schema ensured");
        Ok(())
    }
}

pub async fn connect(config: &AppConfig) -> anyhow::Result<PgPool> {
    let db = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .context("connect to database")?;
    Ok(db)
}
