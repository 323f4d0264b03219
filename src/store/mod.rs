//! Record store: the `users` table behind a small async trait, with one
//! implementation per supported database.

use std::sync::Arc;

use axum::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::DatabaseSettings;

mod postgres;
mod sqlite;

pub use postgres::PgUserStore;
pub use sqlite::SqliteUserStore;

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct UserRecord {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewUser {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
}

impl NewUser {
    /// Both fields must be present; their content is not validated further.
    pub fn is_complete(&self) -> bool {
        !self.name.trim().is_empty() && !self.email.trim().is_empty()
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("unsupported database url scheme: {0}")]
    UnsupportedUrl(String),
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// All records ordered by id.
    async fn list(&self) -> Result<Vec<UserRecord>, StoreError>;

    /// Inserts a record; id and `created_at` are assigned by the database.
    async fn create(&self, user: &NewUser) -> Result<(), StoreError>;

    /// Returns the number of deleted rows.
    async fn delete_all(&self) -> Result<u64, StoreError>;

    /// Returns the number of deleted rows (0 or 1).
    async fn delete(&self, id: i64) -> Result<u64, StoreError>;
}

pub async fn connect(settings: &DatabaseSettings) -> Result<Arc<dyn UserStore>, StoreError> {
    match settings {
        DatabaseSettings::Url(url) if url.starts_with("sqlite:") => {
            Ok(Arc::new(SqliteUserStore::connect(url).await?))
        }
        DatabaseSettings::Url(url)
            if url.starts_with("postgres://") || url.starts_with("postgresql://") =>
        {
            Ok(Arc::new(PgUserStore::connect_url(url).await?))
        }
        DatabaseSettings::Url(url) => Err(StoreError::UnsupportedUrl(
            url.split(':').next().unwrap_or_default().to_string(),
        )),
        DatabaseSettings::Postgres {
            host,
            port,
            user,
            password,
            name,
        } => {
            let options = sqlx::postgres::PgConnectOptions::new()
                .host(host)
                .port(*port)
                .username(user)
                .password(password)
                .database(name);
            Ok(Arc::new(PgUserStore::connect_with(options).await?))
        }
    }
}
