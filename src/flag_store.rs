use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::log_db_operation;

pub const WELCOME_SEEN_KEY: &str = "anatomy-app-welcome-seen";

/// Small boolean key-value capability, e.g. the onboarding flag.
#[async_trait]
pub trait FlagStore: Send + Sync {
    async fn get_flag(&self, key: &str) -> Result<bool>;
    async fn set_flag(&self, key: &str, value: bool) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct InMemoryFlagStore {
    flags: Mutex<HashMap<String, bool>>,
}

impl InMemoryFlagStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FlagStore for InMemoryFlagStore {
    async fn get_flag(&self, key: &str) -> Result<bool> {
        let flags = self
            .flags
            .lock()
            .map_err(|_| anyhow::anyhow!("flag store lock poisoned"))?;
        Ok(flags.get(key).copied().unwrap_or(false))
    }

    async fn set_flag(&self, key: &str, value: bool) -> Result<()> {
        let mut flags = self
            .flags
            .lock()
            .map_err(|_| anyhow::anyhow!("flag store lock poisoned"))?;
        flags.insert(key.to_string(), value);
        Ok(())
    }
}

#[derive(Clone)]
pub struct SqliteFlagStore {
    pool: SqlitePool,
}

impl SqliteFlagStore {
    pub async fn new(database_url: &str) -> Result<Self> {
        // A single connection keeps `sqlite::memory:` databases shared across calls
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(database_url)
            .await?;
        let store = SqliteFlagStore { pool };
        store.migrate().await?;
        log_db_operation!(info, "migrate", "flag store initialized");
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS flags (
                key TEXT PRIMARY KEY,
                value INTEGER NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl FlagStore for SqliteFlagStore {
    async fn get_flag(&self, key: &str) -> Result<bool> {
        let row = sqlx::query("SELECT value FROM flags WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        let value = match row {
            Some(row) => row.try_get::<i64, _>("value")? != 0,
            None => false,
        };
        log_db_operation!(debug, "get_flag", key = key);
        Ok(value)
    }

    async fn set_flag(&self, key: &str, value: bool) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO flags (key, value, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value as i64)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        log_db_operation!(debug, "set_flag", key = key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_store_defaults_to_false() {
        let store = InMemoryFlagStore::new();
        assert!(!store.get_flag(WELCOME_SEEN_KEY).await.unwrap());

        store.set_flag(WELCOME_SEEN_KEY, true).await.unwrap();
        assert!(store.get_flag(WELCOME_SEEN_KEY).await.unwrap());
    }

    #[tokio::test]
    async fn test_sqlite_store_round_trip() {
        let store = SqliteFlagStore::new("sqlite::memory:").await.unwrap();
        assert!(!store.get_flag(WELCOME_SEEN_KEY).await.unwrap());

        store.set_flag(WELCOME_SEEN_KEY, true).await.unwrap();
        assert!(store.get_flag(WELCOME_SEEN_KEY).await.unwrap());

        store.set_flag(WELCOME_SEEN_KEY, false).await.unwrap();
        assert!(!store.get_flag(WELCOME_SEEN_KEY).await.unwrap());
    }

    #[tokio::test]
    async fn test_sqlite_store_rejects_bad_url() {
        assert!(SqliteFlagStore::new("invalid://url").await.is_err());
    }
}
