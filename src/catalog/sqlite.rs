//! SQLite-backed [`Storage`] implementation.
//!
//! Each storage key is one row of the `kv_store` table. The database runs in
//! WAL mode, so an upload process and a library process can share the same
//! catalog file.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::{db, migrate};

use super::Storage;

/// SQLite implementation of the [`Storage`] trait.
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connects to the configured catalog file and ensures the schema exists.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;
        Ok(Self::new(pool))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO kv_store (key, value, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM kv_store WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> Config {
        let mut cfg = Config::minimal();
        cfg.catalog.path = dir.path().join("nested").join("desk.sqlite");
        cfg
    }

    #[tokio::test]
    async fn values_survive_reopen() {
        let tmp = TempDir::new().unwrap();
        let cfg = config_in(&tmp);

        let first = SqliteStorage::open(&cfg).await.unwrap();
        first.set_item("uploadedFiles", "[]").await.unwrap();
        first.set_item("uploadedFiles", "[{}]").await.unwrap();
        first.close().await;

        let second = SqliteStorage::open(&cfg).await.unwrap();
        assert_eq!(
            second.get_item("uploadedFiles").await.unwrap().as_deref(),
            Some("[{}]")
        );
        second.remove_item("uploadedFiles").await.unwrap();
        assert_eq!(second.get_item("uploadedFiles").await.unwrap(), None);
    }

    #[tokio::test]
    async fn two_handles_see_each_other() {
        let tmp = TempDir::new().unwrap();
        let cfg = config_in(&tmp);

        let a = SqliteStorage::open(&cfg).await.unwrap();
        let b = SqliteStorage::open(&cfg).await.unwrap();
        a.set_item("k", "from-a").await.unwrap();
        assert_eq!(b.get_item("k").await.unwrap().as_deref(), Some("from-a"));
    }
}
