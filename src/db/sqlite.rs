use crate::db::schema::SQLITE_INIT;
use crate::db::store::KvStore;
use crate::error::PilotError;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Row, Sqlite};
use std::str::FromStr;
use tracing::debug;

pub type SqlitePool = Pool<Sqlite>;

#[derive(Clone)]
pub struct SqliteKvStore {
    pool: SqlitePool,
}

impl SqliteKvStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if missing) the database at `database_url` and apply the schema.
    pub async fn connect(database_url: &str) -> Result<Self, PilotError> {
        let connect_opts = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(connect_opts)
            .await?;
        let store = Self::new(pool);
        store.init_schema().await?;
        debug!(database_url, "plugin data store ready");
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Initialize the schema by executing the bundled DDL.
    pub async fn init_schema(&self) -> Result<(), PilotError> {
        // sqlx::query runs one statement at a time
        for stmt in SQLITE_INIT.split(';') {
            let s = stmt.trim();
            if s.is_empty() {
                continue;
            }
            sqlx::query(s).execute(&self.pool).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl KvStore for SqliteKvStore {
    async fn get(&self, plugin: &str, key: &str) -> Result<Option<Value>, PilotError> {
        let row = sqlx::query("SELECT value FROM plugin_data WHERE plugin = ? AND key = ?")
            .bind(plugin)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let raw: String = row.try_get("value")?;
                Ok(Some(serde_json::from_str(&raw)?))
            }
            None => Ok(None),
        }
    }

    /// Upsert by `(plugin, key)` using `INSERT ... ON CONFLICT DO UPDATE`.
    async fn set(&self, plugin: &str, key: &str, value: &Value) -> Result<(), PilotError> {
        let raw = serde_json::to_string(value)?;
        sqlx::query(
            r#"
            INSERT INTO plugin_data (plugin, key, value, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(plugin, key) DO UPDATE SET
                value=excluded.value,
                updated_at=excluded.updated_at
            "#,
        )
        .bind(plugin)
        .bind(key)
        .bind(raw)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, plugin: &str, key: &str) -> Result<(), PilotError> {
        sqlx::query("DELETE FROM plugin_data WHERE plugin = ? AND key = ?")
            .bind(plugin)
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn keys(&self, plugin: &str) -> Result<Vec<String>, PilotError> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT key FROM plugin_data WHERE plugin = ? ORDER BY key")
                .bind(plugin)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(k,)| k).collect())
    }
}
