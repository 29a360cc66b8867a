use libsql::{Builder, Connection};
use std::sync::Arc;

use crate::config::DatabaseConfig;
use crate::error::Result;

use super::schema;

pub struct Database {
    pub(crate) db: Arc<libsql::Database>,
    pub(crate) busy_timeout_ms: u64,
    // An in-memory SQLite database is private to the handle that opened it,
    // so every `connect()` must reuse this connection or the schema vanishes.
    pub(crate) shared_conn: Option<Connection>,
}

impl Database {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let busy_timeout_ms = std::env::var("DATABASE_BUSY_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(5000);

        let in_memory = config.url == ":memory:";
        let db = if in_memory {
            Builder::new_local(":memory:").build().await?
        } else {
            let path = config.url.strip_prefix("file:").unwrap_or(&config.url);
            Builder::new_local(path).build().await?
        };

        let db = Arc::new(db);
        let shared_conn = if in_memory {
            Some(db.connect()?)
        } else {
            None
        };

        let database = Self {
            db,
            busy_timeout_ms,
            shared_conn,
        };
        database.configure_database().await?;
        database.init_schema().await?;

        Ok(database)
    }

    /// In-memory database for tests.
    pub async fn in_memory() -> Result<Self> {
        Self::new(&DatabaseConfig {
            url: ":memory:".to_string(),
        })
        .await
    }

    pub fn connect(&self) -> Result<Connection> {
        if let Some(conn) = &self.shared_conn {
            return Ok(conn.clone());
        }
        Ok(self.db.connect()?)
    }

    async fn configure_database(&self) -> Result<()> {
        let conn = self.connect()?;
        let busy_timeout_sql = format!("PRAGMA busy_timeout = {}", self.busy_timeout_ms);
        if let Err(error) = conn.execute_batch(&busy_timeout_sql).await {
            tracing::warn!(
                busy_timeout_ms = self.busy_timeout_ms,
                error = %error,
                "Failed to set SQLite busy_timeout"
            );
        }
        Ok(())
    }

    async fn init_schema(&self) -> Result<()> {
        let conn = self.connect()?;
        schema::init_schema(&conn).await?;
        Ok(())
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
            busy_timeout_ms: self.busy_timeout_ms,
            shared_conn: self.shared_conn.clone(),
        }
    }
}
