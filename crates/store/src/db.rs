use std::time::Duration;

use clickhouse::{Client, Compression};
use spanlight_core::config::Config;
use spanlight_core::error::{Result, SpanlightError};

use crate::schema::SCHEMA_SQL;

const DIAL_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared store handle. The underlying client is reference-counted and
/// safe for concurrent queries and insert batches; one instance is
/// created at startup and cloned into every subsystem.
#[derive(Clone)]
pub struct Store {
    client: Client,
}

impl Store {
    pub async fn connect(cfg: &Config) -> Result<Self> {
        let client = Client::default()
            .with_url(cfg.clickhouse_url())
            .with_database(&cfg.clickhouse_db)
            .with_user(&cfg.clickhouse_username)
            .with_password(&cfg.clickhouse_password)
            .with_compression(Compression::Lz4)
            .with_option("max_execution_time", "60");

        let store = Self { client };
        tokio::time::timeout(DIAL_TIMEOUT, store.ping())
            .await
            .map_err(|_| {
                SpanlightError::Store(format!(
                    "clickhouse dial timed out after {}s",
                    DIAL_TIMEOUT.as_secs()
                ))
            })??;
        store.apply_schema().await?;

        Ok(store)
    }

    pub(crate) fn client(&self) -> &Client {
        &self.client
    }

    async fn ping(&self) -> Result<()> {
        self.client
            .query("SELECT 1")
            .execute()
            .await
            .map_err(|e| SpanlightError::Store(format!("clickhouse ping failed: {e}")))
    }

    async fn apply_schema(&self) -> Result<()> {
        for stmt in SCHEMA_SQL {
            self.client
                .query(stmt)
                .execute()
                .await
                .map_err(|e| SpanlightError::Store(format!("apply schema failed: {e}")))?;
        }
        tracing::debug!("store schema ensured");
        Ok(())
    }
}
