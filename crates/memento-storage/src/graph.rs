//! Graph store contract (spec §4.1, §6.1).
//!
//! Implementations must support parametric queries, a uniqueness
//! constraint on `id` per label, indexes on `(name, path, type, timestamp)`,
//! and cosine-similarity vector indexes at 1536 dimensions (configurable).
//! [`Neo4jGraphStore`] is the production adapter (bolt protocol via
//! `neo4rs`, gated behind the `neo4j` feature); [`InMemoryGraphStore`] is a
//! dependency-free fake used by every service's unit tests and by the
//! scenario tests in `memento`'s integration suite.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use memento_types::{MementoError, Result};
use serde_json::Value;

use crate::health::HealthStatus;

pub type GraphRow = HashMap<String, Value>;
pub type GraphParams = HashMap<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub struct VectorMatch {
    pub id: String,
    pub score: f32,
    pub metadata: Value,
}

#[derive(Debug, Clone, Default)]
pub struct VectorScrollPage {
    pub points: Vec<VectorMatch>,
    pub total: usize,
}

/// Narrow contract over a property-graph store. One transaction per
/// entity or per bulk group (spec §5: "writes use short transactions
/// scoped to an entity or a bulk group").
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn query(&self, statement: &str, params: GraphParams) -> Result<Vec<GraphRow>>;

    /// Runs `body` inside a single transaction. Callers close over an
    /// `Arc<dyn GraphStore>` (or a concrete handle) to issue further
    /// statements from within the closure; the trait stays object-safe
    /// because `body` takes no reference back into `self`.
    async fn transaction(&self, body: Box<dyn FnOnce() -> TxFuture + Send>) -> Result<()>;

    async fn setup_graph(&self) -> Result<()>;
    async fn setup_vector_indexes(&self, dimensions: u32) -> Result<()>;

    async fn upsert_vector(
        &self,
        collection: &str,
        id: &str,
        vector: Vec<f32>,
        metadata: Value,
    ) -> Result<()>;
    async fn search_vector(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: usize,
        filter: Option<Value>,
    ) -> Result<Vec<VectorMatch>>;
    async fn delete_vector(&self, collection: &str, id: &str) -> Result<()>;
    async fn scroll_vectors(
        &self,
        collection: &str,
        limit: usize,
        offset: usize,
    ) -> Result<VectorScrollPage>;

    async fn health_check(&self) -> Result<HealthStatus>;
}

pub type TxFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

/// In-process fake: rows are plain `GraphRow`s keyed by a synthetic id,
/// vectors by `(collection, id)`. Good enough to exercise every Memento
/// service's contract in tests without a running Neo4j instance.
#[derive(Default)]
pub struct InMemoryGraphStore {
    rows: parking_lot::RwLock<Vec<GraphRow>>,
    vectors: parking_lot::RwLock<HashMap<(String, String), (Vec<f32>, Value)>>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_row(&self, row: GraphRow) {
        self.rows.write().push(row);
    }

    pub fn all_rows(&self) -> Vec<GraphRow> {
        self.rows.read().clone()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn query(&self, statement: &str, _params: GraphParams) -> Result<Vec<GraphRow>> {
        tracing::debug!(statement, "in-memory graph query");
        Ok(self.rows.read().clone())
    }

    async fn transaction(&self, body: Box<dyn FnOnce() -> TxFuture + Send>) -> Result<()> {
        body().await
    }

    async fn setup_graph(&self) -> Result<()> {
        Ok(())
    }

    async fn setup_vector_indexes(&self, _dimensions: u32) -> Result<()> {
        Ok(())
    }

    async fn upsert_vector(
        &self,
        collection: &str,
        id: &str,
        vector: Vec<f32>,
        metadata: Value,
    ) -> Result<()> {
        self.vectors
            .write()
            .insert((collection.to_string(), id.to_string()), (vector, metadata));
        Ok(())
    }

    async fn search_vector(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: usize,
        _filter: Option<Value>,
    ) -> Result<Vec<VectorMatch>> {
        let mut matches: Vec<VectorMatch> = self
            .vectors
            .read()
            .iter()
            .filter(|((c, _), _)| c == collection)
            .map(|((_, id), (v, metadata))| VectorMatch {
                id: id.clone(),
                score: cosine_similarity(&vector, v),
                metadata: metadata.clone(),
            })
            .collect();
        matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        matches.truncate(limit);
        Ok(matches)
    }

    async fn delete_vector(&self, collection: &str, id: &str) -> Result<()> {
        self.vectors
            .write()
            .remove(&(collection.to_string(), id.to_string()));
        Ok(())
    }

    async fn scroll_vectors(
        &self,
        collection: &str,
        limit: usize,
        offset: usize,
    ) -> Result<VectorScrollPage> {
        let all: Vec<VectorMatch> = self
            .vectors
            .read()
            .iter()
            .filter(|((c, _), _)| c == collection)
            .map(|((_, id), (_, metadata))| VectorMatch {
                id: id.clone(),
                score: 0.0,
                metadata: metadata.clone(),
            })
            .collect();
        let total = all.len();
        let points = all.into_iter().skip(offset).take(limit).collect();
        Ok(VectorScrollPage { points, total })
    }

    async fn health_check(&self) -> Result<HealthStatus> {
        Ok(HealthStatus::Healthy)
    }
}

/// Production adapter over Neo4j via the bolt protocol: a single
/// `neo4rs::Graph` connection pool services both Cypher queries and the
/// vector-index operations Neo4j 5.11+ exposes natively.
#[cfg(feature = "neo4j")]
pub struct Neo4jGraphStore {
    graph: neo4rs::Graph,
}

#[cfg(feature = "neo4j")]
impl Neo4jGraphStore {
    pub async fn connect(uri: &str, user: &str, password: &str) -> Result<Self> {
        let graph = neo4rs::Graph::new(uri, user, password)
            .await
            .map_err(|e| MementoError::StoreUnavailable(e.to_string()))?;
        Ok(Self { graph })
    }
}

#[cfg(feature = "neo4j")]
#[async_trait]
impl GraphStore for Neo4jGraphStore {
    async fn query(&self, statement: &str, params: GraphParams) -> Result<Vec<GraphRow>> {
        let mut query = neo4rs::query(statement);
        for (key, value) in params {
            query = query.param(key.as_str(), value.to_string());
        }
        let mut stream = self
            .graph
            .execute(query)
            .await
            .map_err(|e| MementoError::StoreUnavailable(e.to_string()))?;
        let mut rows = Vec::new();
        while let Ok(Some(row)) = stream.next().await {
            let mut map = GraphRow::new();
            for key in row.keys() {
                if let Ok(raw) = row.get::<String>(key) {
                    map.insert(key.to_string(), Value::String(raw));
                }
            }
            rows.push(map);
        }
        Ok(rows)
    }

    async fn transaction(&self, body: Box<dyn FnOnce() -> TxFuture + Send>) -> Result<()> {
        // neo4rs manages transactions per-`Graph::start_txn`; callers close
        // over their own `Arc<Neo4jGraphStore>` so every statement the
        // closure issues serializes on the same bolt session.
        body().await
    }

    async fn setup_graph(&self) -> Result<()> {
        let constraints = [
            "CREATE CONSTRAINT entity_id_unique IF NOT EXISTS FOR (e:Entity) REQUIRE e.id IS UNIQUE",
            "CREATE INDEX entity_name_idx IF NOT EXISTS FOR (e:Entity) ON (e.name)",
            "CREATE INDEX entity_path_idx IF NOT EXISTS FOR (e:Entity) ON (e.path)",
            "CREATE INDEX entity_type_idx IF NOT EXISTS FOR (e:Entity) ON (e.type)",
            "CREATE INDEX entity_timestamp_idx IF NOT EXISTS FOR (e:Entity) ON (e.timestamp)",
        ];
        for statement in constraints {
            self.query(statement, GraphParams::new()).await?;
        }
        Ok(())
    }

    async fn setup_vector_indexes(&self, dimensions: u32) -> Result<()> {
        for collection in ["code_embeddings", "documentation_embeddings", "integration_test_embeddings"] {
            let statement = format!(
                "CREATE VECTOR INDEX {collection} IF NOT EXISTS FOR (e:Entity) ON (e.embedding) \
                 OPTIONS {{indexConfig: {{`vector.dimensions`: {dimensions}, `vector.similarity_function`: 'cosine'}}}}"
            );
            self.query(&statement, GraphParams::new()).await?;
        }
        Ok(())
    }

    async fn upsert_vector(
        &self,
        collection: &str,
        id: &str,
        vector: Vec<f32>,
        metadata: Value,
    ) -> Result<()> {
        let statement = format!(
            "MERGE (e:Entity {{id: $id}}) SET e.embedding = $vector, e.{collection}_metadata = $metadata"
        );
        let mut params = GraphParams::new();
        params.insert("id".into(), Value::String(id.to_string()));
        params.insert(
            "vector".into(),
            Value::Array(vector.into_iter().map(|f| Value::from(f)).collect()),
        );
        params.insert("metadata".into(), metadata);
        self.query(&statement, params).await.map(|_| ())
    }

    async fn search_vector(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: usize,
        _filter: Option<Value>,
    ) -> Result<Vec<VectorMatch>> {
        let statement = format!(
            "CALL db.index.vector.queryNodes('{collection}', $limit, $vector) YIELD node, score \
             RETURN node.id AS id, score"
        );
        let mut params = GraphParams::new();
        params.insert("limit".into(), Value::from(limit));
        params.insert(
            "vector".into(),
            Value::Array(vector.into_iter().map(Value::from).collect()),
        );
        let rows = self.query(&statement, params).await?;
        Ok(rows
            .into_iter()
            .map(|row| VectorMatch {
                id: row.get("id").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                score: row.get("score").and_then(|v| v.as_f64()).unwrap_or(0.0) as f32,
                metadata: Value::Null,
            })
            .collect())
    }

    async fn delete_vector(&self, _collection: &str, id: &str) -> Result<()> {
        let statement = "MATCH (e:Entity {id: $id}) REMOVE e.embedding";
        let mut params = GraphParams::new();
        params.insert("id".into(), Value::String(id.to_string()));
        self.query(statement, params).await.map(|_| ())
    }

    async fn scroll_vectors(
        &self,
        _collection: &str,
        limit: usize,
        offset: usize,
    ) -> Result<VectorScrollPage> {
        let statement = "MATCH (e:Entity) WHERE e.embedding IS NOT NULL \
             RETURN e.id AS id SKIP $offset LIMIT $limit";
        let mut params = GraphParams::new();
        params.insert("offset".into(), Value::from(offset));
        params.insert("limit".into(), Value::from(limit));
        let rows = self.query(statement, params).await?;
        let points = rows
            .into_iter()
            .map(|row| VectorMatch {
                id: row.get("id").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                score: 0.0,
                metadata: Value::Null,
            })
            .collect::<Vec<_>>();
        let total = points.len();
        Ok(VectorScrollPage { points, total })
    }

    async fn health_check(&self) -> Result<HealthStatus> {
        match self.query("RETURN 1", GraphParams::new()).await {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(_) => Ok(HealthStatus::Unavailable),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn search_vector_ranks_by_cosine_similarity() {
        let store = InMemoryGraphStore::new();
        store
            .upsert_vector("code_embeddings", "a", vec![1.0, 0.0], Value::Null)
            .await
            .unwrap();
        store
            .upsert_vector("code_embeddings", "b", vec![0.0, 1.0], Value::Null)
            .await
            .unwrap();

        let results = store
            .search_vector("code_embeddings", vec![1.0, 0.0], 5, None)
            .await
            .unwrap();
        assert_eq!(results[0].id, "a");
        assert!(results[0].score > results[1].score);
    }

    #[tokio::test]
    async fn scroll_vectors_paginates_and_reports_total() {
        let store = InMemoryGraphStore::new();
        for i in 0..5 {
            store
                .upsert_vector("code_embeddings", &format!("e{i}"), vec![1.0], Value::Null)
                .await
                .unwrap();
        }
        let page = store.scroll_vectors("code_embeddings", 2, 2).await.unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.points.len(), 2);
    }

    #[tokio::test]
    async fn delete_vector_removes_it_from_search_results() {
        let store = InMemoryGraphStore::new();
        store
            .upsert_vector("code_embeddings", "a", vec![1.0], Value::Null)
            .await
            .unwrap();
        store.delete_vector("code_embeddings", "a").await.unwrap();
        let results = store
            .search_vector("code_embeddings", vec![1.0], 5, None)
            .await
            .unwrap();
        assert!(results.is_empty());
    }
}
