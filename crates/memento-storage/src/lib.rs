//! Storage adapter contracts for Memento.
//!
//! Every service crate depends on the traits here, never on a concrete
//! backend directly. The in-memory implementations are always available
//! (used by default builds and tests); the network-backed ones are gated
//! behind `neo4j`, `postgres`, and `redis-backend` features so this crate
//! compiles without reaching the network.

pub mod graph;
pub mod health;
pub mod kv;
pub mod relational;

pub use graph::{GraphParams, GraphRow, GraphStore, InMemoryGraphStore, TxFuture, VectorMatch, VectorScrollPage};
pub use health::HealthStatus;
pub use kv::{InMemoryKvStore, KvStore};
pub use relational::{
    InMemoryRelationalStore, IsolationLevel, QueryOptions, RelationalRow, RelationalStore,
    TransactionOptions,
};

#[cfg(feature = "neo4j")]
pub use graph::Neo4jGraphStore;

#[cfg(feature = "postgres")]
pub use relational::PostgresRelationalStore;

#[cfg(feature = "redis-backend")]
pub use kv::RedisKvStore;
