/// Repository contract.
///
/// The durable store backing the client registry is pluggable: any
/// implementation satisfying this trait suffices. Two are provided:
/// `postgres` (the reference store) and `memory` (used by this crate's
/// test suite and as a no-database fallback).
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Row of the `clients` table; also the public JSON shape used by the
/// admin API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ClientRecord {
    pub client_id: String,
    pub capacity: i64,
    pub rate_per_sec: i64,
}

/// Row of the `bucket_state` table: (client_id, tokens).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BucketStateRecord {
    pub client_id: String,
    pub tokens: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error("{0}")]
    Other(String),
}

/// The seven operations a repository must provide.
#[async_trait]
pub trait ClientRepository: Send + Sync {
    async fn list(&self) -> Result<Vec<ClientRecord>, RepoError>;
    async fn upsert(&self, config: ClientRecord) -> Result<(), RepoError>;
    /// Must cascade persisted bucket state.
    async fn delete(&self, client_id: &str) -> Result<(), RepoError>;
    async fn exists_client(&self, client_id: &str) -> Result<bool, RepoError>;
    async fn load_bucket_state(&self) -> Result<Vec<BucketStateRecord>, RepoError>;
    async fn save_bucket_state(&self, client_id: &str, tokens: i64) -> Result<(), RepoError>;
    /// Idempotent schema creation.
    async fn init_schema(&self) -> Result<(), RepoError>;
}
