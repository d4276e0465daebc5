/// In-memory repository, used by this crate's own test suite and as a
/// drop-in store when no database is configured. Satisfies the same
/// `ClientRepository` contract the Postgres implementation does.
use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{BucketStateRecord, ClientRecord, ClientRepository, RepoError};

#[derive(Default)]
pub struct InMemoryRepository {
    clients: Mutex<HashMap<String, ClientRecord>>,
    bucket_state: Mutex<HashMap<String, i64>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ClientRepository for InMemoryRepository {
    async fn list(&self) -> Result<Vec<ClientRecord>, RepoError> {
        Ok(self.clients.lock().await.values().cloned().collect())
    }

    async fn upsert(&self, config: ClientRecord) -> Result<(), RepoError> {
        self.clients
            .lock()
            .await
            .insert(config.client_id.clone(), config);
        Ok(())
    }

    async fn delete(&self, client_id: &str) -> Result<(), RepoError> {
        self.clients.lock().await.remove(client_id);
        // Cascade: remove any persisted bucket state for this client too.
        self.bucket_state.lock().await.remove(client_id);
        Ok(())
    }

    async fn exists_client(&self, client_id: &str) -> Result<bool, RepoError> {
        Ok(self.clients.lock().await.contains_key(client_id))
    }

    async fn load_bucket_state(&self) -> Result<Vec<BucketStateRecord>, RepoError> {
        Ok(self
            .bucket_state
            .lock()
            .await
            .iter()
            .map(|(client_id, tokens)| BucketStateRecord {
                client_id: client_id.clone(),
                tokens: *tokens,
            })
            .collect())
    }

    async fn save_bucket_state(&self, client_id: &str, tokens: i64) -> Result<(), RepoError> {
        self.bucket_state
            .lock()
            .await
            .insert(client_id.to_string(), tokens);
        Ok(())
    }

    async fn init_schema(&self) -> Result<(), RepoError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_then_list_round_trips() {
        let repo = InMemoryRepository::new();
        repo.upsert(ClientRecord {
            client_id: "k".to_string(),
            capacity: 5,
            rate_per_sec: 1,
        })
        .await
        .unwrap();
        let list = repo.list().await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].client_id, "k");
    }

    #[tokio::test]
    async fn delete_cascades_bucket_state() {
        let repo = InMemoryRepository::new();
        repo.upsert(ClientRecord {
            client_id: "k".to_string(),
            capacity: 5,
            rate_per_sec: 1,
        })
        .await
        .unwrap();
        repo.save_bucket_state("k", 3).await.unwrap();
        repo.delete("k").await.unwrap();
        assert!(!repo.exists_client("k").await.unwrap());
        assert!(repo.load_bucket_state().await.unwrap().is_empty());
    }
}
