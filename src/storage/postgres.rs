/// Postgres-backed repository, the reference store.
///
/// Column-for-column port of `original_source/internal/storage/postgres.go`:
/// two tables, `clients` and `bucket_state`, the latter cascading on
/// delete of the former.
use async_trait::async_trait;
use sqlx::PgPool;

use super::{BucketStateRecord, ClientRecord, ClientRepository, RepoError};

pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub async fn connect(dsn: &str) -> Result<Self, RepoError> {
        let pool = PgPool::connect(dsn).await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl ClientRepository for PostgresRepository {
    async fn list(&self) -> Result<Vec<ClientRecord>, RepoError> {
        let rows = sqlx::query_as::<_, (String, i64, i64)>(
            "SELECT client_id, capacity, rate_per_sec FROM clients",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(client_id, capacity, rate_per_sec)| ClientRecord {
                client_id,
                capacity,
                rate_per_sec,
            })
            .collect())
    }

    async fn upsert(&self, config: ClientRecord) -> Result<(), RepoError> {
        sqlx::query(
            "INSERT INTO clients(client_id, capacity, rate_per_sec)
             VALUES ($1, $2, $3)
             ON CONFLICT (client_id) DO UPDATE
               SET capacity = EXCLUDED.capacity,
                   rate_per_sec = EXCLUDED.rate_per_sec",
        )
        .bind(config.client_id)
        .bind(config.capacity)
        .bind(config.rate_per_sec)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, client_id: &str) -> Result<(), RepoError> {
        // `bucket_state.client_id` references `clients.client_id` with
        // `ON DELETE CASCADE` (see `init_schema`), so the corresponding
        // persisted bucket state is removed by the database itself.
        sqlx::query("DELETE FROM clients WHERE client_id = $1")
            .bind(client_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn exists_client(&self, client_id: &str) -> Result<bool, RepoError> {
        let (exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM clients WHERE client_id = $1)")
                .bind(client_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn load_bucket_state(&self) -> Result<Vec<BucketStateRecord>, RepoError> {
        let rows = sqlx::query_as::<_, (String, i64)>("SELECT client_id, tokens FROM bucket_state")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|(client_id, tokens)| BucketStateRecord { client_id, tokens })
            .collect())
    }

    async fn save_bucket_state(&self, client_id: &str, tokens: i64) -> Result<(), RepoError> {
        sqlx::query(
            "INSERT INTO bucket_state(client_id, tokens)
             VALUES ($1, $2)
             ON CONFLICT (client_id) DO UPDATE
               SET tokens = EXCLUDED.tokens,
                   updated_at = NOW()",
        )
        .bind(client_id)
        .bind(tokens)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn init_schema(&self) -> Result<(), RepoError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS clients (
                client_id    TEXT PRIMARY KEY,
                capacity     BIGINT NOT NULL,
                rate_per_sec BIGINT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS bucket_state (
                client_id  TEXT PRIMARY KEY REFERENCES clients(client_id) ON DELETE CASCADE,
                tokens     BIGINT NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
