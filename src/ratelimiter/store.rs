/// Rate-limiter store, generalizing
/// `original_source/internal/ratelimiter/store.go` from Go channels and
/// goroutines to `tokio` tasks and a `CancellationToken`.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::ratelimiter::bucket::Bucket;
use crate::storage::{ClientRecord, ClientRepository, RepoError};

const REFILL_INTERVAL: Duration = Duration::from_secs(1);
const PERSIST_INTERVAL: Duration = Duration::from_secs(5);

pub struct RateLimiterStore {
    default_capacity: i64,
    default_rate: i64,
    buckets: RwLock<HashMap<String, Arc<Bucket>>>,
    repo: Arc<dyn ClientRepository>,
    cancel: CancellationToken,
    loops: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl RateLimiterStore {
    /// Startup reconciliation: load client configs, create buckets at full
    /// capacity, then adopt persisted token counts only where they represent
    /// genuine depletion (`tokens < capacity`).
    pub async fn new(
        default_capacity: i64,
        default_rate: i64,
        repo: Arc<dyn ClientRepository>,
    ) -> Result<Arc<RateLimiterStore>, RepoError> {
        let mut buckets = HashMap::new();

        let configs = repo.list().await?;
        for c in &configs {
            buckets.insert(
                c.client_id.clone(),
                Arc::new(Bucket::new(c.capacity, c.rate_per_sec)),
            );
        }
        info!(count = buckets.len(), "loaded client configs");

        let by_id: HashMap<&str, &ClientRecord> =
            configs.iter().map(|c| (c.client_id.as_str(), c)).collect();
        let states = repo.load_bucket_state().await?;
        let mut restored = 0usize;
        for state in &states {
            let Some(cfg) = by_id.get(state.client_id.as_str()) else {
                // Unknown client in persisted state: ignored.
                continue;
            };
            if state.tokens < cfg.capacity {
                buckets.insert(
                    state.client_id.clone(),
                    Arc::new(Bucket::with_tokens(cfg.capacity, cfg.rate_per_sec, state.tokens)),
                );
                restored += 1;
            }
        }
        info!(count = restored, "restored token states");

        let store = Arc::new(RateLimiterStore {
            default_capacity,
            default_rate,
            buckets: RwLock::new(buckets),
            repo,
            cancel: CancellationToken::new(),
            loops: std::sync::Mutex::new(Vec::new()),
        });
        Ok(store)
    }

    /// Spawns the refill and persist background loops. Separate from
    /// `new` so startup reconciliation and loop spawning aren't
    /// interleaved, so the loops only ever see a fully-reconciled bucket
    /// set.
    pub fn start(self: Arc<Self>) {
        let refill_store = Arc::clone(&self);
        let refill_cancel = self.cancel.clone();
        let refill_handle = tokio::spawn(async move {
            refill_store.refill_loop(refill_cancel).await;
        });

        let persist_store = Arc::clone(&self);
        let persist_cancel = self.cancel.clone();
        let persist_handle = tokio::spawn(async move {
            persist_store.persist_loop(persist_cancel).await;
        });

        self.loops
            .lock()
            .unwrap()
            .extend([refill_handle, persist_handle]);
    }

    /// Lazy bucket acquisition: registered bucket, else double-checked
    /// creation from repository config, else process defaults.
    pub async fn get_bucket(&self, id: &str) -> Arc<Bucket> {
        if let Some(b) = self.buckets.read().await.get(id) {
            return Arc::clone(b);
        }

        let mut buckets = self.buckets.write().await;
        if let Some(b) = buckets.get(id) {
            return Arc::clone(b);
        }

        let bucket = match self.repo.list().await {
            Ok(configs) => match configs.into_iter().find(|c| c.client_id == id) {
                Some(cfg) => Arc::new(Bucket::new(cfg.capacity, cfg.rate_per_sec)),
                None => Arc::new(Bucket::new(self.default_capacity, self.default_rate)),
            },
            Err(e) => {
                error!(client = id, error = %e, "repository lookup failed during lazy bucket creation, using defaults");
                Arc::new(Bucket::new(self.default_capacity, self.default_rate))
            }
        };
        buckets.insert(id.to_string(), Arc::clone(&bucket));
        bucket
    }

    pub async fn add_client(&self, record: ClientRecord) -> Result<(), RepoError> {
        self.repo.upsert(record.clone()).await?;
        self.buckets.write().await.insert(
            record.client_id.clone(),
            Arc::new(Bucket::new(record.capacity, record.rate_per_sec)),
        );
        info!(client = %record.client_id, "bucket created");
        Ok(())
    }

    pub async fn delete_client(&self, client_id: &str) -> Result<(), RepoError> {
        self.repo.delete(client_id).await?;
        self.buckets.write().await.remove(client_id);
        info!(client = client_id, "bucket removed");
        Ok(())
    }

    pub async fn list_clients(&self) -> Result<HashMap<String, ClientRecord>, RepoError> {
        Ok(self
            .repo
            .list()
            .await?
            .into_iter()
            .map(|c| (c.client_id.clone(), c))
            .collect())
    }

    async fn refill_loop(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(REFILL_INTERVAL);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let snapshot: Vec<Arc<Bucket>> =
                        self.buckets.read().await.values().cloned().collect();
                    for bucket in snapshot {
                        bucket.refill();
                    }
                }
                _ = cancel.cancelled() => return,
            }
        }
    }

    async fn persist_loop(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(PERSIST_INTERVAL);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.persist_tick().await,
                _ = cancel.cancelled() => return,
            }
        }
    }

    /// Runs one persistence pass immediately, without waiting for the next
    /// tick. Exposed for tests and for an orderly shutdown flush.
    pub async fn persist_tick(&self) {
        let snapshot: Vec<(String, Arc<Bucket>)> = self
            .buckets
            .read()
            .await
            .iter()
            .map(|(id, b)| (id.clone(), Arc::clone(b)))
            .collect();

        for (id, bucket) in snapshot {
            match self.repo.exists_client(&id).await {
                Ok(false) => continue, // anonymous/unregistered clients are not persisted
                Err(e) => {
                    error!(client = %id, error = %e, "exists_client failed, skipping persist");
                    continue;
                }
                Ok(true) => {}
            }

            let tokens = bucket.snapshot_tokens();
            if let Err(e) = self.repo.save_bucket_state(&id, tokens).await {
                error!(client = %id, error = %e, "save_bucket_state failed");
            }
        }
    }

    /// Signals both background loops to stop. They return promptly on
    /// their next tick observation; no final synchronous flush is required,
    /// so this doesn't await the loop handles.
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}
