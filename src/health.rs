/// Health supervisor: on a fixed interval, probes every backend
/// concurrently with an HTTP HEAD and flips liveness on transitions.
use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::backend::{Backend, BackendRegistry};

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

pub struct HealthSupervisor {
    registry: BackendRegistry,
    client: reqwest::Client,
    interval: Duration,
    cancel: CancellationToken,
}

impl HealthSupervisor {
    pub fn new(registry: BackendRegistry, interval: Duration) -> HealthSupervisor {
        HealthSupervisor {
            registry,
            client: reqwest::Client::new(),
            interval,
            cancel: CancellationToken::new(),
        }
    }

    /// Spawns the per-tick probe scheduler. The returned handle resolves
    /// once `stop` has signalled cancellation and the in-flight tick (if
    /// any) has finished.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.probe_tick().await,
                _ = self.cancel.cancelled() => return,
            }
        }
    }

    /// Fans out one independent probe task per backend and waits for all
    /// of them before the tick is considered complete: a tick never
    /// overlaps the next.
    async fn probe_tick(&self) {
        let mut tasks = JoinSet::new();
        for backend in self.registry.backends() {
            let backend = Arc::clone(backend);
            let client = self.client.clone();
            tasks.spawn(async move {
                probe_one(&client, &backend).await;
            });
        }
        while tasks.join_next().await.is_some() {}
    }

    /// Signals the supervisor to stop and waits for the in-flight tick
    /// (if any) to finish before returning.
    pub async fn stop(&self, handle: tokio::task::JoinHandle<()>) {
        self.cancel.cancel();
        let _ = handle.await;
    }
}

async fn probe_one(client: &reqwest::Client, backend: &Arc<Backend>) {
    let alive = match client
        .request(Method::HEAD, backend.url.clone())
        .timeout(PROBE_TIMEOUT)
        .send()
        .await
    {
        Ok(resp) => resp.status().as_u16() < 500,
        Err(_) => false,
    };

    if alive != backend.is_alive() {
        info!(backend = %backend.name, alive, "liveness transition");
        backend.set_alive(alive);
    }
}
