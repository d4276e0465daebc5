/// Backend registry.
///
/// A `Backend` is a routable origin. Holds liveness and an active-connection
/// counter directly on the backend itself, behind a fixed, `Arc`-shared
/// set, so the selector, forwarder and health supervisor can each hold
/// their own read-only handle without a pool-wide lock.
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use reqwest::Url;

#[derive(Debug)]
pub struct Backend {
    pub name: String,
    pub url: Url,
    alive: AtomicBool,
    active_conns: AtomicI64,
}

impl Backend {
    pub fn new(name: String, url: Url) -> Backend {
        Backend {
            name,
            url,
            // Liveness defaults to live on construction.
            alive: AtomicBool::new(true),
            active_conns: AtomicI64::new(0),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::Release);
    }

    pub fn active_conns(&self) -> i64 {
        self.active_conns.load(Ordering::Acquire)
    }

    pub fn inc_conns(&self) {
        self.active_conns.fetch_add(1, Ordering::AcqRel);
    }

    /// Decrementing a zero counter is a no-op: the invariant never goes
    /// negative even under a buggy caller that double-releases.
    pub fn dec_conns(&self) {
        let _ = self
            .active_conns
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| {
                if c > 0 {
                    Some(c - 1)
                } else {
                    None
                }
            });
    }

}

/// Scoped guard pairing one increment with exactly one decrement,
/// regardless of which exit path the forwarder takes for an attempt.
/// A free function rather than a `self: &Arc<Self>` method since that
/// receiver type isn't part of the stable arbitrary-self-types set.
pub fn track_conn(backend: &Arc<Backend>) -> ConnGuard {
    backend.inc_conns();
    ConnGuard {
        backend: Arc::clone(backend),
    }
}

pub struct ConnGuard {
    backend: Arc<Backend>,
}

impl Drop for ConnGuard {
    fn drop(&mut self) {
        self.backend.dec_conns();
    }
}

/// The process-wide set of backends. Created once at startup from
/// configuration and never mutated in shape afterwards. Only the
/// per-backend liveness flag and connection counter change over time.
#[derive(Debug, Clone)]
pub struct BackendRegistry {
    backends: Arc<Vec<Arc<Backend>>>,
}

impl BackendRegistry {
    pub fn new(backends: Vec<Arc<Backend>>) -> BackendRegistry {
        BackendRegistry {
            backends: Arc::new(backends),
        }
    }

    pub fn backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}
