/// Backend selection strategies.
///
/// A `Selector` returns a live backend handle directly, since backends
/// live behind `Arc` rather than in a single `Vec` a pool lock guards.
/// Round-robin, least-connections and random selection are provided;
/// request-hash based selection has no counterpart here.
use std::sync::Arc;

use rand::Rng;

use crate::backend::Backend;
use crate::error::AppError;

pub trait Selector: Send + Sync {
    /// Returns a currently-live backend under this policy, or `None` if no
    /// backend is live.
    fn next(&self) -> Option<Arc<Backend>>;
}

/// Scans up to N positions starting at the cursor, returns the first live
/// backend found and advances the cursor one step past it. Concurrent
/// calls are serialized by `cursor`'s mutex so the advance can never skip
/// or duplicate a position under a race.
pub struct RoundRobinSelector {
    backends: Vec<Arc<Backend>>,
    cursor: std::sync::Mutex<usize>,
}

impl RoundRobinSelector {
    pub fn new(backends: Vec<Arc<Backend>>) -> Self {
        Self {
            backends,
            cursor: std::sync::Mutex::new(0),
        }
    }
}

impl Selector for RoundRobinSelector {
    fn next(&self) -> Option<Arc<Backend>> {
        let n = self.backends.len();
        if n == 0 {
            return None;
        }
        let mut cursor = self.cursor.lock().unwrap();
        for offset in 0..n {
            let idx = (*cursor + offset) % n;
            if self.backends[idx].is_alive() {
                *cursor = (idx + 1) % n;
                return Some(Arc::clone(&self.backends[idx]));
            }
        }
        None
    }
}

/// Stateless: re-scans every call. Reads of the connection counters
/// tolerate concurrent updates: a stale count is acceptable.
pub struct LeastConnectionsSelector {
    backends: Vec<Arc<Backend>>,
}

impl LeastConnectionsSelector {
    pub fn new(backends: Vec<Arc<Backend>>) -> Self {
        Self { backends }
    }
}

impl Selector for LeastConnectionsSelector {
    fn next(&self) -> Option<Arc<Backend>> {
        self.backends
            .iter()
            .filter(|b| b.is_alive())
            .min_by_key(|b| b.active_conns())
            .cloned()
    }
}

/// Picks a uniformly random live backend. `rand::thread_rng` is a
/// thread-local CSPRNG handle, so no additional locking is needed to make this
/// safe under concurrent calls.
pub struct RandomSelector {
    backends: Vec<Arc<Backend>>,
}

impl RandomSelector {
    pub fn new(backends: Vec<Arc<Backend>>) -> Self {
        Self { backends }
    }
}

impl Selector for RandomSelector {
    fn next(&self) -> Option<Arc<Backend>> {
        let alive: Vec<&Arc<Backend>> = self.backends.iter().filter(|b| b.is_alive()).collect();
        if alive.is_empty() {
            return None;
        }
        let idx = rand::thread_rng().gen_range(0..alive.len());
        Some(Arc::clone(alive[idx]))
    }
}

/// Resolves the configured algorithm name to a selector, defaulting to
/// round-robin for an empty or unrecognized name.
pub fn build_selector(algorithm: &str, backends: Vec<Arc<Backend>>) -> Box<dyn Selector> {
    match algorithm {
        "least_conn" => Box::new(LeastConnectionsSelector::new(backends)),
        "random" => Box::new(RandomSelector::new(backends)),
        _ => Box::new(RoundRobinSelector::new(backends)),
    }
}

/// Validates the algorithm name without constructing a selector; used by
/// config validation so an unknown name surfaces at startup rather than
/// silently falling back. Only three algorithm names are recognized;
/// anything else is a configuration error here, even though `build_selector`
/// itself stays permissive for callers (tests, mainly) that don't need
/// validation.
pub fn validate_algorithm(algorithm: &str) -> Result<(), AppError> {
    match algorithm {
        "round_robin" | "least_conn" | "random" => Ok(()),
        other => Err(AppError::Config(format!(
            "unknown balancing algorithm: {other}"
        ))),
    }
}
