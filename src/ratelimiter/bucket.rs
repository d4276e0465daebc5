/// Token bucket, direct port of the arithmetic in
/// `original_source/internal/ratelimiter/bucket.go`.
///
/// Uses `SystemTime` rather than `Instant` deliberately: tolerating a
/// backward clock jump (a negative elapsed leaves the bucket untouched)
/// is a requirement, and a monotonic clock can never produce that case.
/// `SystemTime`'s `duration_since` returning `Err` on a backward jump
/// is exactly that case, with no extra branching needed to detect it.
use std::sync::Mutex;
use std::time::SystemTime;

struct BucketInner {
    tokens: i64,
    last: SystemTime,
}

pub struct Bucket {
    pub capacity: i64,
    pub rate_per_sec: i64,
    inner: Mutex<BucketInner>,
}

impl Bucket {
    /// A freshly created bucket starts full: both startup reconciliation
    /// and the admin `AddClient` operation create buckets at full
    /// capacity.
    pub fn new(capacity: i64, rate_per_sec: i64) -> Bucket {
        Bucket {
            capacity,
            rate_per_sec,
            inner: Mutex::new(BucketInner {
                tokens: capacity,
                last: SystemTime::now(),
            }),
        }
    }

    /// Construct a bucket with an explicit starting token count. Used by
    /// startup reconciliation when the persisted state says tokens are
    /// below capacity.
    pub fn with_tokens(capacity: i64, rate_per_sec: i64, tokens: i64) -> Bucket {
        Bucket {
            capacity,
            rate_per_sec,
            inner: Mutex::new(BucketInner {
                tokens,
                last: SystemTime::now(),
            }),
        }
    }

    fn refill_locked(&self, inner: &mut BucketInner) {
        let now = SystemTime::now();
        if let Ok(elapsed) = now.duration_since(inner.last) {
            let new = (elapsed.as_secs_f64() * self.rate_per_sec as f64).floor() as i64;
            if new > 0 {
                inner.tokens = (inner.tokens + new).min(self.capacity);
                inner.last = now;
            }
        }
        // An `Err` here means the clock moved backward: elapsed is
        // negative, `new` would be <= 0, so `tokens`/`last` are left
        // untouched.
    }

    /// Allow/deny decision. Refills lazily before deciding, then deducts
    /// one token on allow.
    pub fn allow(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        self.refill_locked(&mut inner);
        if inner.tokens == 0 {
            false
        } else {
            inner.tokens -= 1;
            true
        }
    }

    /// Background refill tick: same formula as `allow`, no deduction.
    pub fn refill(&self) {
        let mut inner = self.inner.lock().unwrap();
        self.refill_locked(&mut inner);
    }

    /// Snapshot the current token count under the bucket's lock, for the
    /// persist loop.
    pub fn snapshot_tokens(&self) -> i64 {
        self.inner.lock().unwrap().tokens
    }
}
