use crate::wire::Request;
use ahash::RandomState;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

/// Header a client may set to identify itself explicitly. Falls back to
/// the remote socket address when absent.
pub const CLIENT_ID_HEADER: &str = "X-Client-Id";

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn full(burst: f64, now: Instant) -> Self {
        Self {
            tokens: burst,
            last_refill: now,
        }
    }

    /// Lazy refill then take one token. No background timer: the refill
    /// is elapsed-time × rate, clamped to burst, computed at check time.
    fn allow_at(&mut self, now: Instant, rate_per_second: f64, burst: f64) -> bool {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rate_per_second).min(burst);
        self.last_refill = now;
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Per-client token-bucket admission gate.
///
/// Buckets are created full on first sight of a client key. The
/// registry lock is held only to find or create the bucket; the
/// check-and-update itself runs under the bucket's own mutex, so
/// distinct clients never contend.
pub struct RateLimiter {
    buckets: RwLock<HashMap<String, Arc<Mutex<Bucket>>, RandomState>>,
    rate_per_second: f64,
    burst: f64,
}

impl RateLimiter {
    pub fn new(rate_per_second: f64, burst: f64) -> Self {
        Self {
            buckets: RwLock::new(HashMap::with_hasher(RandomState::new())),
            rate_per_second,
            burst,
        }
    }

    pub fn allow(&self, key: &str) -> bool {
        self.allow_at(key, Instant::now())
    }

    /// `allow` with an injected clock, so refill behavior is testable.
    pub fn allow_at(&self, key: &str, now: Instant) -> bool {
        let bucket = self.bucket_for(key, now);
        let mut bucket = bucket.lock();
        bucket.allow_at(now, self.rate_per_second, self.burst)
    }

    fn bucket_for(&self, key: &str, now: Instant) -> Arc<Mutex<Bucket>> {
        if let Some(bucket) = self.buckets.read().get(key) {
            return Arc::clone(bucket);
        }
        let mut buckets = self.buckets.write();
        Arc::clone(
            buckets
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(Bucket::full(self.burst, now)))),
        )
    }

    /// Client identity for rate limiting: an explicit override header
    /// when present, else the remote address. The ephemeral port is
    /// dropped so a client is the same bucket across connections.
    pub fn client_key(req: &Request, peer: SocketAddr) -> String {
        match req.header(CLIENT_ID_HEADER) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => peer.ip().to_string(),
        }
    }
}
