//! Two-tier token-bucket admission control for the ingestion endpoint.
//!
//! One bucket set is keyed by source IP, one by trigger id. A request needs a
//! token from both; when the trigger bucket rejects, the already-consumed
//! global token is refunded so there is no partial consumption. Buckets are
//! created lazily and evicted once they have sat full and idle for the
//! eviction interval, bounding memory at O(active keys). Each bucket set is
//! sharded so distinct keys rarely contend on one lock.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Capacity and refill rate of one bucket tier.
#[derive(Debug, Clone, Copy)]
pub struct RateSettings {
    pub capacity: f64,
    pub refill_per_sec: f64,
}

/// Idle-full buckets older than this are dropped during sweeps.
const DEFAULT_EVICTION: Duration = Duration::from_secs(600);

/// Number of lock shards per bucket set.
const SHARDS: usize = 16;

/// Which tier rejected a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateScope {
    Ip,
    Trigger,
}

impl RateScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateScope::Ip => "ip",
            RateScope::Trigger => "trigger",
        }
    }
}

/// A rejected admission attempt.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitExceeded {
    pub scope: RateScope,
    /// Whole seconds until a token will be available.
    pub retry_after_secs: u64,
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

struct Shard {
    buckets: HashMap<String, Bucket>,
    last_sweep: Instant,
}

/// One tier of per-key token buckets.
struct BucketSet {
    shards: Vec<Mutex<Shard>>,
    settings: RateSettings,
    eviction: Duration,
}

impl BucketSet {
    fn new(settings: RateSettings, eviction: Duration) -> Self {
        let shards = (0..SHARDS)
            .map(|_| {
                Mutex::new(Shard {
                    buckets: HashMap::new(),
                    last_sweep: Instant::now(),
                })
            })
            .collect();
        Self {
            shards,
            settings,
            eviction,
        }
    }

    fn shard_for(&self, key: &str) -> &Mutex<Shard> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % SHARDS]
    }

    /// Consume one token, or report how long until one is available.
    fn try_acquire(&self, key: &str) -> Result<(), u64> {
        let now = Instant::now();
        let mut shard = self.shard_for(key).lock().expect("rate limiter poisoned");

        if now.duration_since(shard.last_sweep) > self.eviction {
            self.sweep(&mut shard, now);
        }

        let bucket = shard.buckets.entry(key.to_string()).or_insert(Bucket {
            tokens: self.settings.capacity,
            last_refill: now,
        });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens =
            (bucket.tokens + elapsed * self.settings.refill_per_sec).min(self.settings.capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Ok(())
        } else {
            let deficit = 1.0 - bucket.tokens;
            Err((deficit / self.settings.refill_per_sec).ceil().max(1.0) as u64)
        }
    }

    /// Return a token consumed by a request that was rejected downstream.
    fn refund(&self, key: &str) {
        let mut shard = self.shard_for(key).lock().expect("rate limiter poisoned");
        if let Some(bucket) = shard.buckets.get_mut(key) {
            bucket.tokens = (bucket.tokens + 1.0).min(self.settings.capacity);
        }
    }

    /// Drop buckets that have been full and untouched for the eviction
    /// interval: they carry no admission state a fresh bucket wouldn't.
    fn sweep(&self, shard: &mut Shard, now: Instant) {
        let settings = self.settings;
        let eviction = self.eviction;
        shard.buckets.retain(|_, bucket| {
            let idle = now.duration_since(bucket.last_refill);
            if idle <= eviction {
                return true;
            }
            let refilled =
                (bucket.tokens + idle.as_secs_f64() * settings.refill_per_sec).min(settings.capacity);
            refilled < settings.capacity
        });
        shard.last_sweep = now;
    }

    #[cfg(test)]
    fn bucket_count(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.lock().unwrap().buckets.len())
            .sum()
    }
}

/// Two-tier admission control: per source IP, then per trigger.
pub struct RateLimiter {
    global: BucketSet,
    per_trigger: BucketSet,
}

impl RateLimiter {
    pub fn new(global: RateSettings, per_trigger: RateSettings) -> Self {
        Self::with_eviction(global, per_trigger, DEFAULT_EVICTION)
    }

    pub fn with_eviction(
        global: RateSettings,
        per_trigger: RateSettings,
        eviction: Duration,
    ) -> Self {
        Self {
            global: BucketSet::new(global, eviction),
            per_trigger: BucketSet::new(per_trigger, eviction),
        }
    }

    /// Admit a request or report the tier that rejected it. Consumes one
    /// token from each tier; nothing is consumed on rejection.
    pub fn check(&self, ip: &str, trigger_key: &str) -> Result<(), RateLimitExceeded> {
        self.global.try_acquire(ip).map_err(|retry_after_secs| {
            RateLimitExceeded {
                scope: RateScope::Ip,
                retry_after_secs,
            }
        })?;

        if let Err(retry_after_secs) = self.per_trigger.try_acquire(trigger_key) {
            // No partial consumption: give the global token back.
            self.global.refund(ip);
            return Err(RateLimitExceeded {
                scope: RateScope::Trigger,
                retry_after_secs,
            });
        }
        Ok(())
    }
}
