//! Per-client admission control.
//!
//! Three interchangeable backends sit behind [`RateLimiter`]: an in-process
//! token bucket per key, and two Redis-backed windows (fixed and sliding)
//! for deployments running several replicas.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use redis::aio::MultiplexedConnection;

use crate::config::{RateLimitSettings, RateLimiterMode};

const REDIS_KEY_PREFIX: &str = "rate_limit";
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Consumes one unit of budget for `key`; `false` means the request must be rejected.
    async fn allow(&self, key: &str) -> bool;
}

pub fn build_rate_limiter(settings: &RateLimitSettings) -> Result<Arc<dyn RateLimiter>> {
    let limiter: Arc<dyn RateLimiter> = match settings.mode {
        RateLimiterMode::Local => {
            let limiter = Arc::new(TokenBucketLimiter::new(
                settings.per_second,
                settings.burst,
                Duration::from_secs(settings.idle_secs),
            ));
            spawn_cleanup_task(limiter.clone(), SWEEP_INTERVAL);
            limiter
        }
        RateLimiterMode::RedisFixedWindow => Arc::new(RedisFixedWindowLimiter::new(
            &settings.redis_addr,
            settings.max_requests,
            Duration::from_secs(settings.window_secs),
        )?),
        RateLimiterMode::RedisSlidingWindow => Arc::new(RedisSlidingWindowLimiter::new(
            &settings.redis_addr,
            settings.max_requests,
            Duration::from_secs(settings.window_secs),
        )?),
    };
    Ok(limiter)
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket of capacity `burst` refilling at `rate` tokens per second.
#[derive(Debug)]
pub struct TokenBucket {
    rate: f64,
    burst: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    pub fn new(rate: f64, burst: u32, now: Instant) -> Self {
        Self {
            rate,
            burst: f64::from(burst),
            state: Mutex::new(BucketState {
                tokens: f64::from(burst),
                last_refill: now,
            }),
        }
    }

    pub fn try_acquire(&self, now: Instant) -> bool {
        let mut state = self.state.lock();
        let elapsed = now.saturating_duration_since(state.last_refill);
        state.tokens = (state.tokens + elapsed.as_secs_f64() * self.rate).min(self.burst);
        state.last_refill = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn last_seen(&self) -> Instant {
        self.state.lock().last_refill
    }
}

/// In-process limiter holding one lazily created bucket per key.
#[derive(Debug)]
pub struct TokenBucketLimiter {
    rate: f64,
    burst: u32,
    idle_ttl: Duration,
    buckets: RwLock<HashMap<String, Arc<TokenBucket>>>,
}

impl TokenBucketLimiter {
    pub fn new(rate: f64, burst: u32, idle_ttl: Duration) -> Self {
        Self {
            rate,
            burst,
            idle_ttl,
            buckets: RwLock::new(HashMap::new()),
        }
    }

    pub fn check(&self, key: &str, now: Instant) -> bool {
        self.bucket(key, now).try_acquire(now)
    }

    fn bucket(&self, key: &str, now: Instant) -> Arc<TokenBucket> {
        if let Some(bucket) = self.buckets.read().get(key) {
            return bucket.clone();
        }
        let mut buckets = self.buckets.write();
        buckets
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(TokenBucket::new(self.rate, self.burst, now)))
            .clone()
    }

    /// Drops buckets that have not admitted a request within the idle TTL.
    pub fn sweep_idle(&self, now: Instant) -> usize {
        let mut buckets = self.buckets.write();
        let before = buckets.len();
        buckets.retain(|_, bucket| now.saturating_duration_since(bucket.last_seen()) < self.idle_ttl);
        before - buckets.len()
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.read().len()
    }
}

#[async_trait]
impl RateLimiter for TokenBucketLimiter {
    async fn allow(&self, key: &str) -> bool {
        self.check(key, Instant::now())
    }
}

pub fn spawn_cleanup_task(limiter: Arc<TokenBucketLimiter>, interval: Duration) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            let removed = limiter.sweep_idle(Instant::now());
            tracing::debug!(
                removed,
                remaining = limiter.bucket_count(),
                "rate limiter sweep complete"
            );
        }
    });
}

fn open_redis(addr: &str) -> Result<redis::Client> {
    let url = if addr.contains("://") {
        addr.to_string()
    } else {
        format!("redis://{addr}/")
    };
    redis::Client::open(url.as_str()).with_context(|| format!("invalid redis address {addr}"))
}

fn redis_key(key: &str) -> String {
    format!("{REDIS_KEY_PREFIX}:{key}")
}

/// Lazily opened multiplexed connection shared by every admission check.
struct RedisConnection {
    client: redis::Client,
    cached: tokio::sync::Mutex<Option<MultiplexedConnection>>,
}

impl RedisConnection {
    fn open(addr: &str) -> Result<Self> {
        Ok(Self {
            client: open_redis(addr)?,
            cached: tokio::sync::Mutex::new(None),
        })
    }

    async fn get(&self) -> redis::RedisResult<MultiplexedConnection> {
        let mut cached = self.cached.lock().await;
        if let Some(conn) = cached.as_ref() {
            return Ok(conn.clone());
        }
        let conn = self.client.get_multiplexed_async_connection().await?;
        *cached = Some(conn.clone());
        Ok(conn)
    }

    /// Drops the cached connection so the next call reconnects.
    async fn reset(&self) {
        self.cached.lock().await.take();
    }
}

/// Admission decision shared by the Redis limiters. A store failure denies the
/// request so an outage cannot disable the limit.
async fn decide(
    connection: &RedisConnection,
    key: &str,
    max_requests: u64,
    count: redis::RedisResult<u64>,
) -> bool {
    match count {
        Ok(count) => count <= max_requests,
        Err(err) => {
            tracing::error!(error = %err, key, "redis rate limiter unavailable, rejecting request");
            connection.reset().await;
            false
        }
    }
}

// INCR and the first-hit EXPIRE run as one script so a key can never be left
// without a TTL.
const FIXED_WINDOW_SCRIPT: &str = r#"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
    redis.call('EXPIRE', KEYS[1], ARGV[1])
end
return count
"#;

/// Shared counter per key that resets every `window`.
pub struct RedisFixedWindowLimiter {
    connection: RedisConnection,
    script: redis::Script,
    max_requests: u64,
    window: Duration,
}

impl RedisFixedWindowLimiter {
    pub fn new(addr: &str, max_requests: u64, window: Duration) -> Result<Self> {
        Ok(Self {
            connection: RedisConnection::open(addr)?,
            script: redis::Script::new(FIXED_WINDOW_SCRIPT),
            max_requests,
            window,
        })
    }

    async fn count(&self, key: &str) -> redis::RedisResult<u64> {
        let mut conn = self.connection.get().await?;
        let count: u64 = self
            .script
            .key(redis_key(key))
            .arg(self.window.as_secs().max(1))
            .invoke_async(&mut conn)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl RateLimiter for RedisFixedWindowLimiter {
    async fn allow(&self, key: &str) -> bool {
        let count = self.count(key).await;
        decide(&self.connection, key, self.max_requests, count).await
    }
}

/// Sorted-set log of request timestamps per key, trimmed to the trailing `window`.
pub struct RedisSlidingWindowLimiter {
    connection: RedisConnection,
    max_requests: u64,
    window: Duration,
}

impl RedisSlidingWindowLimiter {
    pub fn new(addr: &str, max_requests: u64, window: Duration) -> Result<Self> {
        Ok(Self {
            connection: RedisConnection::open(addr)?,
            max_requests,
            window,
        })
    }

    async fn count(&self, key: &str) -> redis::RedisResult<u64> {
        let mut conn = self.connection.get().await?;
        let key = redis_key(key);
        let now = unix_nanos();
        let cutoff = now - self.window.as_nanos() as i64;

        let (count,): (u64,) = redis::pipe()
            .atomic()
            .zrembyscore(&key, 0_i64, cutoff)
            .ignore()
            .zadd(&key, now, now)
            .ignore()
            .zcard(&key)
            .expire(&key, self.window.as_secs().max(1) as i64)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl RateLimiter for RedisSlidingWindowLimiter {
    async fn allow(&self, key: &str) -> bool {
        let count = self.count(key).await;
        decide(&self.connection, key, self.max_requests, count).await
    }
}

fn unix_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as i64)
        .unwrap_or_default()
}
