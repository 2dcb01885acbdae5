//! Per-client fixed-window rate limiting.
//!
//! # Design Decisions
//! - One bucket per client key in a `DashMap`; the bucket's window start
//!   and admitted count share a single `AtomicU64`, so a window reset and
//!   the first admission of the new window are one compare-and-swap
//! - Denial is an ordinary outcome (`Admission::allowed == false`)
//! - Idle buckets are removed by a background sweeper; a bucket swept while
//!   in use is recreated fresh on the next request

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, HeaderName, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::time;

use crate::config::RateLimitConfig;
use crate::error::GatewayError;
use crate::observability::metrics;

const COUNT_BITS: u32 = 24;
const COUNT_MASK: u64 = (1 << COUNT_BITS) - 1;

/// Largest capacity the packed counter can represent.
pub const MAX_CAPACITY: u32 = COUNT_MASK as u32;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Window start (ms since limiter epoch) in the high bits, count in the low 24.
fn pack(window_start: u64, count: u32) -> u64 {
    (window_start << COUNT_BITS) | u64::from(count)
}

fn unpack(state: u64) -> (u64, u32) {
    (state >> COUNT_BITS, (state & COUNT_MASK) as u32)
}

struct ClientBucket {
    state: AtomicU64,
}

impl ClientBucket {
    fn new(now: u64) -> Self {
        Self {
            state: AtomicU64::new(pack(now, 0)),
        }
    }
}

/// Outcome of an admission attempt, with the metadata sent to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Unix milliseconds at which the current window ends.
    pub reset_at: u64,
}

impl Admission {
    /// Write the `X-RateLimit-*` headers.
    pub fn apply_headers(&self, headers: &mut HeaderMap) {
        headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(self.limit));
        headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(self.remaining));
        headers.insert(X_RATELIMIT_RESET, HeaderValue::from(self.reset_at));
    }
}

/// Lock-free per-client admission control.
pub struct RateLimiter {
    buckets: DashMap<String, Arc<ClientBucket>>,
    capacity: u32,
    window_ms: u64,
    idle_ms: u64,
    exempt_prefixes: Vec<String>,
    trust_forwarded_for: bool,
    epoch: Instant,
    epoch_unix_ms: u64,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            buckets: DashMap::new(),
            capacity: config.requests_per_minute.min(MAX_CAPACITY),
            window_ms: config.window().as_millis() as u64,
            idle_ms: config.idle_threshold().as_millis() as u64,
            exempt_prefixes: config.exempt_prefixes.clone(),
            trust_forwarded_for: config.trust_forwarded_for,
            epoch: Instant::now(),
            epoch_unix_ms: chrono::Utc::now().timestamp_millis().max(0) as u64,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Whether `path` bypasses admission entirely.
    pub fn is_exempt(&self, path: &str) -> bool {
        self.exempt_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }

    pub fn trusts_forwarded_for(&self) -> bool {
        self.trust_forwarded_for
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn to_unix(&self, relative_ms: u64) -> u64 {
        self.epoch_unix_ms + relative_ms
    }

    fn expired(&self, window_start: u64, now: u64) -> bool {
        now.saturating_sub(window_start) > self.window_ms
    }

    /// Try to admit one request for `key`.
    pub fn try_admit(&self, key: &str) -> Admission {
        self.try_admit_at(key, self.now_ms())
    }

    fn try_admit_at(&self, key: &str, now: u64) -> Admission {
        let existing = self.buckets.get(key).map(|bucket| Arc::clone(bucket.value()));
        let bucket = match existing {
            Some(bucket) => bucket,
            None => Arc::clone(
                self.buckets
                    .entry(key.to_string())
                    .or_insert_with(|| Arc::new(ClientBucket::new(now)))
                    .value(),
            ),
        };

        let mut current = bucket.state.load(Ordering::Acquire);
        loop {
            let (mut start, mut count) = unpack(current);
            if self.expired(start, now) {
                start = now;
                count = 0;
            }
            let reset_at = self.to_unix(start + self.window_ms);

            if count >= self.capacity {
                return Admission {
                    allowed: false,
                    limit: self.capacity,
                    remaining: 0,
                    reset_at,
                };
            }

            match bucket.state.compare_exchange_weak(
                current,
                pack(start, count + 1),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    return Admission {
                        allowed: true,
                        limit: self.capacity,
                        remaining: self.capacity - count - 1,
                        reset_at,
                    }
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Requests `key` may still make in its current window.
    pub fn remaining(&self, key: &str) -> u32 {
        self.remaining_at(key, self.now_ms())
    }

    fn remaining_at(&self, key: &str, now: u64) -> u32 {
        match self.snapshot(key) {
            Some((start, count)) if !self.expired(start, now) => {
                self.capacity.saturating_sub(count)
            }
            _ => self.capacity,
        }
    }

    /// Unix milliseconds at which `key`'s current window ends.
    pub fn reset_time(&self, key: &str) -> u64 {
        self.reset_time_at(key, self.now_ms())
    }

    fn reset_time_at(&self, key: &str, now: u64) -> u64 {
        match self.snapshot(key) {
            Some((start, _)) if !self.expired(start, now) => self.to_unix(start + self.window_ms),
            _ => self.to_unix(now + self.window_ms),
        }
    }

    fn snapshot(&self, key: &str) -> Option<(u64, u32)> {
        self.buckets
            .get(key)
            .map(|bucket| unpack(bucket.state.load(Ordering::Acquire)))
    }

    /// Drop buckets whose window started longer ago than the idle threshold.
    /// Returns how many were removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(self.now_ms())
    }

    fn sweep_at(&self, now: u64) -> usize {
        let before = self.buckets.len();
        self.buckets.retain(|_, bucket| {
            let (start, _) = unpack(bucket.state.load(Ordering::Acquire));
            now.saturating_sub(start) <= self.idle_ms
        });
        before.saturating_sub(self.buckets.len())
    }

    /// Periodically sweep idle buckets until shutdown.
    pub async fn run_sweeper(
        self: Arc<Self>,
        period: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        tracing::info!(interval_secs = period.as_secs(), "Rate limit sweeper starting");

        let mut ticker = time::interval_at(time::Instant::now() + period, period);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = self.sweep();
                    let live = self.bucket_count();
                    metrics::record_bucket_count(live);
                    tracing::debug!(removed, live, "Swept idle rate limit buckets");
                }
                _ = shutdown.recv() => {
                    tracing::info!("Rate limit sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

/// Identify the client: first `X-Forwarded-For` hop when trusted, else the peer IP.
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(first) = forwarded {
            return first.to_string();
        }
    }
    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Middleware applying admission control to every non-exempt path.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if limiter.is_exempt(request.uri().path()) {
        return next.run(request).await;
    }

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let key = client_key(request.headers(), peer, limiter.trusts_forwarded_for());
    let admission = limiter.try_admit(&key);

    let mut response = if admission.allowed {
        next.run(request).await
    } else {
        tracing::warn!(
            client = %key,
            path = %request.uri().path(),
            limit = admission.limit,
            "Rate limit exceeded"
        );
        metrics::record_rate_limited();
        GatewayError::rate_limited(admission.limit).into_response()
    };

    admission.apply_headers(response.headers_mut());
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;

    fn limiter(capacity: u32) -> RateLimiter {
        RateLimiter::new(&RateLimitConfig {
            requests_per_minute: capacity,
            ..RateLimitConfig::default()
        })
    }

    #[test]
    fn packing_keeps_start_and_count_apart() {
        let state = pack(123_456_789, MAX_CAPACITY);
        assert_eq!(unpack(state), (123_456_789, MAX_CAPACITY));
        assert_eq!(unpack(pack(0, 0)), (0, 0));
    }

    #[test]
    fn admits_up_to_capacity_then_denies() {
        let limiter = limiter(2);
        let first = limiter.try_admit_at("1.2.3.4", 0);
        let second = limiter.try_admit_at("1.2.3.4", 300);
        let third = limiter.try_admit_at("1.2.3.4", 600);

        assert!(first.allowed);
        assert_eq!(first.remaining, 1);
        assert!(second.allowed);
        assert_eq!(second.remaining, 0);
        assert!(!third.allowed);
        assert_eq!(third.remaining, 0);
        assert_eq!(third.limit, 2);
    }

    #[test]
    fn admission_resumes_after_window_elapses() {
        let limiter = limiter(1);
        assert!(limiter.try_admit_at("c", 1_000).allowed);
        assert!(!limiter.try_admit_at("c", 61_000).allowed);

        let fresh = limiter.try_admit_at("c", 61_001);
        assert!(fresh.allowed);
        assert_eq!(fresh.reset_at, limiter.to_unix(61_001 + 60_000));
    }

    #[test]
    fn clients_are_independent() {
        let limiter = limiter(1);
        assert!(limiter.try_admit_at("a", 0).allowed);
        assert!(limiter.try_admit_at("b", 0).allowed);
        assert!(!limiter.try_admit_at("a", 1).allowed);
    }

    #[test]
    fn zero_capacity_always_denies() {
        let limiter = limiter(0);
        assert!(!limiter.try_admit_at("a", 0).allowed);
        assert!(!limiter.try_admit_at("a", 120_000).allowed);
    }

    #[test]
    fn unknown_key_reports_full_budget() {
        let limiter = limiter(5);
        assert_eq!(limiter.remaining_at("nobody", 10), 5);
        assert_eq!(limiter.reset_time_at("nobody", 10), limiter.to_unix(60_010));
        assert_eq!(limiter.bucket_count(), 0);
    }

    #[test]
    fn remaining_tracks_admissions_and_expiry() {
        let limiter = limiter(3);
        limiter.try_admit_at("k", 0);
        limiter.try_admit_at("k", 1);
        assert_eq!(limiter.remaining_at("k", 2), 1);
        assert_eq!(limiter.reset_time_at("k", 2), limiter.to_unix(60_000));
        assert_eq!(limiter.remaining_at("k", 60_001), 3);
    }

    #[test]
    fn concurrent_admission_never_exceeds_capacity() {
        let limiter = limiter(10);
        let barrier = Barrier::new(50);

        let admitted: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..50)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        limiter.try_admit("shared").allowed
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|allowed| *allowed)
                .count()
        });

        assert_eq!(admitted, 10);
        assert_eq!(limiter.remaining("shared"), 0);
    }

    #[test]
    fn concurrent_window_reset_happens_once() {
        let limiter = limiter(10);
        for _ in 0..10 {
            assert!(limiter.try_admit_at("shared", 0).allowed);
        }
        let barrier = Barrier::new(50);

        let admitted: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..50)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        limiter.try_admit_at("shared", 70_000).allowed
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|allowed| *allowed)
                .count()
        });

        assert_eq!(admitted, 10);
    }

    #[test]
    fn sweep_removes_idle_buckets_only() {
        let limiter = limiter(1);
        limiter.try_admit_at("idle", 0);
        limiter.try_admit_at("active", 250_000);

        assert_eq!(limiter.sweep_at(300_001), 1);
        assert_eq!(limiter.bucket_count(), 1);
        assert!(limiter.snapshot("idle").is_none());

        // The swept client starts a fresh window.
        assert!(limiter.try_admit_at("idle", 300_002).allowed);
    }

    #[test]
    fn exempt_prefixes_match_by_prefix() {
        let limiter = limiter(1);
        assert!(limiter.is_exempt("/actuator/health"));
        assert!(limiter.is_exempt("/swagger-ui/index.html"));
        assert!(limiter.is_exempt("/v3/api-docs"));
        assert!(!limiter.is_exempt("/api/proxy/games"));
    }

    #[test]
    fn client_key_prefers_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(" 1.2.3.4 , 10.0.0.1"));
        let peer: Option<SocketAddr> = "127.0.0.1:5000".parse().ok();

        assert_eq!(client_key(&headers, peer, true), "1.2.3.4");
        assert_eq!(client_key(&headers, peer, false), "127.0.0.1");
        assert_eq!(client_key(&HeaderMap::new(), None, true), "unknown");
    }

    #[test]
    fn headers_carry_admission_metadata() {
        let mut headers = HeaderMap::new();
        Admission {
            allowed: false,
            limit: 2,
            remaining: 0,
            reset_at: 1_700_000_060_000,
        }
        .apply_headers(&mut headers);
        assert_eq!(headers[X_RATELIMIT_LIMIT], "2");
        assert_eq!(headers[X_RATELIMIT_REMAINING], "0");
        assert_eq!(headers[X_RATELIMIT_RESET], "1700000060000");
    }
}
