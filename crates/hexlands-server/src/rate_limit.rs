//! Per-client token buckets for join, action and emote requests.

use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tracing::debug;

use crate::config::{BucketLimit, Config};

const STALE_AFTER_MS: u64 = 15 * 60 * 1000;
const PRUNE_EVERY_MS: u64 = 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    Join,
    Action,
    Emote,
}

#[derive(Debug, Clone, Copy)]
struct TokenState {
    tokens: f64,
    at: u64,
}

#[derive(Debug)]
pub struct RateLimiter {
    join: BucketLimit,
    action: BucketLimit,
    emote: BucketLimit,
    states: DashMap<(Bucket, IpAddr), TokenState>,
    last_prune_at: AtomicU64,
}

impl RateLimiter {
    pub fn new(config: &Config) -> Self {
        Self {
            join: config.join_limit,
            action: config.action_limit,
            emote: config.emote_limit,
            states: DashMap::new(),
            last_prune_at: AtomicU64::new(0),
        }
    }

    fn limit(&self, bucket: Bucket) -> BucketLimit {
        match bucket {
            Bucket::Join => self.join,
            Bucket::Action => self.action,
            Bucket::Emote => self.emote,
        }
    }

    /// Take one token. Loopback clients are never limited.
    pub fn allow(&self, bucket: Bucket, ip: IpAddr, now_ms: u64) -> bool {
        if is_loopback(ip) {
            return true;
        }
        self.maybe_prune(now_ms);

        let limit = self.limit(bucket);
        let mut state = self.states.entry((bucket, ip)).or_insert(TokenState {
            tokens: limit.capacity,
            at: now_ms,
        });
        let elapsed_secs = now_ms.saturating_sub(state.at) as f64 / 1000.0;
        state.tokens = (state.tokens + elapsed_secs * limit.refill_per_sec).min(limit.capacity);
        state.at = now_ms;

        if state.tokens < 1.0 {
            debug!(?bucket, %ip, "rate limited");
            return false;
        }
        state.tokens -= 1.0;
        true
    }

    pub fn tracked(&self) -> usize {
        self.states.len()
    }

    fn maybe_prune(&self, now_ms: u64) {
        let last = self.last_prune_at.load(Ordering::Relaxed);
        if now_ms.saturating_sub(last) < PRUNE_EVERY_MS {
            return;
        }
        if self
            .last_prune_at
            .compare_exchange(last, now_ms, Ordering::Relaxed, Ordering::Relaxed)
            .is_err()
        {
            return;
        }
        self.states
            .retain(|_, state| now_ms.saturating_sub(state.at) <= STALE_AFTER_MS);
    }
}

fn is_loopback(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback(),
        IpAddr::V6(v6) => v6.is_loopback() || v6.to_ipv4_mapped().is_some_and(|v4| v4.is_loopback()),
    }
}
