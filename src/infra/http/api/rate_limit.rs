use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::config::ApiRateLimitSettings;

/// Idle buckets are swept after this many admitted requests.
const SWEEP_INTERVAL: u64 = 1024;

/// Outcome of admitting one request for a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    Limited { retry_after_secs: u64 },
}

/// Sliding-window limiter with one bucket per client.
#[derive(Debug, Clone)]
pub struct ApiRateLimiter {
    window: Duration,
    max_requests: u32,
    trust_forwarded: bool,
    buckets: Arc<DashMap<String, VecDeque<Instant>>>,
    admitted: Arc<AtomicU64>,
}

impl ApiRateLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
            trust_forwarded: true,
            buckets: Arc::new(DashMap::new()),
            admitted: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn from_settings(settings: &ApiRateLimitSettings) -> Self {
        Self::new(
            Duration::from_secs(u64::from(settings.window_seconds.get())),
            settings.max_requests.get(),
        )
        .trust_forwarded_headers(settings.trust_forwarded_headers)
    }

    /// Whether `x-forwarded-for` / `x-real-ip` identify the client. When off,
    /// only the socket peer does.
    pub fn trust_forwarded_headers(mut self, trust: bool) -> Self {
        self.trust_forwarded = trust;
        self
    }

    pub fn trusts_forwarded_headers(&self) -> bool {
        self.trust_forwarded
    }

    pub fn limit(&self) -> u32 {
        self.max_requests
    }

    pub fn tracked_clients(&self) -> usize {
        self.buckets.len()
    }

    pub fn check(&self, client: &str) -> RateDecision {
        self.check_at(client, Instant::now())
    }

    fn check_at(&self, client: &str, now: Instant) -> RateDecision {
        let decision = {
            let mut bucket = self.buckets.entry(client.to_string()).or_default();
            expire(&mut bucket, now, self.window);

            match bucket.front() {
                Some(&oldest) if bucket.len() >= self.max_requests as usize => {
                    let reopens_in = self.window.saturating_sub(now.duration_since(oldest));
                    RateDecision::Limited {
                        retry_after_secs: ceil_secs(reopens_in).max(1),
                    }
                }
                _ => {
                    bucket.push_back(now);
                    RateDecision::Allowed {
                        remaining: self.max_requests.saturating_sub(bucket.len() as u32),
                    }
                }
            }
        };

        if matches!(decision, RateDecision::Allowed { .. }) {
            let admitted = self.admitted.fetch_add(1, Ordering::Relaxed) + 1;
            if admitted % SWEEP_INTERVAL == 0 {
                self.sweep(now);
            }
        }
        decision
    }

    /// Drop expired timestamps and forget clients with nothing left in the window.
    pub fn sweep(&self, now: Instant) {
        let window = self.window;
        self.buckets.retain(|_, bucket| {
            expire(bucket, now, window);
            !bucket.is_empty()
        });
    }
}

fn expire(bucket: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while bucket
        .front()
        .is_some_and(|&seen| now.duration_since(seen) >= window)
    {
        bucket.pop_front();
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}
