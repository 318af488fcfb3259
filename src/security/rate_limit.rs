//! Fixed-window rate limiting per client IP.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use http::StatusCode;

use crate::config::RateLimitConfig;
use crate::http::api::api_error;
use crate::http::middleware::{Middleware, Next, Outcome};
use crate::http::request::HttpRequest;
use crate::observability::metrics;

/// Sweep stale windows every this many checks.
const SWEEP_EVERY: u64 = 1024;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Result of a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Time until the current window ends.
    pub reset_after: Duration,
}

#[derive(Debug)]
pub struct RateLimiter {
    windows: DashMap<IpAddr, Window>,
    max_requests: u32,
    window: Duration,
    checks: AtomicU64,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            max_requests,
            window,
            checks: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_requests, Duration::from_millis(config.window_ms))
    }

    pub fn check(&self, client: IpAddr) -> Decision {
        self.check_at(client, Instant::now())
    }

    /// Count one request from `client` at `now`.
    pub fn check_at(&self, client: IpAddr, now: Instant) -> Decision {
        if self.checks.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            self.sweep(now);
        }

        let mut entry = self.windows.entry(client).or_insert(Window {
            started: now,
            count: 0,
        });
        let window = entry.value_mut();
        if now.saturating_duration_since(window.started) >= self.window {
            window.started = now;
            window.count = 0;
        }

        let reset_after = self
            .window
            .saturating_sub(now.saturating_duration_since(window.started));

        if window.count >= self.max_requests {
            return Decision {
                allowed: false,
                limit: self.max_requests,
                remaining: 0,
                reset_after,
            };
        }

        window.count += 1;
        Decision {
            allowed: true,
            limit: self.max_requests,
            remaining: self.max_requests - window.count,
            reset_after,
        }
    }

    /// Drop windows that ended before `now`. Returns how many were removed.
    pub fn sweep(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows
            .retain(|_, w| now.saturating_duration_since(w.started) < self.window);
        let removed = before.saturating_sub(self.windows.len());
        if removed > 0 {
            tracing::debug!(removed, "Rate limit windows purged");
        }
        removed
    }

    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }
}

impl Middleware for RateLimiter {
    fn handle(&self, request: &mut HttpRequest, next: Next<'_>) -> Outcome {
        let client = request
            .client_ip()
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        let decision = self.check(client);

        if !decision.allowed {
            let retry_secs = decision.reset_after.as_secs_f64().ceil() as u64;
            tracing::warn!(client = %client, path = %request.path(), "Rate limit exceeded");
            metrics::record_rate_limited();
            return Ok(api_error(StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded")
                .with_header("x-ratelimit-limit", decision.limit.to_string())
                .with_header("x-ratelimit-remaining", "0")
                .with_header("x-ratelimit-reset", retry_secs.to_string())
                .with_header("retry-after", retry_secs.to_string()));
        }

        next.run(request).map(|response| {
            response
                .with_header("x-ratelimit-limit", decision.limit.to_string())
                .with_header("x-ratelimit-remaining", decision.remaining.to_string())
        })
    }
}
