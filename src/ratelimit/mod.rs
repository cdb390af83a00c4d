//! Sliding-window rate limiting.
//!
//! This module provides:
//! - Per-key sliding windows of event timestamps
//! - An optional burst window checked alongside the main window
//! - Lazy pruning on every check plus a periodic sweep of idle keys
//!
//! Each key owns its own window inside a `DashMap`, so callers holding
//! different keys never contend on the same lock.

use crate::config::RateLimitConfig;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Answer to "may this key perform one more event?"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Events still available in the main window
    pub remaining: u32,
    /// When the oldest retained event leaves the main window
    pub reset_time: DateTime<Utc>,
    /// Events still available in the burst window, when configured
    pub burst_remaining: Option<u32>,
}

/// Timestamps (milliseconds since epoch) retained for one window
#[derive(Debug, Default)]
struct Window {
    events: VecDeque<i64>,
}

impl Window {
    /// Drop events older than `now - window_ms`
    fn prune(&mut self, now_ms: i64, window_ms: i64) {
        let cutoff = now_ms - window_ms;
        while let Some(&oldest) = self.events.front() {
            if oldest < cutoff {
                self.events.pop_front();
            } else {
                break;
            }
        }
    }

    /// Insert keeping the events sorted; in-order arrivals append
    fn record(&mut self, now_ms: i64) {
        let at = self
            .events
            .iter()
            .rposition(|&t| t <= now_ms)
            .map_or(0, |i| i + 1);
        self.events.insert(at, now_ms);
    }

    fn len(&self) -> u32 {
        self.events.len() as u32
    }

    fn reset_ms(&self, now_ms: i64, window_ms: i64) -> i64 {
        match self.events.front() {
            Some(&oldest) => oldest + window_ms,
            None => now_ms + window_ms,
        }
    }
}

#[derive(Debug, Default)]
struct KeyWindows {
    main: Window,
    burst: Window,
}

#[derive(Debug, Clone, Copy)]
struct Limits {
    window_ms: i64,
    max_requests: u32,
    burst: Option<(i64, u32)>,
}

/// Per-key sliding-window rate limiter
pub struct SlidingWindowRateLimiter {
    limits: Limits,
    sweep_interval: std::time::Duration,
    windows: DashMap<String, KeyWindows>,
}

impl SlidingWindowRateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            limits: Limits {
                window_ms: config.window_ms as i64,
                max_requests: config.max_requests,
                burst: config
                    .burst
                    .as_ref()
                    .map(|b| (b.window_ms as i64, b.max_requests)),
            },
            sweep_interval: config.sweep_interval(),
            windows: DashMap::new(),
        }
    }

    /// Check and, if allowed, record an event for `key` now
    pub fn is_allowed(&self, key: &str) -> RateLimitDecision {
        self.check(key, Utc::now)
    }

    /// Check and, if allowed, record an event for `key` at `now`.
    ///
    /// The event is recorded only when both the main and the burst window
    /// admit it. `remaining` reflects the window after recording.
    pub fn is_allowed_at(&self, key: &str, now: DateTime<Utc>) -> RateLimitDecision {
        self.check(key, || now)
    }

    /// The clock is read while the key's entry is locked, so events for one
    /// key are stamped in the order they are recorded.
    fn check(&self, key: &str, clock: impl FnOnce() -> DateTime<Utc>) -> RateLimitDecision {
        let limits = self.limits;

        let mut entry = self.windows.entry(key.to_string()).or_default();
        let now_ms = clock().timestamp_millis();
        let windows = entry.value_mut();
        windows.main.prune(now_ms, limits.window_ms);

        let main_ok = windows.main.len() < limits.max_requests;
        let burst_ok = match limits.burst {
            Some((burst_window_ms, burst_max)) => {
                windows.burst.prune(now_ms, burst_window_ms);
                windows.burst.len() < burst_max
            }
            None => true,
        };

        let allowed = main_ok && burst_ok;
        if allowed {
            windows.main.record(now_ms);
            if limits.burst.is_some() {
                windows.burst.record(now_ms);
            }
        } else {
            tracing::debug!(
                key = %key,
                main_exhausted = !main_ok,
                burst_exhausted = !burst_ok,
                "Rate limit denied event"
            );
        }

        Self::decision(windows, &limits, now_ms, allowed)
    }

    /// Current status for `key` at `now` without recording an event
    pub fn get_status_at(&self, key: &str, now: DateTime<Utc>) -> RateLimitDecision {
        let now_ms = now.timestamp_millis();
        let limits = self.limits;

        match self.windows.get_mut(key) {
            Some(mut entry) => {
                let windows = entry.value_mut();
                windows.main.prune(now_ms, limits.window_ms);
                if let Some((burst_window_ms, _)) = limits.burst {
                    windows.burst.prune(now_ms, burst_window_ms);
                }
                let allowed = windows.main.len() < limits.max_requests
                    && limits
                        .burst
                        .map_or(true, |(_, burst_max)| windows.burst.len() < burst_max);
                Self::decision(windows, &limits, now_ms, allowed)
            }
            None => Self::decision(&KeyWindows::default(), &limits, now_ms, true),
        }
    }

    pub fn get_status(&self, key: &str) -> RateLimitDecision {
        self.get_status_at(key, Utc::now())
    }

    fn decision(windows: &KeyWindows, limits: &Limits, now_ms: i64, allowed: bool) -> RateLimitDecision {
        let reset_ms = windows.main.reset_ms(now_ms, limits.window_ms);
        RateLimitDecision {
            allowed,
            remaining: limits.max_requests.saturating_sub(windows.main.len()),
            reset_time: DateTime::<Utc>::from_timestamp_millis(reset_ms)
                .unwrap_or_else(|| Utc::now() + ChronoDuration::milliseconds(limits.window_ms)),
            burst_remaining: limits
                .burst
                .map(|(_, burst_max)| burst_max.saturating_sub(windows.burst.len())),
        }
    }

    /// Remove keys whose whole window has aged out; returns how many were removed
    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let now_ms = now.timestamp_millis();
        let window_ms = self.limits.window_ms;
        let before = self.windows.len();

        self.windows.retain(|_, windows| {
            windows.main.prune(now_ms, window_ms);
            !windows.main.events.is_empty()
        });

        let removed = before.saturating_sub(self.windows.len());
        if removed > 0 {
            tracing::debug!(removed, remaining = self.windows.len(), "Swept idle rate limit keys");
        }
        removed
    }

    pub fn sweep(&self) -> usize {
        self.sweep_at(Utc::now())
    }

    /// Sweep periodically until `shutdown` is cancelled
    pub fn spawn_sweeper(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let limiter = self.clone();
        let period = limiter.sweep_interval.max(std::time::Duration::from_millis(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::debug!("Rate limit sweeper stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        limiter.sweep();
                    }
                }
            }
        })
    }

    /// Forget all events recorded for `key`
    pub fn reset(&self, key: &str) -> bool {
        self.windows.remove(key).is_some()
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }
}
