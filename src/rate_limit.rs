//! Failed-attempt rate limiting for the product-license validation endpoint.
//!
//! Counters track *failures*, not requests: a well-behaved client validating on
//! every startup is never throttled, while a caller probing keys or tokens burns
//! through a budget keyed by its IP and by the license key it is probing. A
//! successful validation resets both counters.
//!
//! The backing store is an injected trait so a multi-instance deployment can
//! swap in a shared store; the bundled implementation is an in-memory sliding
//! window of failure timestamps with bounded tracking.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use crate::config::RateLimitSettings;

/// Which budget a key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimitKind {
    Ip,
    LicenseKey,
}

/// Injected rate-limiter interface (see the endpoint's validation sequence).
pub trait RateLimiter: Send + Sync {
    /// True when the key still has failure budget left.
    fn check(&self, kind: LimitKind, key: &str) -> bool;

    /// Record one failed attempt against the key.
    fn record_failure(&self, kind: LimitKind, key: &str);

    /// Forget all failures for the key (called on successful validation).
    fn reset(&self, kind: LimitKind, key: &str);

    /// Drop entries whose failures have all aged out of their window.
    fn cleanup(&self);
}

/// Opportunistic cleanup runs every this many recorded failures.
const CLEANUP_EVERY: u64 = 1024;

/// In-memory sliding-window limiter.
pub struct MemoryRateLimiter {
    settings: RateLimitSettings,
    max_tracked_keys: usize,
    state: RwLock<HashMap<(LimitKind, String), Vec<Instant>>>,
    op_count: AtomicU64,
}

impl MemoryRateLimiter {
    pub fn new(settings: RateLimitSettings) -> Self {
        Self::with_capacity(settings, 10_000)
    }

    pub fn with_capacity(settings: RateLimitSettings, max_tracked_keys: usize) -> Self {
        Self {
            settings,
            max_tracked_keys,
            state: RwLock::new(HashMap::new()),
            op_count: AtomicU64::new(0),
        }
    }

    fn budget(&self, kind: LimitKind) -> (u32, Duration) {
        match kind {
            LimitKind::Ip => (
                self.settings.ip_max_attempts,
                Duration::from_secs(self.settings.ip_window_secs),
            ),
            LimitKind::LicenseKey => (
                self.settings.key_max_attempts,
                Duration::from_secs(self.settings.key_window_secs),
            ),
        }
    }

    fn window(&self, kind: LimitKind) -> Duration {
        self.budget(kind).1
    }

    fn record_failure_at(&self, kind: LimitKind, key: &str, at: Instant) {
        let mut state = match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let entry_key = (kind, key.to_string());
        if !state.contains_key(&entry_key) && state.len() >= self.max_tracked_keys {
            // Evict aged-out entries before giving up on tracking this key.
            let now = Instant::now();
            let ip_window = self.window(LimitKind::Ip);
            let key_window = self.window(LimitKind::LicenseKey);
            state.retain(|(k, _), attempts| {
                let window = match k {
                    LimitKind::Ip => ip_window,
                    LimitKind::LicenseKey => key_window,
                };
                attempts.iter().any(|t| now.duration_since(*t) <= window)
            });

            if state.len() >= self.max_tracked_keys {
                tracing::warn!(
                    "rate limiter at capacity ({} keys), not tracking new key",
                    self.max_tracked_keys
                );
                return;
            }
        }

        state.entry(entry_key).or_default().push(at);
        drop(state);

        if self.op_count.fetch_add(1, Ordering::Relaxed) % CLEANUP_EVERY == 0 {
            self.cleanup();
        }
    }

    fn live_failures(&self, kind: LimitKind, key: &str) -> u32 {
        let window = self.window(kind);
        let now = Instant::now();
        let state = match self.state.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        state
            .get(&(kind, key.to_string()))
            .map(|attempts| {
                attempts
                    .iter()
                    .filter(|t| now.duration_since(**t) <= window)
                    .count() as u32
            })
            .unwrap_or(0)
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.state.read().unwrap().len()
    }
}

impl RateLimiter for MemoryRateLimiter {
    fn check(&self, kind: LimitKind, key: &str) -> bool {
        let (max_attempts, _) = self.budget(kind);
        self.live_failures(kind, key) < max_attempts
    }

    fn record_failure(&self, kind: LimitKind, key: &str) {
        self.record_failure_at(kind, key, Instant::now());
    }

    fn reset(&self, kind: LimitKind, key: &str) {
        let mut state = match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.remove(&(kind, key.to_string()));
    }

    fn cleanup(&self) {
        let now = Instant::now();
        let ip_window = self.window(LimitKind::Ip);
        let key_window = self.window(LimitKind::LicenseKey);

        let mut state = match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.retain(|(kind, _), attempts| {
            let window = match kind {
                LimitKind::Ip => ip_window,
                LimitKind::LicenseKey => key_window,
            };
            attempts.retain(|t| now.duration_since(*t) <= window);
            !attempts.is_empty()
        });
    }
}

/// Periodically prune the limiter so idle keys do not accumulate.
pub fn spawn_cleanup_task(limiter: std::sync::Arc<dyn RateLimiter>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        interval.tick().await; // first tick fires immediately
        loop {
            interval.tick().await;
            limiter.cleanup();
        }
    });
}
