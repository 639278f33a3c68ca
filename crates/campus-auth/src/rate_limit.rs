//! Per-subject fixed-window rate limiting
//!
//! The limiter is keyed by the verified subject id, so it must sit behind the
//! authorization layer. Window counters live in a [`RateLimitStore`]:
//! [`InMemoryRateLimitStore`] bounds a single process, and a shared counter
//! store implementing the same trait bounds a fleet.
//!
//! ```rust
//! use campus_auth::rate_limit::RateLimiter;
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let limiter = RateLimiter::in_memory(Duration::from_secs(60), 10);
//! for _ in 0..10 {
//!     assert!(limiter.check("U1").await.is_ok());
//! }
//! assert!(limiter.check("U1").await.is_err());
//! assert!(limiter.check("U2").await.is_ok());
//! # });
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::RateLimitConfig;
use crate::error::{AuthError, AuthResult};

/// Failure of a counter store
#[derive(Debug, Clone, Error)]
#[error("rate limit store error: {0}")]
pub struct RateLimitStoreError(pub String);

/// Outcome of counting one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowStatus {
    /// Requests counted in the current window, this one included
    pub count: u32,
    /// Time until the window resets
    pub resets_in: Duration,
}

/// Backing store for window counters
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Count one request for `subject_id`
    ///
    /// Opens a new window when none exists or the previous one has elapsed.
    /// The increment must be atomic with respect to concurrent calls for the
    /// same subject.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitStoreError`] if the store cannot be reached.
    async fn hit(&self, subject_id: &str, window: Duration) -> Result<WindowStatus, RateLimitStoreError>;
}

/// Counter window for one subject
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateWindow {
    /// Subject the window belongs to
    pub subject_id: String,
    /// When the window opened
    pub window_start: Instant,
    /// Requests counted so far
    pub count: u32,
}

impl RateWindow {
    fn open(subject_id: &str, now: Instant) -> Self {
        Self {
            subject_id: subject_id.to_string(),
            window_start: now,
            count: 0,
        }
    }

    fn has_elapsed(&self, now: Instant, window: Duration) -> bool {
        now.duration_since(self.window_start) >= window
    }
}

const SWEEP_EVERY: u64 = 1024;

/// Process-local window store
///
/// Each subject's window is updated under the map's entry lock.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRateLimitStore {
    windows: Arc<DashMap<String, RateWindow>>,
    hits: Arc<AtomicU64>,
}

impl InMemoryRateLimitStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Current window of a subject, if any
    pub fn window(&self, subject_id: &str) -> Option<RateWindow> {
        self.windows.get(subject_id).map(|entry| entry.clone())
    }

    /// Drop windows that elapsed more than `window` ago
    pub fn purge_expired(&self, window: Duration) {
        let now = Instant::now();
        self.windows.retain(|_, w| !w.has_elapsed(now, window));
    }

    /// Number of tracked subjects
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    /// Whether no subject is tracked
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn hit(&self, subject_id: &str, window: Duration) -> Result<WindowStatus, RateLimitStoreError> {
        if self.hits.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            self.purge_expired(window);
        }

        let now = Instant::now();
        let mut entry = self
            .windows
            .entry(subject_id.to_string())
            .or_insert_with(|| RateWindow::open(subject_id, now));
        if entry.has_elapsed(now, window) {
            *entry = RateWindow::open(subject_id, now);
        }
        entry.count = entry.count.saturating_add(1);

        Ok(WindowStatus {
            count: entry.count,
            resets_in: window.saturating_sub(now.duration_since(entry.window_start)),
        })
    }
}

/// Bounds how many requests one subject may make per window
#[derive(Clone)]
pub struct RateLimiter {
    window: Duration,
    max_requests: u32,
    store: Arc<dyn RateLimitStore>,
}

impl RateLimiter {
    /// Create a limiter over `store`
    pub fn new(window: Duration, max_requests: u32, store: Arc<dyn RateLimitStore>) -> Self {
        Self {
            window,
            max_requests,
            store,
        }
    }

    /// Create a limiter with a process-local store
    pub fn in_memory(window: Duration, max_requests: u32) -> Self {
        Self::new(window, max_requests, Arc::new(InMemoryRateLimitStore::new()))
    }

    /// Create a process-local limiter from configuration
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::in_memory(config.window(), config.max_requests)
    }

    /// Window length
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Requests allowed per window
    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Count a request by `subject_id` and decide whether it may proceed
    ///
    /// A store failure lets the request through and is logged.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::RateLimitExceeded`] once the subject has used up
    /// its requests for the current window.
    pub async fn check(&self, subject_id: &str) -> AuthResult<()> {
        match self.store.hit(subject_id, self.window).await {
            Ok(status) if status.count > self.max_requests => {
                warn!(
                    subject = %subject_id,
                    count = status.count,
                    limit = self.max_requests,
                    retry_after_ms = status.resets_in.as_millis() as u64,
                    "Rate limit exceeded"
                );
                Err(AuthError::RateLimitExceeded {
                    subject_id: subject_id.to_string(),
                    retry_after: status.resets_in,
                })
            }
            Ok(status) => {
                debug!(subject = %subject_id, count = status.count, "Rate limit check passed");
                Ok(())
            }
            Err(e) => {
                warn!(subject = %subject_id, error = %e, "Rate limit store unavailable, allowing request");
                Ok(())
            }
        }
    }
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("window", &self.window)
            .field("max_requests", &self.max_requests)
            .finish_non_exhaustive()
    }
}
