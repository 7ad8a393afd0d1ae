//! Per-identity call budgets.
//!
//! Every identity owns a [`RateCounter`] holding the number of calls left in
//! the current window. Anonymous callers of a tenant share one counter,
//! authenticated users each have their own. Counters live in a
//! [`CounterStore`] so the budget survives across requests.
//!
//! Headers follow the `X-RateLimit-*` convention:
//! - `X-RateLimit-Limit`, `X-RateLimit-Remaining`
//! - `X-RateLimit-Reset` (RFC 3339, UTC)
//! - `X-RateLimit-NearLimit`: `1` when less than 20% of the budget is left
//! - `Retry-After` in seconds, only once the budget is exhausted

pub mod store;

use std::fmt;
use std::sync::Arc;

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::clock::{format_time, SharedClock};
use crate::error::ApiError;
pub use store::{CounterStore, MemoryCounterStore};

pub const DEFAULT_LIMIT: u32 = 2000;
pub const DEFAULT_WINDOW: u64 = 3600;

/// Attempts at a compare-and-store before giving up on a hot counter.
const MAX_STORE_ATTEMPTS: usize = 16;

pub const LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const RESET_HEADER: &str = "x-ratelimit-reset";
pub const NEAR_LIMIT_HEADER: &str = "x-ratelimit-nearlimit";
pub const RETRY_AFTER_HEADER: &str = "retry-after";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateCounter {
    pub limit: u32,
    pub remaining: u32,
    /// Unix timestamp at which the window ends.
    pub reset: i64,
}

impl RateCounter {
    pub fn fresh(limit: u32, now: i64, window: u64) -> Self {
        Self {
            limit,
            remaining: limit,
            reset: now.saturating_add(window as i64),
        }
    }

    /// Applies the configured limit to a loaded counter and rebuilds it
    /// when its window has passed.
    pub fn normalized(self, limit: u32, now: i64, window: u64) -> Self {
        if self.reset < now {
            return Self::fresh(limit, now, window);
        }
        Self {
            limit,
            remaining: self.remaining.min(limit),
            reset: self.reset,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining < 1
    }

    pub fn near_limit(&self) -> bool {
        self.limit > 0 && (self.remaining as u64) * 100 < (self.limit as u64) * 20
    }

    /// Seconds until the window resets, once the budget is exhausted.
    pub fn retry_after(&self, now: i64) -> Option<i64> {
        self.is_exhausted()
            .then(|| self.reset.saturating_sub(now).max(0))
    }

    pub fn reset_date(&self) -> String {
        format_time(self.reset)
    }

    pub fn apply_headers(&self, headers: &mut HeaderMap, now: i64) {
        let mut put = |name: &'static str, value: String| match HeaderValue::from_str(&value) {
            Ok(value) => {
                headers.insert(HeaderName::from_static(name), value);
            }
            Err(e) => warn!(header = name, error = %e, "invalid rate limit header value"),
        };

        put(LIMIT_HEADER, self.limit.to_string());
        put(REMAINING_HEADER, self.remaining.to_string());
        put(RESET_HEADER, self.reset_date());
        put(
            NEAR_LIMIT_HEADER,
            if self.near_limit() { "1" } else { "0" }.to_string(),
        );
        if let Some(seconds) = self.retry_after(now) {
            put(RETRY_AFTER_HEADER, seconds.to_string());
        }
    }
}

/// Who a budget belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RateIdentity {
    /// Every unauthenticated caller of a tenant.
    Anonymous { tenant: String },
    User { subject: String },
}

impl RateIdentity {
    pub fn anonymous(tenant: impl Into<String>) -> Self {
        RateIdentity::Anonymous {
            tenant: tenant.into(),
        }
    }

    pub fn user(subject: impl Into<String>) -> Self {
        RateIdentity::User {
            subject: subject.into(),
        }
    }

    /// Reads back a [`RateIdentity::store_key`].
    pub fn parse(key: &str) -> Option<Self> {
        let (kind, name) = key.split_once(':')?;
        if name.is_empty() {
            return None;
        }
        match kind {
            "anonymous" => Some(Self::anonymous(name)),
            "user" => Some(Self::user(name)),
            _ => None,
        }
    }

    pub fn store_key(&self) -> String {
        match self {
            RateIdentity::Anonymous { tenant } => format!("anonymous:{tenant}"),
            RateIdentity::User { subject } => format!("user:{subject}"),
        }
    }
}

impl fmt::Display for RateIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.store_key())
    }
}

#[derive(Debug, Clone)]
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    clock: SharedClock,
    default_limit: u32,
    window: u64,
}

impl RateLimiter {
    pub fn new(
        store: Arc<dyn CounterStore>,
        clock: SharedClock,
        default_limit: u32,
        window: u64,
    ) -> Self {
        Self {
            store,
            clock,
            default_limit,
            window,
        }
    }

    pub fn window(&self) -> u64 {
        self.window
    }

    /// Charges `cost` calls to `identity` and returns the resulting counter.
    ///
    /// A zero cost only reports the current state. An exhausted budget
    /// fails with [`ApiError::RateLimitReached`] without touching the store.
    pub async fn check(
        &self,
        identity: &RateIdentity,
        limit: Option<u32>,
        cost: u32,
    ) -> Result<RateCounter, ApiError> {
        let key = identity.store_key();
        let limit = limit.unwrap_or(self.default_limit);

        for _ in 0..MAX_STORE_ATTEMPTS {
            let now = self.clock.timestamp();
            let stored = self.store.load(&key).await?;
            let counter = match stored {
                Some(stored) => stored.normalized(limit, now, self.window),
                None => RateCounter::fresh(limit, now, self.window),
            };

            if cost == 0 {
                return Ok(counter);
            }
            if counter.is_exhausted() {
                debug!(identity = %identity, reset = counter.reset, "rate limit reached");
                return Err(ApiError::RateLimitReached(counter));
            }

            let charged = RateCounter {
                remaining: counter.remaining.saturating_sub(cost),
                ..counter
            };
            if self.store.compare_and_store(&key, stored, charged).await? {
                debug!(
                    identity = %identity,
                    cost,
                    remaining = charged.remaining,
                    "charged rate budget"
                );
                return Ok(charged);
            }
            debug!(identity = %identity, "rate counter changed concurrently, retrying");
        }

        Err(ApiError::Internal(format!(
            "rate counter for {identity} is too contended"
        )))
    }
}
