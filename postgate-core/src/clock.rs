//! UTC time source and fixed-length windows.
//!
//! Tokens, rate windows and cache entries all measure time in unix seconds
//! taken from a [`Clock`]. Production code uses [`SystemClock`]; tests drive
//! a [`ManualClock`] forward instead of sleeping.

use std::fmt::Debug;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, SecondsFormat, TimeZone, Utc};

pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> DateTime<Utc>;

    /// Current time as a unix timestamp.
    fn timestamp(&self) -> i64 {
        self.now().timestamp()
    }
}

pub type SharedClock = Arc<dyn Clock>;

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn starting_now() -> Self {
        Self::new(Utc::now())
    }

    pub fn advance(&self, seconds: i64) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += Duration::seconds(seconds);
    }

    pub fn set(&self, to: DateTime<Utc>) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A `[start, end]` span in unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: i64,
    pub end: i64,
}

impl Window {
    /// Window of `lifetime` seconds starting at the clock's current time.
    pub fn starting_now(clock: &dyn Clock, lifetime: u64) -> Self {
        let start = clock.timestamp();
        Self {
            start,
            end: start.saturating_add(lifetime as i64),
        }
    }
}

/// Formats a unix timestamp as RFC 3339 in UTC, e.g. `2025-04-01T16:56:59+00:00`.
pub fn format_time(timestamp: i64) -> String {
    match Utc.timestamp_opt(timestamp, 0).single() {
        Some(date) => date.to_rfc3339_opts(SecondsFormat::Secs, false),
        None => String::new(),
    }
}

/// Formats a timestamp the way HTTP date headers expect.
pub fn format_http_date(date: DateTime<Utc>) -> String {
    date.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Parses an HTTP date header such as `If-Modified-Since`.
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|date| date.with_timezone(&Utc))
}
