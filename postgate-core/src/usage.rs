use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::clock::SharedClock;

/// Calls per endpoint since the last clear.
#[derive(Debug)]
pub struct UsageCounters {
    clock: SharedClock,
    state: Mutex<UsageState>,
}

#[derive(Debug)]
struct UsageState {
    since: DateTime<Utc>,
    counts: HashMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct UsageEntry {
    pub endpoint: String,
    pub calls: u64,
}

/// Usage since the last clear, most used endpoint first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct UsageReport {
    pub since: DateTime<Utc>,
    pub endpoints: Vec<UsageEntry>,
}

impl UsageCounters {
    pub fn new(clock: SharedClock) -> Self {
        let since = clock.now();
        Self {
            clock,
            state: Mutex::new(UsageState {
                since,
                counts: HashMap::new(),
            }),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, UsageState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn record(&self, endpoint: &str) {
        *self.state().counts.entry(endpoint.to_string()).or_default() += 1;
    }

    pub fn get(&self, endpoint: &str) -> u64 {
        self.state().counts.get(endpoint).copied().unwrap_or_default()
    }

    /// Most used first; ties ordered by endpoint id.
    pub fn snapshot(&self) -> Vec<UsageEntry> {
        let mut entries: Vec<UsageEntry> = self
            .state()
            .counts
            .iter()
            .map(|(endpoint, calls)| UsageEntry {
                endpoint: endpoint.clone(),
                calls: *calls,
            })
            .collect();
        entries.sort_by(|a, b| b.calls.cmp(&a.calls).then_with(|| a.endpoint.cmp(&b.endpoint)));
        entries
    }

    pub fn since(&self) -> DateTime<Utc> {
        self.state().since
    }

    pub fn report(&self) -> UsageReport {
        UsageReport {
            since: self.since(),
            endpoints: self.snapshot(),
        }
    }

    pub fn clear(&self) {
        let now = self.clock.now();
        let mut state = self.state();
        state.counts.clear();
        state.since = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::Arc;

    #[test]
    fn test_snapshot_is_sorted() {
        let usage = UsageCounters::new(Arc::new(ManualClock::starting_now()));
        usage.record("blog");
        usage.record("post");
        usage.record("post");
        usage.record("codes");

        let names: Vec<_> = usage.snapshot().into_iter().map(|e| e.endpoint).collect();
        assert_eq!(names, vec!["post", "blog", "codes"]);
        assert_eq!(usage.get("post"), 2);
        assert_eq!(usage.get("user"), 0);
    }

    #[test]
    fn test_clear_moves_since() {
        let clock = ManualClock::starting_now();
        let usage = UsageCounters::new(Arc::new(clock.clone()));
        usage.record("blog");
        let before = usage.since();

        clock.advance(30);
        usage.clear();
        let report = usage.report();
        assert!(report.endpoints.is_empty());
        assert_eq!((report.since - before).num_seconds(), 30);
    }
}
