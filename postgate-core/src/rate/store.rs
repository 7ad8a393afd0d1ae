use std::collections::HashMap;
use std::fmt::Debug;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::RateCounter;

/// Persistence for rate counters.
///
/// Updates go through [`CounterStore::compare_and_store`] so two concurrent
/// requests for the same identity can never both spend the same budget.
#[async_trait]
pub trait CounterStore: Send + Sync + Debug {
    async fn load(&self, key: &str) -> anyhow::Result<Option<RateCounter>>;

    /// Stores `new` if the stored value still equals `expected`
    /// (`None` meaning "nothing stored"). Returns whether the write happened.
    async fn compare_and_store(
        &self,
        key: &str,
        expected: Option<RateCounter>,
        new: RateCounter,
    ) -> anyhow::Result<bool>;

    async fn remove(&self, key: &str) -> anyhow::Result<()>;
}

/// Process-local counter store.
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    counters: Mutex<HashMap<String, RateCounter>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.counters.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.counters.lock().await.is_empty()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn load(&self, key: &str) -> anyhow::Result<Option<RateCounter>> {
        Ok(self.counters.lock().await.get(key).copied())
    }

    async fn compare_and_store(
        &self,
        key: &str,
        expected: Option<RateCounter>,
        new: RateCounter,
    ) -> anyhow::Result<bool> {
        let mut counters = self.counters.lock().await;
        if counters.get(key).copied() != expected {
            return Ok(false);
        }
        counters.insert(key.to_string(), new);
        Ok(true)
    }

    async fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.counters.lock().await.remove(key);
        Ok(())
    }
}
