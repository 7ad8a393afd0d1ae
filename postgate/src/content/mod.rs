pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

pub use memory::MemoryContentStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Post {
    pub id: String,
    pub title: String,
    pub url: String,
    pub excerpt: String,
    pub content: String,
    pub author: String,
    pub published_at: Option<DateTime<Utc>>,
}

/// Read access to published posts.
#[async_trait]
pub trait PostSource: Send + Sync + std::fmt::Debug {
    async fn post(&self, tenant: &str, id: &str) -> anyhow::Result<Option<Post>>;

    /// Number of posts on `tenant` signed by `author`.
    async fn count_by_author(&self, tenant: &str, author: &str) -> anyhow::Result<u64>;
}
