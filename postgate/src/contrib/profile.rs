use std::sync::Arc;

use async_trait::async_trait;
use postgate_core::endpoint::Call;
use postgate_core::profile::ProfileContributor;
use postgate_core::store::UserRecord;
use serde_json::{json, Map, Value};

use crate::content::PostSource;

/// Adds `nb_posts`, the number of posts the user wrote on the tenant's blog.
#[derive(Debug)]
pub struct AuthoredPosts {
    posts: Arc<dyn PostSource>,
}

impl AuthoredPosts {
    pub const KEY: &'static str = "nb_posts";

    pub fn new(posts: Arc<dyn PostSource>) -> Self {
        Self { posts }
    }
}

#[async_trait]
impl ProfileContributor for AuthoredPosts {
    async fn contribute(
        &self,
        call: &Call<'_>,
        user: &UserRecord,
    ) -> anyhow::Result<Map<String, Value>> {
        let count = self
            .posts
            .count_by_author(&call.request.tenant.id, &user.display_name)
            .await?;
        let mut extra = Map::new();
        extra.insert(Self::KEY.to_string(), json!(count));
        Ok(extra)
    }
}
