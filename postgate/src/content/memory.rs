use std::collections::BTreeMap;

use async_trait::async_trait;
use postgate_core::store::{ContentStore, TenantInfo, UserRecord};
use tracing::warn;

use super::{Post, PostSource};
use crate::settings::content::{BlogSettings, ContentSettings, UserSettings};

/// Content store backed by the `content` section of the settings.
#[derive(Debug, Clone, Default)]
pub struct MemoryContentStore {
    tenants: BTreeMap<String, BlogSettings>,
    users: BTreeMap<String, UserSettings>,
}

impl MemoryContentStore {
    pub fn from_settings(settings: &ContentSettings) -> Self {
        Self {
            tenants: settings.tenants.clone(),
            users: settings.users.clone(),
        }
    }

    fn record(id: &str, user: &UserSettings) -> UserRecord {
        UserRecord {
            id: id.to_string(),
            display_name: user.display_name.clone(),
            status: user.status,
            must_change_password: user.must_change_password,
            api_grants: user.grants.clone(),
            rate_limit: user.rate_limit,
        }
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn verify_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> anyhow::Result<Option<UserRecord>> {
        let Some(user) = self.users.get(username) else {
            return Ok(None);
        };

        let password = password.to_string();
        let hash = user.password_hash.clone();
        let verified = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash)).await?;
        match verified {
            Ok(true) => Ok(Some(Self::record(username, user))),
            Ok(false) => Ok(None),
            Err(e) => {
                warn!(user = username, error = %e, "stored password hash is unusable");
                Ok(None)
            }
        }
    }

    async fn user(&self, id: &str) -> anyhow::Result<Option<UserRecord>> {
        Ok(self.users.get(id).map(|user| Self::record(id, user)))
    }

    async fn tenant_info(&self, tenant: &str) -> anyhow::Result<Option<TenantInfo>> {
        Ok(self.tenants.get(tenant).map(|blog| TenantInfo {
            id: tenant.to_string(),
            name: blog.name.clone(),
            url: blog.url.clone(),
            description: blog.description.clone(),
            updated_at: blog.updated_at,
            post_count: blog.posts.len() as u64,
        }))
    }
}

#[async_trait]
impl PostSource for MemoryContentStore {
    async fn post(&self, tenant: &str, id: &str) -> anyhow::Result<Option<Post>> {
        let post = self
            .tenants
            .get(tenant)
            .and_then(|blog| blog.posts.get(id))
            .map(|post| Post {
                id: id.to_string(),
                title: post.title.clone(),
                url: post.url.clone(),
                excerpt: post.excerpt.clone(),
                content: post.content.clone(),
                author: post.author.clone(),
                published_at: post.published_at,
            });
        Ok(post)
    }

    async fn count_by_author(&self, tenant: &str, author: &str) -> anyhow::Result<u64> {
        let count = self
            .tenants
            .get(tenant)
            .map(|blog| blog.posts.values().filter(|post| post.author == author).count())
            .unwrap_or_default();
        Ok(count as u64)
    }
}
