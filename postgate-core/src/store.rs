//! The content store the API sits in front of.
//!
//! Users, permissions and tenant metadata belong to the host application;
//! the API only reads them through [`ContentStore`].

use std::fmt::Debug;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    #[default]
    Active,
    Restricted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub id: String,
    pub display_name: String,
    pub status: UserStatus,
    pub must_change_password: bool,
    /// Tenants this user may call the API for.
    pub api_grants: Vec<String>,
    /// Per-user call budget, overriding the deployment default.
    pub rate_limit: Option<u32>,
}

impl UserRecord {
    pub fn may_use_api(&self, tenant: &str) -> bool {
        self.status == UserStatus::Active
            && !self.must_change_password
            && self.api_grants.iter().any(|t| t == tenant)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TenantInfo {
    pub id: String,
    pub name: String,
    pub url: String,
    pub description: String,
    pub updated_at: Option<DateTime<Utc>>,
    pub post_count: u64,
}

#[async_trait]
pub trait ContentStore: Send + Sync + Debug {
    /// Returns the user when `password` matches, `None` otherwise.
    async fn verify_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> anyhow::Result<Option<UserRecord>>;

    async fn user(&self, id: &str) -> anyhow::Result<Option<UserRecord>>;

    async fn tenant_info(&self, tenant: &str) -> anyhow::Result<Option<TenantInfo>>;
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;

    use super::*;

    /// Plain-text store for unit tests.
    #[derive(Debug, Default)]
    pub struct FixtureStore {
        pub users: HashMap<String, (String, UserRecord)>,
        pub tenants: HashMap<String, TenantInfo>,
    }

    impl FixtureStore {
        pub fn with_user(mut self, password: &str, user: UserRecord) -> Self {
            self.users
                .insert(user.id.clone(), (password.to_string(), user));
            self
        }

        pub fn with_tenant(mut self, info: TenantInfo) -> Self {
            self.tenants.insert(info.id.clone(), info);
            self
        }
    }

    pub fn user(id: &str, tenant: &str) -> UserRecord {
        UserRecord {
            id: id.to_string(),
            display_name: format!("{id} display"),
            status: UserStatus::Active,
            must_change_password: false,
            api_grants: vec![tenant.to_string()],
            rate_limit: None,
        }
    }

    pub fn tenant(id: &str) -> TenantInfo {
        TenantInfo {
            id: id.to_string(),
            name: "My blog".to_string(),
            url: "https://blog.example.org/".to_string(),
            description: "Notes".to_string(),
            updated_at: None,
            post_count: 3,
        }
    }

    #[async_trait]
    impl ContentStore for FixtureStore {
        async fn verify_credentials(
            &self,
            username: &str,
            password: &str,
        ) -> anyhow::Result<Option<UserRecord>> {
            Ok(self
                .users
                .get(username)
                .filter(|(expected, _)| expected == password)
                .map(|(_, user)| user.clone()))
        }

        async fn user(&self, id: &str) -> anyhow::Result<Option<UserRecord>> {
            Ok(self.users.get(id).map(|(_, user)| user.clone()))
        }

        async fn tenant_info(&self, tenant: &str) -> anyhow::Result<Option<TenantInfo>> {
            Ok(self.tenants.get(tenant).cloned())
        }
    }
}
