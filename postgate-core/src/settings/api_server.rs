use std::path::PathBuf;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};

use super::rate_limiting::TierConfig;
use crate::rate::DEFAULT_LIMIT;

#[derive(Debug, Deserialize, Clone)]
#[allow(unused)]
#[readonly::make]
#[serde(default)]
pub struct ApiServer {
    pub bind_address: String,
    /// Signs every identity token of the deployment.
    #[serde(deserialize_with = "deserialize_secret")]
    pub master_key: SecretString,
    /// Tenant served when the request host matches none.
    pub default_tenant: String,
    /// Calls per window for identities without their own limit.
    pub rate_limit: u32,
    /// Directory holding cached responses; no directory, no cache.
    pub cache_root: Option<PathBuf>,
    pub token_lifetime: Option<u64>,
    pub rate_lifetime: Option<u64>,
    pub cache_lifetime: Option<u64>,
    pub flood_protection: TierConfig,
}

impl Default for ApiServer {
    fn default() -> Self {
        ApiServer {
            bind_address: "0.0.0.0:21380".to_string(),
            master_key: SecretString::new(String::new().into_boxed_str()),
            default_tenant: "default".to_string(),
            rate_limit: DEFAULT_LIMIT,
            cache_root: None,
            token_lifetime: None,
            rate_lifetime: None,
            cache_lifetime: None,
            flood_protection: TierConfig::default(),
        }
    }
}

impl ApiServer {
    pub fn has_master_key(&self) -> bool {
        !self.master_key.expose_secret().trim().is_empty()
    }
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    Ok(SecretString::new(value.into_boxed_str()))
}

/// Per-tenant API settings, as administrators configure them.
#[derive(Debug, Deserialize, Clone)]
#[allow(unused)]
#[readonly::make]
#[serde(default)]
pub struct TenantSettings {
    pub active: bool,
    /// Host name routed to this tenant.
    pub host: Option<String>,
    pub token_lifetime: Option<u64>,
    pub rate_lifetime: Option<u64>,
    pub cache_lifetime: Option<u64>,
}

impl Default for TenantSettings {
    fn default() -> Self {
        Self {
            active: true,
            host: None,
            token_lifetime: None,
            rate_lifetime: None,
            cache_lifetime: None,
        }
    }
}

impl TenantSettings {
    pub fn serves_host(&self, host: &str) -> bool {
        self.host
            .as_deref()
            .is_some_and(|h| h.eq_ignore_ascii_case(host))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let api: ApiServer = serde_json::from_value(json!({})).unwrap();
        assert_eq!(api.bind_address, "0.0.0.0:21380");
        assert_eq!(api.rate_limit, 2000);
        assert!(!api.has_master_key());
        assert!(api.cache_root.is_none());
    }

    #[test]
    fn test_master_key_is_redacted() {
        let api: ApiServer = serde_json::from_value(json!({"master_key": "hunter2"})).unwrap();
        assert!(api.has_master_key());
        assert!(!format!("{api:?}").contains("hunter2"));
    }

    #[test]
    fn test_tenant_host_matching() {
        let tenant: TenantSettings =
            serde_json::from_value(json!({"host": "Blog.Example.org"})).unwrap();
        assert!(tenant.active);
        assert!(tenant.serves_host("blog.example.org"));
        assert!(!tenant.serves_host("example.org"));
    }
}
