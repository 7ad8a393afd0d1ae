//! Token, rate window and cache lifetimes.
//!
//! A deployment-level value wins over the tenant's own setting, which wins
//! over the built-in default. Zero is a real value: a cache lifetime of 0
//! turns the cache off.

use super::api_server::{ApiServer, TenantSettings};

pub const DEFAULT_TOKEN_LIFETIME: u64 = 3600;
pub const DEFAULT_RATE_LIFETIME: u64 = 3600;
pub const DEFAULT_CACHE_LIFETIME: u64 = 600;

pub fn resolve_lifetime(deployment: Option<u64>, tenant: Option<u64>, default: u64) -> u64 {
    deployment.or(tenant).unwrap_or(default)
}

/// Lifetimes in seconds, resolved for one tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lifetimes {
    pub token: u64,
    pub rate: u64,
    pub cache: u64,
}

impl Lifetimes {
    pub fn resolve(api: &ApiServer, tenant: &TenantSettings) -> Self {
        Self {
            token: resolve_lifetime(
                api.token_lifetime,
                tenant.token_lifetime,
                DEFAULT_TOKEN_LIFETIME,
            ),
            rate: resolve_lifetime(api.rate_lifetime, tenant.rate_lifetime, DEFAULT_RATE_LIFETIME),
            cache: resolve_lifetime(
                api.cache_lifetime,
                tenant.cache_lifetime,
                DEFAULT_CACHE_LIFETIME,
            ),
        }
    }
}

impl Default for Lifetimes {
    fn default() -> Self {
        Self {
            token: DEFAULT_TOKEN_LIFETIME,
            rate: DEFAULT_RATE_LIFETIME,
            cache: DEFAULT_CACHE_LIFETIME,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_precedence() {
        assert_eq!(resolve_lifetime(Some(10), Some(20), 30), 10);
        assert_eq!(resolve_lifetime(None, Some(20), 30), 20);
        assert_eq!(resolve_lifetime(None, None, 30), 30);
        assert_eq!(resolve_lifetime(Some(0), Some(20), 30), 0);
    }

    #[test]
    fn test_resolve_for_tenant() {
        let api: ApiServer = serde_json::from_value(json!({
            "master_key": "k",
            "cache_lifetime": 0
        }))
        .unwrap();
        let tenant: TenantSettings = serde_json::from_value(json!({
            "token_lifetime": 120,
            "cache_lifetime": 900
        }))
        .unwrap();

        let lifetimes = Lifetimes::resolve(&api, &tenant);
        assert_eq!(
            lifetimes,
            Lifetimes {
                token: 120,
                rate: DEFAULT_RATE_LIFETIME,
                cache: 0,
            }
        );
    }
}
