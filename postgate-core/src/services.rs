use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::cache::ResponseCache;
use crate::clock::SharedClock;
use crate::error::ApiError;
use crate::rate::{CounterStore, MemoryCounterStore, RateIdentity, RateLimiter};
use crate::settings::api_server::{ApiServer, TenantSettings};
use crate::settings::lifetimes::Lifetimes;
use crate::store::ContentStore;
use crate::token::{TokenKeys, TokenService};
use crate::usage::UsageCounters;

/// The tenant a request is served for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tenant {
    pub id: String,
    pub lifetimes: Lifetimes,
}

/// Collaborators shared by every request.
#[derive(Debug, Clone)]
pub struct Services {
    pub api: ApiServer,
    pub tenants: BTreeMap<String, TenantSettings>,
    pub content: Arc<dyn ContentStore>,
    pub counters: Arc<dyn CounterStore>,
    pub cache: ResponseCache,
    pub usage: Arc<UsageCounters>,
    pub clock: SharedClock,
}

impl Services {
    pub fn new(
        api: ApiServer,
        tenants: BTreeMap<String, TenantSettings>,
        content: Arc<dyn ContentStore>,
        clock: SharedClock,
    ) -> Self {
        let cache = ResponseCache::new(api.cache_root.clone(), clock.clone());
        Self {
            api,
            tenants,
            content,
            counters: Arc::new(MemoryCounterStore::new()),
            cache,
            usage: Arc::new(UsageCounters::new(clock.clone())),
            clock,
        }
    }

    /// Picks the tenant serving `host`, falling back to the default tenant.
    /// Unknown and deactivated tenants are reported as down.
    pub fn resolve_tenant(&self, host: Option<&str>) -> Result<Tenant, ApiError> {
        let host = host.map(strip_port);
        let id = host
            .and_then(|host| {
                self.tenants
                    .iter()
                    .find(|(_, settings)| settings.serves_host(host))
                    .map(|(id, _)| id.as_str())
            })
            .unwrap_or(self.api.default_tenant.as_str());

        let Some(settings) = self.tenants.get(id) else {
            debug!(tenant = id, "no settings for tenant");
            return Err(ApiError::ServiceDisabled);
        };
        if !settings.active {
            debug!(tenant = id, "api is disabled for tenant");
            return Err(ApiError::ServiceDisabled);
        }

        Ok(Tenant {
            id: id.to_string(),
            lifetimes: Lifetimes::resolve(&self.api, settings),
        })
    }

    pub fn tokens(&self, tenant: &Tenant, version: &str) -> TokenService {
        let keys = Arc::new(TokenKeys::new(&self.api.master_key, version));
        TokenService::new(keys, tenant.lifetimes.token, self.clock.clone())
    }

    pub fn limiter(&self, tenant: &Tenant) -> RateLimiter {
        RateLimiter::new(
            self.counters.clone(),
            self.clock.clone(),
            self.api.rate_limit,
            tenant.lifetimes.rate,
        )
    }

    /// Drops the budget of `identity`, so its next call opens a fresh window.
    pub async fn reset_rate(&self, identity: &RateIdentity) -> Result<(), ApiError> {
        self.counters.remove(&identity.store_key()).await?;
        debug!(identity = %identity, "rate budget reset");
        Ok(())
    }
}

fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        // [::1]:8080
        return host.split_once(']').map_or(host, |(addr, _)| &host[..=addr.len()]);
    }
    host.rsplit_once(':').map_or(host, |(name, _)| name)
}
