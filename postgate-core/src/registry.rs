use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::endpoint::Endpoint;
use crate::endpoints;
use crate::profile::ProfileContributor;

/// Endpoints resolvable for one API version.
#[derive(Debug, Clone)]
pub struct EndpointRegistry {
    version: String,
    endpoints: BTreeMap<String, Arc<dyn Endpoint>>,
    profile_contributors: Vec<Arc<dyn ProfileContributor>>,
}

impl EndpointRegistry {
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn get(&self, id: &str) -> Option<&Arc<dyn Endpoint>> {
        self.endpoints.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Endpoint>> {
        self.endpoints.values()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn profile_contributors(&self) -> &[Arc<dyn ProfileContributor>] {
        &self.profile_contributors
    }
}

/// Collects contributed endpoints in registration order.
///
/// Built-in endpoints always come first. A contribution is taken only if it
/// supports the version being built and its id is still free, so the first
/// registrant of an id wins and nothing is ever replaced.
#[derive(Debug, Default, Clone)]
pub struct RegistryBuilder {
    contributions: Vec<Arc<dyn Endpoint>>,
    profile_contributors: Vec<Arc<dyn ProfileContributor>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contribute(mut self, endpoint: Arc<dyn Endpoint>) -> Self {
        self.contributions.push(endpoint);
        self
    }

    /// Adds keys to the profile answered by `user` and `auth`.
    pub fn profile_contributor(mut self, contributor: Arc<dyn ProfileContributor>) -> Self {
        self.profile_contributors.push(contributor);
        self
    }

    pub fn build(&self, version: &str) -> EndpointRegistry {
        let mut registry = EndpointRegistry {
            version: version.to_string(),
            endpoints: BTreeMap::new(),
            profile_contributors: self.profile_contributors.clone(),
        };
        for endpoint in endpoints::builtins() {
            registry
                .endpoints
                .insert(endpoint.descriptor().id.clone(), endpoint);
        }

        for endpoint in &self.contributions {
            let descriptor = endpoint.descriptor();
            if !descriptor.supports(version) {
                debug!(endpoint = %descriptor.id, version, "contributed endpoint does not support version");
                continue;
            }
            if registry.endpoints.contains_key(&descriptor.id) {
                warn!(endpoint = %descriptor.id, "endpoint id already registered, ignoring contribution");
                continue;
            }
            registry
                .endpoints
                .insert(descriptor.id.clone(), endpoint.clone());
        }
        registry
    }
}
