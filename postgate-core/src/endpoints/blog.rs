use async_trait::async_trait;
use serde_json::{json, Value};

use crate::clock::format_time;
use crate::endpoint::{Call, Endpoint, EndpointDescriptor};
use crate::error::ApiError;

/// Public information about the tenant's blog.
#[derive(Debug)]
pub struct BlogEndpoint {
    descriptor: EndpointDescriptor,
}

impl BlogEndpoint {
    pub const ID: &'static str = "blog";

    pub fn new() -> Self {
        Self {
            descriptor: EndpointDescriptor::new(Self::ID).public(),
        }
    }
}

impl Default for BlogEndpoint {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Endpoint for BlogEndpoint {
    fn descriptor(&self) -> &EndpointDescriptor {
        &self.descriptor
    }

    async fn execute(&self, call: &Call<'_>) -> Result<Option<Value>, ApiError> {
        let tenant = &call.request.tenant.id;
        let Some(info) = call.services.content.tenant_info(tenant).await? else {
            return Err(ApiError::NotFound);
        };

        Ok(Some(json!({
            "name": info.name,
            "url": info.url,
            "description": info.description,
            "update": info.updated_at.map(|d| format_time(d.timestamp())).unwrap_or_default(),
            "nb_posts": info.post_count,
        })))
    }
}
