use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::endpoint::{Call, Endpoint, EndpointDescriptor};
use crate::error::ApiError;

/// Lists the endpoints of the requested version with their fields.
#[derive(Debug)]
pub struct EndpointsEndpoint {
    descriptor: EndpointDescriptor,
}

impl EndpointsEndpoint {
    pub const ID: &'static str = "endpoints";

    pub fn new() -> Self {
        Self {
            descriptor: EndpointDescriptor::new(Self::ID).cost(0),
        }
    }
}

impl Default for EndpointsEndpoint {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Endpoint for EndpointsEndpoint {
    fn descriptor(&self) -> &EndpointDescriptor {
        &self.descriptor
    }

    async fn execute(&self, call: &Call<'_>) -> Result<Option<Value>, ApiError> {
        let mut listing = Map::new();
        for endpoint in call.registry.iter() {
            let descriptor = endpoint.descriptor();
            let fields = serde_json::to_value(&descriptor.fields)
                .map_err(|e| ApiError::Internal(e.to_string()))?;
            listing.insert(descriptor.id.clone(), fields);
        }
        Ok(Some(Value::Object(listing)))
    }
}
