use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::clock::format_time;
use crate::endpoint::{Call, Endpoint, EndpointDescriptor};
use crate::error::ApiError;

/// Profile of the calling user, including a freshly encoded token.
#[derive(Debug)]
pub struct UserEndpoint {
    descriptor: EndpointDescriptor,
}

impl UserEndpoint {
    pub const ID: &'static str = "user";

    pub fn new() -> Self {
        Self {
            descriptor: EndpointDescriptor::new(Self::ID).uncached(),
        }
    }
}

impl Default for UserEndpoint {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) async fn profile(call: &Call<'_>) -> Result<Value, ApiError> {
    let Some(user) = call.caller.user.as_ref() else {
        return Err(ApiError::Unauthorized);
    };
    let token = &call.caller.token;

    let mut content = Map::new();
    content.insert("name".into(), json!(user.display_name));
    content.insert("token".into(), json!(call.tokens.encode(token)?));
    content.insert("token_reset".into(), json!(format_time(token.expires_at)));
    content.insert("rate_limit".into(), json!(call.rate.limit));
    content.insert("rate_remain".into(), json!(call.rate.remaining));
    content.insert("rate_reset".into(), json!(call.rate.reset_date()));

    crate::profile::extend(call, user, &mut content).await;
    Ok(Value::Object(content))
}

#[async_trait]
impl Endpoint for UserEndpoint {
    fn descriptor(&self) -> &EndpointDescriptor {
        &self.descriptor
    }

    async fn execute(&self, call: &Call<'_>) -> Result<Option<Value>, ApiError> {
        profile(call).await.map(Some)
    }
}
