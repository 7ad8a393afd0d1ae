use async_trait::async_trait;
use serde_json::Value;

use super::user::profile;
use crate::auth::{Authenticator, Caller};
use crate::endpoint::{Call, Endpoint, EndpointDescriptor, RequestContext};
use crate::error::ApiError;

/// Exchanges a username and password for a token.
///
/// Answers with the same profile as `user`, so a client gets its token and
/// its current budget in one call. Logging in is free.
#[derive(Debug)]
pub struct AuthEndpoint {
    descriptor: EndpointDescriptor,
}

impl AuthEndpoint {
    pub const ID: &'static str = "auth";

    pub fn new() -> Self {
        Self {
            descriptor: EndpointDescriptor::new(Self::ID)
                .required("username")
                .required("password")
                .cost(0)
                .uncached(),
        }
    }
}

impl Default for AuthEndpoint {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Endpoint for AuthEndpoint {
    fn descriptor(&self) -> &EndpointDescriptor {
        &self.descriptor
    }

    async fn authenticate(
        &self,
        request: &RequestContext,
        auth: &Authenticator<'_>,
    ) -> Result<Caller, ApiError> {
        auth.login(request.param("username"), request.param("password"))
            .await
    }

    async fn execute(&self, call: &Call<'_>) -> Result<Option<Value>, ApiError> {
        profile(call).await.map(Some)
    }
}
