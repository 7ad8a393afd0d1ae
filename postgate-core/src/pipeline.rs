//! Per-request execution.
//!
//! A request moves through
//! `Resolved -> AuthChecked -> RateChecked -> CacheChecked -> Executed -> Responded`
//! and never back. Each stage either hands its result to the next one or
//! terminates with an envelope, in which case the pipeline skips straight to
//! `Responded`. Errors become envelopes in exactly one place, [`Pipeline::settle`].

use std::sync::Arc;

use tracing::{debug, error};

use crate::auth::{Authenticator, Caller};
use crate::cache::{CacheEntry, Fingerprint};
use crate::endpoint::{Call, Endpoint, RequestContext};
use crate::envelope::Envelope;
use crate::error::ApiError;
use crate::rate::RateCounter;
use crate::registry::EndpointRegistry;
use crate::response::{ApiResponse, CacheStatus};
use crate::services::Services;
use crate::token::TokenService;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Resolved,
    AuthChecked,
    RateChecked,
    CacheChecked,
    Executed,
    Responded,
}

/// Outcome of a stage.
#[derive(Debug)]
pub enum Flow<T> {
    Continue(T),
    Terminate(Envelope),
}

struct AuthChecked {
    caller: Caller,
}

struct RateChecked {
    caller: Caller,
    rate: RateCounter,
}

struct CacheChecked {
    caller: Caller,
    rate: RateCounter,
}

struct Executed {
    envelope: Envelope,
}

macro_rules! proceed {
    ($flow:expr) => {
        match $flow {
            Flow::Continue(next) => next,
            Flow::Terminate(envelope) => return Flow::Terminate(envelope),
        }
    };
}

pub struct Pipeline<'a> {
    services: &'a Services,
    registry: &'a EndpointRegistry,
    endpoint: Arc<dyn Endpoint>,
    request: RequestContext,
    tokens: TokenService,
    stage: Stage,
    rate: Option<RateCounter>,
    cache: Option<CacheEntry>,
    cache_status: CacheStatus,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        services: &'a Services,
        registry: &'a EndpointRegistry,
        endpoint: Arc<dyn Endpoint>,
        request: RequestContext,
    ) -> Self {
        let tokens = services.tokens(&request.tenant, &request.version);
        Self {
            services,
            registry,
            endpoint,
            request,
            tokens,
            stage: Stage::Resolved,
            rate: None,
            cache: None,
            cache_status: CacheStatus::Bypass,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Runs the request to completion. Always produces exactly one response.
    pub async fn run(mut self) -> ApiResponse {
        let envelope = match self.advance().await {
            Flow::Continue(executed) => executed.envelope,
            Flow::Terminate(envelope) => envelope,
        };
        self.respond(envelope).await
    }

    async fn advance(&mut self) -> Flow<Executed> {
        let step = self.authorize().await;
        let authorized = proceed!(self.settle(step, Stage::AuthChecked));

        let step = self.charge(authorized).await;
        let charged = proceed!(self.settle(step, Stage::RateChecked));
        self.rate = Some(charged.rate);

        let checked = proceed!(self.consult_cache(charged).await);

        let step = self.execute(checked).await;
        self.settle(step, Stage::Executed)
    }

    /// Moves to `stage` on success. On failure the error becomes the
    /// response envelope.
    fn settle<T>(&mut self, result: Result<T, ApiError>, stage: Stage) -> Flow<T> {
        match result {
            Ok(next) => {
                self.enter(stage);
                Flow::Continue(next)
            }
            Err(e) => {
                if let Some(counter) = e.rate_counter() {
                    self.rate = Some(counter);
                }
                match &e {
                    ApiError::Internal(_) => {
                        error!(endpoint = %self.request.endpoint, stage = ?self.stage, error = %e, "request failed")
                    }
                    _ => {
                        debug!(endpoint = %self.request.endpoint, stage = ?self.stage, error = %e, "request rejected")
                    }
                }
                Flow::Terminate(e.to_envelope())
            }
        }
    }

    fn enter(&mut self, stage: Stage) {
        debug_assert!(stage > self.stage, "pipeline cannot move back");
        debug!(endpoint = %self.request.endpoint, from = ?self.stage, to = ?stage, "pipeline transition");
        self.stage = stage;
    }

    async fn authorize(&self) -> Result<AuthChecked, ApiError> {
        self.endpoint.check(&self.request, self.services).await?;

        let auth = Authenticator::new(
            &self.request.tenant,
            &self.tokens,
            self.services.content.as_ref(),
        );
        let caller = self.endpoint.authenticate(&self.request, &auth).await?;
        if self.endpoint.descriptor().auth && !caller.is_authenticated() {
            return Err(ApiError::Unauthorized);
        }
        Ok(AuthChecked { caller })
    }

    async fn charge(&self, authorized: AuthChecked) -> Result<RateChecked, ApiError> {
        let AuthChecked { caller } = authorized;
        let identity = caller.rate_identity(&self.request.tenant);
        let rate = self
            .services
            .limiter(&self.request.tenant)
            .check(&identity, caller.rate_limit(), self.endpoint.descriptor().cost)
            .await?;
        Ok(RateChecked { caller, rate })
    }

    async fn consult_cache(&mut self, charged: RateChecked) -> Flow<CacheChecked> {
        let descriptor = self.endpoint.descriptor();
        let fingerprint = Fingerprint::new(
            &self.request.tenant.id,
            &descriptor.id,
            &self.request.params,
        );
        let entry = self
            .services
            .cache
            .entry(
                fingerprint,
                self.request.tenant.lifetimes.cache,
                descriptor.cacheable,
            )
            .await;

        self.cache_status = if entry.is_enabled() {
            CacheStatus::Miss
        } else {
            CacheStatus::Bypass
        };
        let cached = entry.read().await;
        self.cache = Some(entry);
        self.enter(Stage::CacheChecked);

        if !cached.is_cache_miss() {
            debug!(endpoint = %self.request.endpoint, "serving cached response");
            self.cache_status = CacheStatus::Hit;
            return Flow::Terminate(cached.served_from_cache());
        }

        let RateChecked { caller, rate } = charged;
        Flow::Continue(CacheChecked { caller, rate })
    }

    async fn execute(&self, checked: CacheChecked) -> Result<Executed, ApiError> {
        self.services.usage.record(&self.endpoint.descriptor().id);

        let call = Call {
            request: &self.request,
            caller: &checked.caller,
            rate: checked.rate,
            tokens: &self.tokens,
            services: self.services,
            registry: self.registry,
        };
        match self.endpoint.execute(&call).await? {
            Some(content) => Ok(Executed {
                envelope: Envelope::ok(content),
            }),
            None => Err(ApiError::NoContent),
        }
    }

    async fn respond(mut self, envelope: Envelope) -> ApiResponse {
        self.enter(Stage::Responded);

        if envelope.is_success() && !envelope.from_cache {
            if let Some(entry) = &self.cache {
                entry.write(&envelope).await;
            }
        }

        let mut response = ApiResponse::new(envelope, &self.request.version);
        if let Some(rate) = &self.rate {
            rate.apply_headers(&mut response.headers, self.services.clock.timestamp());
        }
        response
            .apply_cache_headers(
                self.cache_status,
                self.cache.as_ref(),
                self.request.if_modified_since,
            )
            .await;
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::endpoint::EndpointDescriptor;
    use crate::rate::{CounterStore, RateIdentity};
    use crate::registry::RegistryBuilder;
    use crate::services::testing::services;
    use crate::store::testing::FixtureStore;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    #[derive(Debug)]
    struct Closed {
        descriptor: EndpointDescriptor,
    }

    #[async_trait]
    impl Endpoint for Closed {
        fn descriptor(&self) -> &EndpointDescriptor {
            &self.descriptor
        }

        async fn check(&self, _request: &RequestContext, _services: &Services) -> Result<(), ApiError> {
            Err(ApiError::TemporarilyClosed)
        }

        async fn execute(&self, _call: &Call<'_>) -> Result<Option<Value>, ApiError> {
            panic!("closed endpoint must not execute");
        }
    }

    fn request(services: &Services, endpoint: &str) -> RequestContext {
        RequestContext {
            tenant: services.resolve_tenant(None).unwrap(),
            version: "v1".to_string(),
            endpoint: endpoint.to_string(),
            args: vec![],
            params: Default::default(),
            bearer: None,
            if_modified_since: None,
        }
    }

    #[tokio::test]
    async fn test_check_hook_runs_before_auth() {
        let clock = ManualClock::starting_now();
        let services = services(FixtureStore::default(), &clock, json!({}));
        let endpoint: Arc<dyn Endpoint> = Arc::new(Closed {
            descriptor: EndpointDescriptor::new("comment"),
        });
        let registry = RegistryBuilder::new().build("v1");

        let response = Pipeline::new(&services, &registry, endpoint, request(&services, "comment"))
            .run()
            .await;
        assert_eq!(response.envelope.code, 107);
        assert!(!response.headers.contains_key("x-ratelimit-limit"));
    }

    #[tokio::test]
    async fn test_failed_auth_does_not_charge() {
        let clock = ManualClock::starting_now();
        let services = services(FixtureStore::default(), &clock, json!({}));
        let registry = RegistryBuilder::new().build("v1");
        let user = registry.get("user").unwrap().clone();

        let response = Pipeline::new(&services, &registry, user, request(&services, "user"))
            .run()
            .await;
        assert_eq!(response.envelope.code, 109);
        let counters = services
            .counters
            .load(&RateIdentity::anonymous("blog").store_key())
            .await
            .unwrap();
        assert!(counters.is_none());
    }

    #[tokio::test]
    async fn test_stages_advance_in_order() {
        let clock = ManualClock::starting_now();
        let services = services(FixtureStore::default(), &clock, json!({}));
        let registry = RegistryBuilder::new().build("v1");
        let codes = registry.get("codes").unwrap().clone();
        let mut request = request(&services, "codes");
        request.params.insert("code".into(), "200".into());

        let mut pipeline = Pipeline::new(&services, &registry, codes, request);
        assert_eq!(pipeline.stage(), Stage::Resolved);
        // codes requires auth, so the pipeline stops after the first stage
        assert!(matches!(pipeline.advance().await, Flow::Terminate(_)));
        assert_eq!(pipeline.stage(), Stage::Resolved);
    }
}
