use std::collections::BTreeMap;
use std::sync::Arc;

use axum::http::header::{AUTHORIZATION, HOST, IF_MODIFIED_SINCE};
use axum::http::HeaderMap;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::clock::parse_http_date;
use crate::endpoint::{Endpoint, RequestContext, CURRENT_VERSION};
use crate::error::ApiError;
use crate::pipeline::Pipeline;
use crate::registry::{EndpointRegistry, RegistryBuilder};
use crate::response::{ApiResponse, API_VERSION_HEADER};
use crate::services::Services;

/// Versions this server speaks.
pub const SUPPORTED_VERSIONS: &[&str] = &[CURRENT_VERSION];

/// An inbound call as the HTTP layer hands it over.
#[derive(Debug, Clone, Default)]
pub struct ApiRequest {
    /// Path below the API root, e.g. `/post/42/`.
    pub path: String,
    pub headers: HeaderMap,
    /// Body parameters, unvalidated.
    pub params: BTreeMap<String, Value>,
}

/// Splits `/<endpoint>/<arg>...` into the endpoint id and its arguments.
/// One leading and one trailing slash are ignored. Segments are
/// percent-decoded after splitting, so `%2F` stays inside its segment.
pub fn parse_path(path: &str) -> (String, Vec<String>) {
    let path = path.strip_prefix('/').unwrap_or(path);
    let path = path.strip_suffix('/').unwrap_or(path);
    let mut segments = path.split('/').map(decode_segment);
    let endpoint = segments.next().unwrap_or_default();
    (endpoint, segments.collect())
}

fn decode_segment(segment: &str) -> String {
    match urlencoding::decode(segment) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => segment.to_string(),
    }
}

/// Requested protocol version, defaulting to the current one.
pub fn resolve_version(headers: &HeaderMap) -> String {
    headers
        .get(API_VERSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(CURRENT_VERSION)
        .to_string()
}

#[derive(Debug, Clone)]
pub struct Dispatcher {
    services: Arc<Services>,
    registries: BTreeMap<String, EndpointRegistry>,
}

impl Dispatcher {
    pub fn new(services: Arc<Services>, builder: &RegistryBuilder) -> Self {
        let registries = SUPPORTED_VERSIONS
            .iter()
            .map(|version| (version.to_string(), builder.build(version)))
            .collect();
        Self {
            services,
            registries,
        }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn registry(&self, version: &str) -> Option<&EndpointRegistry> {
        self.registries.get(version)
    }

    #[instrument(skip_all, fields(path = %request.path))]
    pub async fn dispatch(&self, request: ApiRequest) -> ApiResponse {
        let version = resolve_version(&request.headers);
        match self.bind(&request, &version) {
            Ok((registry, endpoint, context)) => {
                Pipeline::new(&self.services, registry, endpoint, context)
                    .run()
                    .await
            }
            Err(e) => {
                debug!(error = %e, "request could not be bound to an endpoint");
                ApiResponse::failure(&e, &version)
            }
        }
    }

    fn bind(
        &self,
        request: &ApiRequest,
        version: &str,
    ) -> Result<(&EndpointRegistry, Arc<dyn Endpoint>, RequestContext), ApiError> {
        let header = |name| request.headers.get(name).and_then(|v| v.to_str().ok());

        let tenant = self.services.resolve_tenant(header(HOST))?;
        let registry = self
            .registries
            .get(version)
            .ok_or_else(|| ApiError::UnsupportedVersion(version.to_string()))?;

        let (id, args) = parse_path(&request.path);
        let endpoint = registry
            .get(&id)
            .cloned()
            .ok_or_else(|| ApiError::MethodNotAllowed(id.clone()))?;
        let params = endpoint.descriptor().filter_params(&request.params)?;

        let context = RequestContext {
            tenant,
            version: version.to_string(),
            endpoint: id,
            args,
            params,
            bearer: header(AUTHORIZATION).map(str::to_string),
            if_modified_since: header(IF_MODIFIED_SINCE).and_then(parse_http_date),
        };
        Ok((registry, endpoint, context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::endpoint::{Call, EndpointDescriptor};
    use crate::rate::{RETRY_AFTER_HEADER, REMAINING_HEADER};
    use crate::response::CACHE_STATUS_HEADER;
    use crate::services::testing::services;
    use crate::store::testing::{tenant, user, FixtureStore};
    use crate::store::UserRecord;
    use async_trait::async_trait;
    use axum::http::{HeaderName, HeaderValue, StatusCode};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Public, cacheable endpoint counting its executions.
    #[derive(Debug)]
    struct Counting {
        descriptor: EndpointDescriptor,
        runs: AtomicUsize,
    }

    impl Counting {
        fn new(descriptor: EndpointDescriptor) -> Arc<Self> {
            Arc::new(Self {
                descriptor,
                runs: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Endpoint for Counting {
        fn descriptor(&self) -> &EndpointDescriptor {
            &self.descriptor
        }

        async fn execute(&self, call: &Call<'_>) -> Result<Option<Value>, ApiError> {
            let run = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
            match call.request.arg(0) {
                "" => Ok(None),
                arg => Ok(Some(json!({"arg": arg, "run": run}))),
            }
        }
    }

    fn store() -> FixtureStore {
        FixtureStore::default()
            .with_user("secret", user("alice", "blog"))
            .with_user(
                "secret",
                UserRecord {
                    rate_limit: Some(2),
                    ..user("bob", "blog")
                },
            )
            .with_tenant(tenant("blog"))
    }

    fn get(path: &str) -> ApiRequest {
        ApiRequest {
            path: path.to_string(),
            ..Default::default()
        }
    }

    fn post(path: &str, params: Value) -> ApiRequest {
        ApiRequest {
            path: path.to_string(),
            params: serde_json::from_value(params).unwrap(),
            ..Default::default()
        }
    }

    fn with_bearer(mut request: ApiRequest, token: &str) -> ApiRequest {
        request.headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        request
    }

    async fn login(dispatcher: &Dispatcher, username: &str) -> String {
        let response = dispatcher
            .dispatch(post("/auth", json!({"username": username, "password": "secret"})))
            .await;
        assert_eq!(response.envelope.code, 200, "{:?}", response.envelope);
        response.envelope.content["token"]
            .as_str()
            .unwrap()
            .to_string()
    }

    #[test]
    fn test_parse_path() {
        assert_eq!(parse_path("/post/42/"), ("post".to_string(), vec!["42".to_string()]));
        assert_eq!(parse_path("blog"), ("blog".to_string(), vec![]));
        assert_eq!(parse_path("/"), (String::new(), vec![]));
        assert_eq!(
            parse_path("//a//"),
            (String::new(), vec!["a".to_string(), String::new()])
        );
    }

    #[test]
    fn test_parse_path_decodes_segments() {
        assert_eq!(
            parse_path("/user/a%20b"),
            ("user".to_string(), vec!["a b".to_string()])
        );
        assert_eq!(
            parse_path("/post/a%2Fb/c"),
            ("post".to_string(), vec!["a/b".to_string(), "c".to_string()])
        );
        // invalid UTF-8 is kept as sent
        assert_eq!(parse_path("/post/%FF").1, vec!["%FF".to_string()]);
    }

    #[test]
    fn test_resolve_version() {
        let mut headers = HeaderMap::new();
        assert_eq!(resolve_version(&headers), "v1");
        headers.insert(
            HeaderName::from_bytes(b"X-API-Version").unwrap(),
            HeaderValue::from_static("v2"),
        );
        assert_eq!(resolve_version(&headers), "v2");
    }

    #[tokio::test]
    async fn test_unauthenticated_call_is_unauthorized() {
        let clock = ManualClock::starting_now();
        let dispatcher = Dispatcher::new(
            Arc::new(services(store(), &clock, json!({}))),
            &RegistryBuilder::new(),
        );

        let response = dispatcher.dispatch(get("/user")).await;
        assert_eq!(response.envelope.code, 109);
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_login_then_profile() {
        let clock = ManualClock::starting_now();
        let dispatcher = Dispatcher::new(
            Arc::new(services(store(), &clock, json!({"rate_limit": 10}))),
            &RegistryBuilder::new(),
        );

        let token = login(&dispatcher, "alice").await;
        let response = dispatcher.dispatch(with_bearer(get("/user"), &token)).await;
        assert_eq!(response.envelope.code, 200);
        assert_eq!(response.envelope.content["name"], "alice display");
        assert_eq!(response.envelope.content["rate_limit"], 10);
        // login is free, the profile call costs one
        assert_eq!(response.envelope.content["rate_remain"], 9);
        assert_eq!(response.headers[REMAINING_HEADER], "9");
    }

    #[tokio::test]
    async fn test_wrong_password_is_unauthorized() {
        let clock = ManualClock::starting_now();
        let dispatcher = Dispatcher::new(
            Arc::new(services(store(), &clock, json!({}))),
            &RegistryBuilder::new(),
        );

        let response = dispatcher
            .dispatch(post("/auth", json!({"username": "alice", "password": "nope"})))
            .await;
        assert_eq!(response.envelope.code, 109);
    }

    #[tokio::test]
    async fn test_missing_username_is_missing_parameter() {
        let clock = ManualClock::starting_now();
        let dispatcher = Dispatcher::new(
            Arc::new(services(store(), &clock, json!({}))),
            &RegistryBuilder::new(),
        );

        let response = dispatcher
            .dispatch(post("/auth", json!({"password": "secret"})))
            .await;
        assert_eq!(response.envelope.code, 104);
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_exhausted_budget_reports_retry_after() {
        let clock = ManualClock::starting_now();
        let dispatcher = Dispatcher::new(
            Arc::new(services(store(), &clock, json!({}))),
            &RegistryBuilder::new(),
        );
        let token = login(&dispatcher, "bob").await;

        for _ in 0..2 {
            let response = dispatcher.dispatch(with_bearer(get("/user"), &token)).await;
            assert_eq!(response.envelope.code, 200);
        }
        let response = dispatcher.dispatch(with_bearer(get("/user"), &token)).await;
        assert_eq!(response.envelope.code, 429);
        assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers[REMAINING_HEADER], "0");
        let retry: i64 = response.headers[RETRY_AFTER_HEADER]
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!(retry > 0 && retry <= 3600);
    }

    #[tokio::test]
    async fn test_unknown_endpoint_and_version() {
        let clock = ManualClock::starting_now();
        let dispatcher = Dispatcher::new(
            Arc::new(services(store(), &clock, json!({}))),
            &RegistryBuilder::new(),
        );

        assert_eq!(dispatcher.dispatch(get("/nope")).await.envelope.code, 102);
        assert_eq!(dispatcher.dispatch(get("/")).await.envelope.code, 102);

        let mut request = get("/blog");
        request
            .headers
            .insert(API_VERSION_HEADER, HeaderValue::from_static("v9"));
        let response = dispatcher.dispatch(request).await;
        assert_eq!(response.envelope.code, 103);
        assert_eq!(response.headers[API_VERSION_HEADER], "v9");
    }

    #[tokio::test]
    async fn test_disabled_tenant() {
        let clock = ManualClock::starting_now();
        let dispatcher = Dispatcher::new(
            Arc::new(services(store(), &clock, json!({}))),
            &RegistryBuilder::new(),
        );
        let mut request = get("/blog");
        request
            .headers
            .insert(HOST, HeaderValue::from_static("closed.example.org"));
        // tenant is checked before the version
        request
            .headers
            .insert(API_VERSION_HEADER, HeaderValue::from_static("v9"));

        let response = dispatcher.dispatch(request).await;
        assert_eq!(response.envelope.code, 101);
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_handler() {
        let dir = TempDir::new().unwrap();
        let clock = ManualClock::starting_now();
        let services = services(
            store(),
            &clock,
            json!({"cache_root": dir.path(), "rate_limit": 100}),
        );
        let counting = Counting::new(EndpointDescriptor::new("post").public());
        let dispatcher = Dispatcher::new(
            Arc::new(services),
            &RegistryBuilder::new().contribute(counting.clone()),
        );

        let first = dispatcher.dispatch(get("/post/42")).await;
        assert_eq!(first.headers[CACHE_STATUS_HEADER], "MISS");
        assert!(!first.envelope.from_cache);

        let second = dispatcher.dispatch(get("/post/42")).await;
        assert_eq!(second.headers[CACHE_STATUS_HEADER], "HIT");
        assert!(second.envelope.from_cache);
        assert_eq!(second.envelope.content, first.envelope.content);
        assert_eq!(counting.runs.load(Ordering::SeqCst), 1);
        assert!(second.headers["cache-control"]
            .to_str()
            .unwrap()
            .starts_with("public, max-age="));

        // the cache hit still went through the rate check
        assert_eq!(second.headers[REMAINING_HEADER], "98");
        // usage only counts handler runs
        assert_eq!(dispatcher.services().usage.get("post"), 1);
    }

    #[tokio::test]
    async fn test_zero_ttl_bypasses_cache() {
        let dir = TempDir::new().unwrap();
        let clock = ManualClock::starting_now();
        let services = services(
            store(),
            &clock,
            json!({"cache_root": dir.path(), "cache_lifetime": 0}),
        );
        let counting = Counting::new(EndpointDescriptor::new("post").public());
        let dispatcher = Dispatcher::new(
            Arc::new(services),
            &RegistryBuilder::new().contribute(counting.clone()),
        );

        for _ in 0..3 {
            let response = dispatcher.dispatch(get("/post/42")).await;
            assert_eq!(response.headers[CACHE_STATUS_HEADER], "BYPASS");
            assert!(!response.envelope.from_cache);
        }
        assert_eq!(counting.runs.load(Ordering::SeqCst), 3);
        assert!(!dir.path().join("api").exists());
    }

    #[tokio::test]
    async fn test_failed_handler_is_not_cached() {
        let dir = TempDir::new().unwrap();
        let clock = ManualClock::starting_now();
        let services = services(store(), &clock, json!({"cache_root": dir.path()}));
        let counting = Counting::new(EndpointDescriptor::new("post").public());
        let dispatcher = Dispatcher::new(
            Arc::new(services),
            &RegistryBuilder::new().contribute(counting.clone()),
        );

        // no argument: the handler has nothing to say
        let response = dispatcher.dispatch(get("/post")).await;
        assert_eq!(response.envelope.code, 105);
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        dispatcher.dispatch(get("/post")).await;
        assert_eq!(counting.runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_contribution_cannot_shadow_builtin() {
        let clock = ManualClock::starting_now();
        let shadow = Counting::new(EndpointDescriptor::new("blog").public());
        let dispatcher = Dispatcher::new(
            Arc::new(services(store(), &clock, json!({}))),
            &RegistryBuilder::new().contribute(shadow.clone()),
        );

        let response = dispatcher.dispatch(get("/blog")).await;
        assert_eq!(response.envelope.code, 200);
        assert_eq!(response.envelope.content["name"], "My blog");
        assert_eq!(response.envelope.content["nb_posts"], 3);
        assert_eq!(shadow.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_codes_and_endpoints_listing() {
        let clock = ManualClock::starting_now();
        let dispatcher = Dispatcher::new(
            Arc::new(services(store(), &clock, json!({}))),
            &RegistryBuilder::new(),
        );
        let token = login(&dispatcher, "alice").await;

        let response = dispatcher
            .dispatch(with_bearer(post("/codes", json!({"code": "429"})), &token))
            .await;
        assert_eq!(
            response.envelope.content,
            json!({"message": "API rate limit reached", "code": "429"})
        );

        let response = dispatcher
            .dispatch(with_bearer(get("/codes"), &token))
            .await;
        assert_eq!(response.envelope.content["106"], "Not found");
        assert!(response.envelope.content.get("110").is_none());

        let response = dispatcher
            .dispatch(with_bearer(get("/endpoints"), &token))
            .await;
        assert_eq!(
            response.envelope.content["auth"],
            json!({"password": true, "username": true})
        );
        assert_eq!(response.envelope.content["codes"], json!({"code": false}));
    }
}
