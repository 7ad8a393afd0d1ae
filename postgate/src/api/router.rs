use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use postgate_core::envelope::WireEnvelope;
use postgate_core::usage::{UsageEntry, UsageReport};
use tracing::info;
use utoipa::openapi::security::SecurityScheme;
use utoipa::Modify;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::admin_auth::require_master_key;
use crate::api::handlers::admin::__path_clear_usage_handler;
use crate::api::handlers::admin::__path_reset_rate_handler;
use crate::api::handlers::admin::__path_usage_handler;
use crate::api::handlers::admin::{clear_usage_handler, reset_rate_handler, usage_handler};
use crate::api::handlers::dispatch::__path_dispatch_handler;
use crate::api::handlers::dispatch::dispatch_handler;
use crate::api::handlers::health::__path_health_checker_handler;
use crate::api::handlers::health::health_checker_handler;
use crate::api::rate_limiting::create_flood_limiter;
use crate::app_state::SharedAppState;

#[derive(OpenApi)]
#[openapi(
    paths(
        health_checker_handler,
        dispatch_handler,
        usage_handler,
        clear_usage_handler,
        reset_rate_handler,
    ),
    components(
        schemas(WireEnvelope, UsageReport, UsageEntry)
    ),
    tags(
        (name = "postgate", description = "blog public API"),
        (name = "admin", description = "operator routes, require the master key")
    ),
    modifiers(&SecurityAddon)
)]
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearerAuth",
                SecurityScheme::Http(utoipa::openapi::security::Http::new(
                    utoipa::openapi::security::HttpAuthScheme::Bearer,
                )),
            )
        }
    }
}

pub struct ApiDoc;

impl utoipa::OpenApi for ApiDoc {
    fn openapi() -> utoipa::openapi::OpenApi {
        SecurityAddon::openapi()
    }
}

pub struct ApiRoutes;

impl ApiRoutes {
    pub fn create(state: SharedAppState) -> anyhow::Result<Router> {
        let api = ApiDoc::openapi();

        let mut api_router = Router::new()
            .route("/api", get(dispatch_handler).post(dispatch_handler))
            .route("/api/{*path}", get(dispatch_handler).post(dispatch_handler));

        if let Some(limiter) = create_flood_limiter(&state.settings.api.flood_protection)? {
            info!(
                requests_per_minute = state.settings.api.flood_protection.requests_per_minute,
                "flood protection enabled"
            );
            api_router = api_router.layer(limiter);
        }

        let admin_router = Router::new()
            .route("/admin/usage", get(usage_handler).delete(clear_usage_handler))
            .route("/admin/rate/{identity}/reset", post(reset_rate_handler))
            .route_layer(middleware::from_fn_with_state(
                state.clone(),
                require_master_key,
            ));

        let public_router = Router::new()
            .route("/health", get(health_checker_handler))
            .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", api));

        Ok(Router::new()
            .merge(api_router)
            .merge(admin_router)
            .merge(public_router)
            .with_state(state))
    }
}
