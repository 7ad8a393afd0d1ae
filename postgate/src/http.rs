use std::net::SocketAddr;

use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, IF_MODIFIED_SINCE},
    HeaderName, Method,
};
use postgate_core::response::API_VERSION_HEADER;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{api::router::ApiRoutes, app_state::SharedAppState};

pub async fn setup_http_server(
    app_state: SharedAppState,
    bind_address: &str,
    telemetry_enabled: bool,
) -> anyhow::Result<tokio::task::JoinHandle<anyhow::Result<()>>> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            AUTHORIZATION,
            ACCEPT,
            CONTENT_TYPE,
            IF_MODIFIED_SINCE,
            HeaderName::from_static(API_VERSION_HEADER),
        ]);

    let app = ApiRoutes::create(app_state.clone())?
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    #[cfg(feature = "telemetry")]
    let app = if telemetry_enabled {
        use axum_tracing_opentelemetry::middleware::{OtelAxumLayer, OtelInResponseLayer};
        app.layer(OtelInResponseLayer).layer(OtelAxumLayer::default())
    } else {
        app
    };
    #[cfg(not(feature = "telemetry"))]
    let _ = telemetry_enabled;

    info!("API server starting at {}", bind_address);
    let listener = tokio::net::TcpListener::bind(bind_address).await?;

    let stop_flag = app_state.stop_flag.clone();
    let handle = tokio::spawn(async move {
        info!("Starting HTTP server");
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            stop_flag.wait().await;
            info!("Stop flag was set, shutting down HTTP server gracefully");
        })
        .await?;
        info!("HTTP server is down");
        Ok(())
    });

    Ok(handle)
}
