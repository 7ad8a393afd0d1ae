use std::collections::BTreeMap;

use axum::{
    extract::{FromRequest, Request, State},
    http::{header::CONTENT_TYPE, Method},
    response::IntoResponse,
    Form, Json,
};
use postgate_core::envelope::WireEnvelope;
use postgate_core::ApiRequest;
use serde_json::Value;
use tracing::debug;

use crate::app_state::SharedAppState;

#[utoipa::path(
    post,
    path = "/api/{endpoint}",
    params(
        ("endpoint" = String, Path, description = "Endpoint id, followed by optional path arguments"),
        ("X-API-Version" = Option<String>, Header, description = "Protocol version, defaults to v1"),
    ),
    responses(
    (status = 200, description = "Call succeeded", body = WireEnvelope),
    (status = 401, description = "Caller may not use this endpoint", body = WireEnvelope),
    (status = 429, description = "Call budget exhausted", body = WireEnvelope),
    ),
    security(
        (),
        ("bearerAuth" = [])
    )
)]
pub async fn dispatch_handler(
    State(state): State<SharedAppState>,
    request: Request,
) -> impl IntoResponse {
    let path = request.uri().path();
    let path = path.strip_prefix("/api").unwrap_or(path).to_string();
    let headers = request.headers().clone();

    let params = if request.method() == Method::POST {
        read_params(request).await
    } else {
        BTreeMap::new()
    };

    state
        .dispatcher
        .dispatch(ApiRequest {
            path,
            headers,
            params,
        })
        .await
}

/// Reads call parameters from a JSON object or an urlencoded form.
/// Anything else yields no parameters.
pub async fn read_params(request: Request) -> BTreeMap<String, Value> {
    let is_json = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"));

    if is_json {
        return match Json::<BTreeMap<String, Value>>::from_request(request, &()).await {
            Ok(Json(params)) => params,
            Err(e) => {
                debug!(error = %e, "ignoring malformed JSON body");
                BTreeMap::new()
            }
        };
    }

    match Form::<BTreeMap<String, String>>::from_request(request, &()).await {
        Ok(Form(params)) => params
            .into_iter()
            .map(|(key, value)| (key, Value::String(value)))
            .collect(),
        Err(e) => {
            debug!(error = %e, "ignoring unreadable form body");
            BTreeMap::new()
        }
    }
}
