//! Operator routes, guarded by the master key.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use postgate_core::rate::RateIdentity;
use postgate_core::usage::UsageReport;
use serde_json::{json, Value};
use tracing::info;

use crate::app_state::SharedAppState;

type AdminError = (StatusCode, Json<Value>);

fn admin_error(status: StatusCode, message: String) -> AdminError {
    (status, Json(json!({"status": "error", "message": message})))
}

#[utoipa::path(
    get,
    path = "/admin/usage",
    tag = "admin",
    responses(
    (status = 200, description = "Calls per endpoint since the last clear", body = UsageReport),
    (status = 401, description = "Master key missing or wrong")
    ),
    security(("bearerAuth" = []))
)]
pub async fn usage_handler(State(state): State<SharedAppState>) -> Json<UsageReport> {
    Json(state.dispatcher.services().usage.report())
}

#[utoipa::path(
    delete,
    path = "/admin/usage",
    tag = "admin",
    responses(
    (status = 204, description = "Usage counters cleared"),
    (status = 401, description = "Master key missing or wrong")
    ),
    security(("bearerAuth" = []))
)]
pub async fn clear_usage_handler(State(state): State<SharedAppState>) -> StatusCode {
    state.dispatcher.services().usage.clear();
    info!("usage counters cleared");
    StatusCode::NO_CONTENT
}

#[utoipa::path(
    post,
    path = "/admin/rate/{identity}/reset",
    tag = "admin",
    params(
        ("identity" = String, Path, description = "`anonymous:<tenant>` or `user:<id>`")
    ),
    responses(
    (status = 204, description = "Budget reset, the next call opens a fresh window"),
    (status = 400, description = "Unknown identity format"),
    (status = 401, description = "Master key missing or wrong")
    ),
    security(("bearerAuth" = []))
)]
pub async fn reset_rate_handler(
    State(state): State<SharedAppState>,
    Path(identity): Path<String>,
) -> Result<StatusCode, AdminError> {
    let Some(identity) = RateIdentity::parse(&identity) else {
        return Err(admin_error(
            StatusCode::BAD_REQUEST,
            format!("unknown rate identity '{identity}'"),
        ));
    };

    state
        .dispatcher
        .services()
        .reset_rate(&identity)
        .await
        .map_err(|e| admin_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    info!(identity = %identity, "rate budget reset by operator");
    Ok(StatusCode::NO_CONTENT)
}
