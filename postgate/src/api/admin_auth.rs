use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::Response,
};
use secrecy::ExposeSecret;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use crate::app_state::SharedAppState;

/// Lets a request through only when it carries the master key as bearer token.
pub async fn require_master_key(
    State(state): State<SharedAppState>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let presented = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .map(|header| header.strip_prefix("Bearer ").unwrap_or(header));

    let Some(presented) = presented else {
        warn!(method = %req.method(), uri = %req.uri(), "missing Authorization header on admin route");
        return Err(StatusCode::UNAUTHORIZED);
    };

    let expected = state.settings.api.master_key.expose_secret();
    if !bool::from(presented.as_bytes().ct_eq(expected.as_bytes())) {
        warn!(method = %req.method(), uri = %req.uri(), "wrong master key on admin route");
        return Err(StatusCode::UNAUTHORIZED);
    }

    debug!(uri = %req.uri(), "admin request authorized");
    Ok(next.run(req).await)
}
