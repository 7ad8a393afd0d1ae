use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE, LAST_MODIFIED};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use tracing::{error, warn};

use crate::cache::CacheEntry;
use crate::clock::format_http_date;
use crate::endpoint::CURRENT_VERSION;
use crate::envelope::Envelope;
use crate::error::ApiError;

pub const API_VERSION_HEADER: &str = "x-api-version";
pub const API_SERVER_HEADER: &str = "x-api-server";
pub const CACHE_STATUS_HEADER: &str = "x-cache";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Served from a stored entry.
    Hit,
    /// The cache was consulted and had nothing.
    Miss,
    /// The cache is off for this request.
    Bypass,
}

impl CacheStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
            CacheStatus::Bypass => "BYPASS",
        }
    }
}

/// A finished API call: transport status, side-channel headers and envelope.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub envelope: Envelope,
}

impl ApiResponse {
    /// Response for `envelope` carrying the protocol headers.
    pub fn new(envelope: Envelope, version: &str) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        insert(
            &mut headers,
            API_SERVER_HEADER,
            &format!("postgate/{CURRENT_VERSION}"),
        );
        insert(&mut headers, API_VERSION_HEADER, version);

        Self {
            status: envelope.api_code().http_status(),
            headers,
            envelope,
        }
    }

    /// Response for a request that failed before reaching an endpoint.
    pub fn failure(error: &ApiError, version: &str) -> Self {
        let mut response = Self::new(error.to_envelope(), version);
        response
            .headers
            .insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        response
    }

    /// Sets the cache headers for a finished call. A successful response
    /// whose stored entry is no newer than `if_modified_since` becomes a
    /// bodiless `304 Not Modified`.
    pub async fn apply_cache_headers(
        &mut self,
        status: CacheStatus,
        entry: Option<&CacheEntry>,
        if_modified_since: Option<DateTime<Utc>>,
    ) {
        insert(&mut self.headers, CACHE_STATUS_HEADER, status.as_str());

        let fresh = match entry {
            Some(entry) if entry.is_enabled() && !entry.is_expired().await => {
                entry.last_modified().await.map(|modified| (entry.ttl(), modified))
            }
            _ => None,
        };
        match fresh {
            Some((ttl, modified)) => {
                insert(&mut self.headers, CACHE_CONTROL.as_str(), &format!("public, max-age={ttl}"));
                insert(&mut self.headers, LAST_MODIFIED.as_str(), &format_http_date(modified));
                // HTTP dates carry whole seconds only
                let unchanged = if_modified_since
                    .is_some_and(|since| modified.timestamp() <= since.timestamp());
                if unchanged && self.envelope.is_success() {
                    self.status = StatusCode::NOT_MODIFIED;
                }
            }
            None => {
                self.headers
                    .insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
            }
        }
    }

    pub fn body(&self) -> String {
        match self.envelope.encode() {
            Ok(body) => body,
            Err(e) => {
                error!(error = %e, "failed to encode envelope");
                r#"{"code":100,"message":"Unknown error","content":{},"cache":"0"}"#.to_string()
            }
        }
    }
}

fn insert(headers: &mut HeaderMap, name: &str, value: &str) {
    let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
        return;
    };
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(name, value);
        }
        Err(e) => warn!(header = %name, error = %e, "dropping invalid header value"),
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        if self.status == StatusCode::NOT_MODIFIED {
            return (self.status, self.headers).into_response();
        }
        let body = self.body();
        (self.status, self.headers, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{Fingerprint, ResponseCache};
    use crate::clock::ManualClock;
    use chrono::Duration;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn stored_entry(dir: &TempDir) -> CacheEntry {
        let cache = ResponseCache::new(
            Some(dir.path().to_path_buf()),
            Arc::new(ManualClock::starting_now()),
        );
        let entry = cache
            .entry(Fingerprint::new("blog", "post", &Default::default()), 600, true)
            .await;
        entry.write(&Envelope::ok(json!({"id": 1}))).await;
        entry
    }

    #[test]
    fn test_protocol_headers() {
        let response = ApiResponse::new(Envelope::ok(json!({})), "v1");
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.headers[API_VERSION_HEADER], "v1");
        assert_eq!(response.headers[API_SERVER_HEADER], "postgate/v1");
        assert_eq!(response.headers[CONTENT_TYPE], "application/json");
    }

    #[test]
    fn test_failure_maps_status() {
        let response = ApiResponse::failure(&ApiError::MethodNotAllowed("nope".into()), "v1");
        assert_eq!(response.status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.envelope.code, 102);
        assert_eq!(response.headers[CACHE_CONTROL], "no-cache");
    }

    #[test]
    fn test_invalid_version_header_is_dropped() {
        let response = ApiResponse::new(Envelope::ok(json!({})), "v1\n");
        assert!(!response.headers.contains_key(API_VERSION_HEADER));
    }

    #[test]
    fn test_body_is_wire_envelope() {
        let response = ApiResponse::new(Envelope::ok(json!({"a": 1})), "v1");
        let body: serde_json::Value = serde_json::from_str(&response.body()).unwrap();
        assert_eq!(body["cache"], "0");
        assert_eq!(body["message"], "Ok");
    }

    #[tokio::test]
    async fn test_unchanged_entry_is_not_modified() {
        let dir = TempDir::new().unwrap();
        let entry = stored_entry(&dir).await;
        let modified = entry.last_modified().await.unwrap();

        let mut response = ApiResponse::new(Envelope::ok(json!({"id": 1})), "v1");
        response
            .apply_cache_headers(CacheStatus::Hit, Some(&entry), Some(modified))
            .await;
        assert_eq!(response.status, StatusCode::NOT_MODIFIED);
        assert!(response.headers.contains_key(LAST_MODIFIED));

        let body = axum::body::to_bytes(response.into_response().into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_older_validator_gets_full_response() {
        let dir = TempDir::new().unwrap();
        let entry = stored_entry(&dir).await;
        let modified = entry.last_modified().await.unwrap();

        let mut response = ApiResponse::new(Envelope::ok(json!({"id": 1})), "v1");
        response
            .apply_cache_headers(
                CacheStatus::Hit,
                Some(&entry),
                Some(modified - Duration::seconds(5)),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK);

        let mut response = ApiResponse::new(Envelope::ok(json!({"id": 1})), "v1");
        response
            .apply_cache_headers(CacheStatus::Hit, Some(&entry), None)
            .await;
        assert_eq!(response.status, StatusCode::OK);
    }
}
