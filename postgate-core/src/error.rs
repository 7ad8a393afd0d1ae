use axum::http::StatusCode;
use thiserror::Error;

use crate::envelope::Envelope;
use crate::rate::RateCounter;

/// Numeric API status codes carried in the envelope.
///
/// These are domain codes, not HTTP statuses. Each one maps to a transport
/// status through [`ApiCode::http_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ApiCode {
    UnknownError,
    ServiceDisabled,
    MethodNotAllowed,
    UnsupportedVersion,
    MissingParameter,
    NoContent,
    NotFound,
    TemporarilyClosed,
    SubmissionFailed,
    Unauthorized,
    /// Reserved: a cache read found nothing usable. Never sent to clients.
    CacheMiss,
    Ok,
    RateLimitReached,
}

impl ApiCode {
    /// Codes a client can receive, in numeric order.
    pub const PUBLIC: [ApiCode; 12] = [
        ApiCode::UnknownError,
        ApiCode::ServiceDisabled,
        ApiCode::MethodNotAllowed,
        ApiCode::UnsupportedVersion,
        ApiCode::MissingParameter,
        ApiCode::NoContent,
        ApiCode::NotFound,
        ApiCode::TemporarilyClosed,
        ApiCode::SubmissionFailed,
        ApiCode::Unauthorized,
        ApiCode::Ok,
        ApiCode::RateLimitReached,
    ];

    pub fn as_u16(self) -> u16 {
        match self {
            ApiCode::UnknownError => 100,
            ApiCode::ServiceDisabled => 101,
            ApiCode::MethodNotAllowed => 102,
            ApiCode::UnsupportedVersion => 103,
            ApiCode::MissingParameter => 104,
            ApiCode::NoContent => 105,
            ApiCode::NotFound => 106,
            ApiCode::TemporarilyClosed => 107,
            ApiCode::SubmissionFailed => 108,
            ApiCode::Unauthorized => 109,
            ApiCode::CacheMiss => 110,
            ApiCode::Ok => 200,
            ApiCode::RateLimitReached => 429,
        }
    }

    pub fn from_u16(code: u16) -> Option<Self> {
        match code {
            110 => Some(ApiCode::CacheMiss),
            _ => Self::PUBLIC.into_iter().find(|c| c.as_u16() == code),
        }
    }

    pub fn default_message(self) -> &'static str {
        match self {
            ApiCode::UnknownError => "Unknown error",
            ApiCode::ServiceDisabled => "Service is down for maintenance",
            ApiCode::MethodNotAllowed => "Method Not Allowed",
            ApiCode::UnsupportedVersion => "The specified API version is not supported",
            ApiCode::MissingParameter => "Missing parameter",
            ApiCode::NoContent => "No content",
            ApiCode::NotFound => "Not found",
            ApiCode::TemporarilyClosed => "Contribution is temporarily closed",
            ApiCode::SubmissionFailed => "Submission failed",
            ApiCode::Unauthorized => "Unauthorized",
            ApiCode::CacheMiss => "Cache miss",
            ApiCode::Ok => "Ok",
            ApiCode::RateLimitReached => "API rate limit reached",
        }
    }

    pub fn http_status(self) -> StatusCode {
        match self {
            ApiCode::UnknownError => StatusCode::BAD_REQUEST,
            ApiCode::ServiceDisabled => StatusCode::SERVICE_UNAVAILABLE,
            ApiCode::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiCode::UnsupportedVersion => StatusCode::BAD_REQUEST,
            ApiCode::MissingParameter => StatusCode::BAD_REQUEST,
            ApiCode::NoContent => StatusCode::INTERNAL_SERVER_ERROR,
            ApiCode::NotFound => StatusCode::NOT_FOUND,
            ApiCode::TemporarilyClosed => StatusCode::FORBIDDEN,
            ApiCode::SubmissionFailed => StatusCode::UNPROCESSABLE_ENTITY,
            ApiCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiCode::CacheMiss => StatusCode::INTERNAL_SERVER_ERROR,
            ApiCode::Ok => StatusCode::OK,
            ApiCode::RateLimitReached => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    /// Canonical message for a raw numeric code, if it is a known one.
    pub fn message_for(code: u16) -> Option<&'static str> {
        Self::from_u16(code).map(Self::default_message)
    }
}

#[derive(Clone, Error, Debug)]
pub enum ApiError {
    #[error("Service is down for maintenance")]
    ServiceDisabled,

    #[error("Unknown endpoint: {0}")]
    MethodNotAllowed(String),

    #[error("Unsupported API version: {0}")]
    UnsupportedVersion(String),

    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    #[error("Endpoint produced no content")]
    NoContent,

    #[error("Not found")]
    NotFound,

    #[error("Contribution is temporarily closed")]
    TemporarilyClosed,

    #[error("Submission failed")]
    SubmissionFailed,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("API rate limit reached")]
    RateLimitReached(RateCounter),

    /// Endpoint-specific failure with a message shown to the client as-is.
    #[error("{message}")]
    Custom { code: ApiCode, message: String },

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn custom(code: ApiCode, message: impl Into<String>) -> Self {
        ApiError::Custom {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> ApiCode {
        match self {
            ApiError::ServiceDisabled => ApiCode::ServiceDisabled,
            ApiError::MethodNotAllowed(_) => ApiCode::MethodNotAllowed,
            ApiError::UnsupportedVersion(_) => ApiCode::UnsupportedVersion,
            ApiError::MissingParameter(_) => ApiCode::MissingParameter,
            ApiError::NoContent => ApiCode::NoContent,
            ApiError::NotFound => ApiCode::NotFound,
            ApiError::TemporarilyClosed => ApiCode::TemporarilyClosed,
            ApiError::SubmissionFailed => ApiCode::SubmissionFailed,
            ApiError::Unauthorized => ApiCode::Unauthorized,
            ApiError::RateLimitReached(_) => ApiCode::RateLimitReached,
            ApiError::Custom { code, .. } => match code {
                // a handler must not fake a cache miss or a success
                ApiCode::CacheMiss | ApiCode::Ok => ApiCode::UnknownError,
                code => *code,
            },
            ApiError::Internal(_) => ApiCode::UnknownError,
        }
    }

    /// Counter state to report in headers, when the error came from the limiter.
    pub fn rate_counter(&self) -> Option<RateCounter> {
        match self {
            ApiError::RateLimitReached(counter) => Some(*counter),
            _ => None,
        }
    }

    /// Builds the envelope sent to the client. Details stay in the logs;
    /// the client sees the canonical message unless the error is `Custom`.
    pub fn to_envelope(&self) -> Envelope {
        match self {
            ApiError::Custom { message, .. } => {
                Envelope::error(self.code()).with_message(message.clone())
            }
            _ => Envelope::error(self.code()).with_message(self.code().default_message()),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        if let Some(api_error) = e.downcast_ref::<ApiError>() {
            return api_error.clone();
        }
        ApiError::Internal(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_round_trip_through_numbers() {
        for code in ApiCode::PUBLIC {
            assert_eq!(ApiCode::from_u16(code.as_u16()), Some(code));
        }
        assert_eq!(ApiCode::from_u16(110), Some(ApiCode::CacheMiss));
        assert_eq!(ApiCode::from_u16(999), None);
    }

    #[test]
    fn test_http_mapping() {
        assert_eq!(ApiCode::Unauthorized.http_status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiCode::RateLimitReached.http_status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ApiCode::MethodNotAllowed.http_status(),
            StatusCode::METHOD_NOT_ALLOWED
        );
        assert_eq!(ApiCode::UnknownError.http_status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_error_envelope_uses_default_message() {
        let envelope = ApiError::MissingParameter("username".into()).to_envelope();
        assert_eq!(envelope.code, 104);
        assert_eq!(envelope.message, "Missing parameter");
        assert!(!envelope.from_cache);
    }

    #[test]
    fn test_custom_error_keeps_message() {
        let envelope = ApiError::custom(ApiCode::SubmissionFailed, "Comment rejected").to_envelope();
        assert_eq!(envelope.code, 108);
        assert_eq!(envelope.message, "Comment rejected");
    }

    #[test]
    fn test_custom_error_cannot_claim_success() {
        let error = ApiError::custom(ApiCode::Ok, "fine");
        assert_eq!(error.code(), ApiCode::UnknownError);
    }

    #[test]
    fn test_anyhow_conversion() {
        let error: ApiError = anyhow::anyhow!("store offline").into();
        assert_eq!(error.code(), ApiCode::UnknownError);

        let wrapped: ApiError = anyhow::Error::new(ApiError::NotFound).into();
        assert_eq!(wrapped.code(), ApiCode::NotFound);
    }
}
