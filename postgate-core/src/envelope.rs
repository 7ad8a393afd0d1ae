//! The response wrapper every API call returns.
//!
//! On the wire an envelope is a flat JSON object:
//!
//! ```json
//! {"code": 200, "message": "Ok", "content": {}, "cache": "0"}
//! ```
//!
//! `cache` is `"1"` when the response was served from the response cache.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::ApiCode;

#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub code: u16,
    pub message: String,
    pub content: Value,
    pub from_cache: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
#[cfg_attr(feature = "utoipa", schema(as = Envelope))]
pub struct WireEnvelope {
    /// Domain status code, see the `codes` endpoint.
    #[serde(default = "cache_miss_code")]
    pub code: u16,
    #[serde(default)]
    pub message: String,
    #[serde(default = "empty_content")]
    #[cfg_attr(feature = "utoipa", schema(value_type = Object))]
    pub content: Value,
    /// `"1"` when served from cache, `"0"` otherwise.
    #[serde(
        default,
        serialize_with = "serialize_cache_flag",
        deserialize_with = "deserialize_cache_flag"
    )]
    #[cfg_attr(feature = "utoipa", schema(value_type = String, example = "0"))]
    pub cache: bool,
}

fn cache_miss_code() -> u16 {
    ApiCode::CacheMiss.as_u16()
}

fn empty_content() -> Value {
    Value::Object(Map::new())
}

fn serialize_cache_flag<S>(flag: &bool, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(if *flag { "1" } else { "0" })
}

fn deserialize_cache_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_i64().is_some_and(|n| n != 0),
        Value::String(s) => matches!(s.as_str(), "1" | "true"),
        _ => false,
    })
}

impl Envelope {
    pub fn new(code: ApiCode, content: Value) -> Self {
        Self {
            code: code.as_u16(),
            message: String::new(),
            content,
            from_cache: false,
        }
    }

    /// Successful response carrying `content`.
    pub fn ok(content: Value) -> Self {
        Self::new(ApiCode::Ok, content)
    }

    /// Error response with empty content and the code's default message.
    pub fn error(code: ApiCode) -> Self {
        Self::new(code, empty_content())
    }

    /// Sentinel returned by cache reads that found nothing usable.
    pub fn cache_miss() -> Self {
        Self {
            from_cache: true,
            ..Self::error(ApiCode::CacheMiss)
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn served_from_cache(mut self) -> Self {
        self.from_cache = true;
        self
    }

    pub fn is_cache_miss(&self) -> bool {
        self.code == ApiCode::CacheMiss.as_u16()
    }

    pub fn is_success(&self) -> bool {
        self.code == ApiCode::Ok.as_u16()
    }

    /// The known code, or `UnknownError` for anything outside the taxonomy.
    pub fn api_code(&self) -> ApiCode {
        ApiCode::from_u16(self.code).unwrap_or(ApiCode::UnknownError)
    }

    /// Message as sent to clients: falls back to the canonical one for the code.
    pub fn effective_message(&self) -> String {
        if self.message.is_empty() {
            ApiCode::message_for(self.code)
                .unwrap_or_default()
                .to_string()
        } else {
            self.message.clone()
        }
    }

    pub fn to_wire(&self) -> WireEnvelope {
        WireEnvelope {
            code: self.code,
            message: self.effective_message(),
            content: self.content.clone(),
            cache: self.from_cache,
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.to_wire())
    }

    /// Decodes stored bytes. Anything unreadable decodes to the cache-miss
    /// sentinel; every decoded envelope is flagged as coming from cache.
    pub fn decode(raw: &str) -> Self {
        match serde_json::from_str::<WireEnvelope>(raw) {
            Ok(wire) => Self {
                code: wire.code,
                message: wire.message,
                content: wire.content,
                from_cache: true,
            },
            Err(e) => {
                tracing::warn!(error = %e, "failed to decode stored envelope");
                Self::cache_miss()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_fills_default_message() {
        let raw = Envelope::ok(json!({"name": "My blog"})).encode().unwrap();
        let value: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(
            value,
            json!({"code": 200, "message": "Ok", "content": {"name": "My blog"}, "cache": "0"})
        );
    }

    #[test]
    fn test_custom_message_is_kept() {
        let envelope = Envelope::error(ApiCode::NotFound).with_message("No such post");
        assert_eq!(envelope.effective_message(), "No such post");
    }

    #[test]
    fn test_decode_marks_cache_origin() {
        let raw = Envelope::ok(json!({"a": 1})).encode().unwrap();
        let decoded = Envelope::decode(&raw);
        assert_eq!(decoded.code, 200);
        assert_eq!(decoded.content, json!({"a": 1}));
        assert!(decoded.from_cache);
    }

    #[test]
    fn test_cache_flag_round_trips() {
        let raw = Envelope::ok(json!({})).served_from_cache().encode().unwrap();
        assert!(raw.contains("\"cache\":\"1\""));
        let wire: WireEnvelope = serde_json::from_str(&raw).unwrap();
        assert!(wire.cache);
    }

    #[test]
    fn test_decode_garbage_is_a_miss() {
        let decoded = Envelope::decode("not json");
        assert!(decoded.is_cache_miss());
        assert_eq!(decoded.content, json!({}));
    }

    #[test]
    fn test_decode_empty_object_is_a_miss() {
        assert!(Envelope::decode("{}").is_cache_miss());
    }

    #[test]
    fn test_unknown_code_degrades() {
        let envelope = Envelope {
            code: 777,
            message: String::new(),
            content: json!({}),
            from_cache: false,
        };
        assert_eq!(envelope.api_code(), ApiCode::UnknownError);
        assert_eq!(envelope.effective_message(), "");
    }
}
