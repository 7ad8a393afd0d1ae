use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::endpoint::{Call, Endpoint, EndpointDescriptor};
use crate::error::{ApiCode, ApiError};

/// Status codes clients may receive, or a single one with `code`.
#[derive(Debug)]
pub struct CodesEndpoint {
    descriptor: EndpointDescriptor,
}

impl CodesEndpoint {
    pub const ID: &'static str = "codes";

    pub fn new() -> Self {
        Self {
            descriptor: EndpointDescriptor::new(Self::ID).optional("code"),
        }
    }
}

impl Default for CodesEndpoint {
    fn default() -> Self {
        Self::new()
    }
}

fn lookup(raw: &str) -> Option<ApiCode> {
    let code = ApiCode::from_u16(raw.trim().parse().ok()?)?;
    ApiCode::PUBLIC.contains(&code).then_some(code)
}

#[async_trait]
impl Endpoint for CodesEndpoint {
    fn descriptor(&self) -> &EndpointDescriptor {
        &self.descriptor
    }

    async fn execute(&self, call: &Call<'_>) -> Result<Option<Value>, ApiError> {
        // unknown codes fall back to the whole table
        if let Some(code) = lookup(call.request.param("code")) {
            return Ok(Some(json!({
                "message": code.default_message(),
                "code": code.as_u16().to_string(),
            })));
        }

        let table: Map<String, Value> = ApiCode::PUBLIC
            .into_iter()
            .map(|code| (code.as_u16().to_string(), json!(code.default_message())))
            .collect();
        Ok(Some(Value::Object(table)))
    }
}
