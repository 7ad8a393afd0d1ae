//! What an endpoint declares and what it gets to see when it runs.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::auth::{Authenticator, Caller};
use crate::error::ApiError;
use crate::rate::RateCounter;
use crate::registry::EndpointRegistry;
use crate::services::{Services, Tenant};
use crate::token::TokenService;

pub const CURRENT_VERSION: &str = "v1";

/// Sanitized request parameters, always strings.
pub type Params = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRequirement {
    Required,
    Optional,
}

impl Serialize for FieldRequirement {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_bool(*self == FieldRequirement::Required)
    }
}

/// Static metadata of an endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointDescriptor {
    pub id: String,
    pub versions: BTreeSet<String>,
    /// Callers must be authenticated.
    pub auth: bool,
    pub fields: BTreeMap<String, FieldRequirement>,
    /// Calls charged to the caller's budget.
    pub cost: u32,
    pub cacheable: bool,
    /// Response detail level. Endpoints decide what each level includes.
    pub level: u8,
}

impl EndpointDescriptor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            versions: BTreeSet::from([CURRENT_VERSION.to_string()]),
            auth: true,
            fields: BTreeMap::new(),
            cost: 1,
            cacheable: true,
            level: 1,
        }
    }

    pub fn versions<I, S>(mut self, versions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.versions = versions.into_iter().map(Into::into).collect();
        self
    }

    /// Anonymous callers are served too.
    pub fn public(mut self) -> Self {
        self.auth = false;
        self
    }

    pub fn required(mut self, field: &str) -> Self {
        self.fields
            .insert(field.to_string(), FieldRequirement::Required);
        self
    }

    pub fn optional(mut self, field: &str) -> Self {
        self.fields
            .insert(field.to_string(), FieldRequirement::Optional);
        self
    }

    pub fn cost(mut self, cost: u32) -> Self {
        self.cost = cost;
        self
    }

    pub fn uncached(mut self) -> Self {
        self.cacheable = false;
        self
    }

    pub fn level(mut self, level: u8) -> Self {
        self.level = level;
        self
    }

    pub fn supports(&self, version: &str) -> bool {
        self.versions.contains(version)
    }

    /// Checks raw input against the declared fields and keeps the usable
    /// values. A declared field that is required, or that was sent at all,
    /// must not be empty. Optional fields sent as anything but a string or
    /// an integer are dropped, as is undeclared input.
    pub fn filter_params(&self, raw: &BTreeMap<String, Value>) -> Result<Params, ApiError> {
        let mut params = Params::new();
        for (name, requirement) in &self.fields {
            let value = raw.get(name);
            let required = *requirement == FieldRequirement::Required;
            if (required || value.is_some()) && value.is_none_or(is_empty) {
                return Err(ApiError::MissingParameter(name.clone()));
            }
            match value.and_then(scalar_string) {
                Some(value) => {
                    params.insert(name.clone(), value);
                }
                // a required field has to be a string or an integer
                None if required => return Err(ApiError::MissingParameter(name.clone())),
                None => {}
            }
        }
        Ok(params)
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Number(_) => false,
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(n.to_string()),
        _ => None,
    }
}

/// A request bound to an endpoint, before anything has been checked.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub tenant: Tenant,
    pub version: String,
    pub endpoint: String,
    /// Path segments after the endpoint id.
    pub args: Vec<String>,
    pub params: Params,
    /// Raw value of the `Authorization` header.
    pub bearer: Option<String>,
    /// Parsed `If-Modified-Since` header.
    pub if_modified_since: Option<DateTime<Utc>>,
}

impl RequestContext {
    /// Positional path argument, empty when absent.
    pub fn arg(&self, index: usize) -> &str {
        self.args.get(index).map(String::as_str).unwrap_or_default()
    }

    /// Sanitized parameter, empty when absent.
    pub fn param(&self, key: &str) -> &str {
        self.params.get(key).map(String::as_str).unwrap_or_default()
    }
}

/// Everything a handler may use while executing.
#[derive(Debug)]
pub struct Call<'a> {
    pub request: &'a RequestContext,
    pub caller: &'a Caller,
    pub rate: RateCounter,
    pub tokens: &'a TokenService,
    pub services: &'a Services,
    pub registry: &'a EndpointRegistry,
}

#[async_trait]
pub trait Endpoint: Send + Sync + Debug {
    fn descriptor(&self) -> &EndpointDescriptor;

    /// Endpoint-specific preconditions, checked before authentication.
    async fn check(&self, _request: &RequestContext, _services: &Services) -> Result<(), ApiError> {
        Ok(())
    }

    /// Works out who is calling. Login endpoints override this to check
    /// credentials instead of the bearer token.
    async fn authenticate(
        &self,
        request: &RequestContext,
        auth: &Authenticator<'_>,
    ) -> Result<Caller, ApiError> {
        auth.from_bearer(request.bearer.as_deref()).await
    }

    /// Produces the response content. `None` means there is nothing to send.
    async fn execute(&self, call: &Call<'_>) -> Result<Option<Value>, ApiError>;
}
