use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use postgate_core::store::UserStatus;
use serde::Deserialize;

/// Blog content served by the built-in store.
#[derive(Debug, Deserialize, Clone, Default)]
#[allow(unused)]
#[readonly::make]
pub struct ContentSettings {
    #[serde(default)]
    pub tenants: BTreeMap<String, BlogSettings>,
    #[serde(default)]
    pub users: BTreeMap<String, UserSettings>,
}

#[derive(Debug, Deserialize, Clone)]
#[allow(unused)]
#[readonly::make]
pub struct BlogSettings {
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub description: String,
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub posts: BTreeMap<String, PostSettings>,
}

#[derive(Debug, Deserialize, Clone)]
#[allow(unused)]
#[readonly::make]
pub struct PostSettings {
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub excerpt: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub author: String,
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Clone)]
#[allow(unused)]
#[readonly::make]
pub struct UserSettings {
    pub display_name: String,
    /// bcrypt hash, see `postgate hash-password`
    pub password_hash: String,
    #[serde(default)]
    pub status: UserStatus,
    #[serde(default)]
    pub must_change_password: bool,
    /// Tenants the user may call the API for.
    #[serde(default)]
    pub grants: Vec<String>,
    pub rate_limit: Option<u32>,
}
