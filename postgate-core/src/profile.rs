//! Extra keys for the user profile.
//!
//! Contributors run after the base profile is built. They may add string or
//! integer values under keys the profile does not have yet; anything else
//! they return is skipped.

use std::fmt::Debug;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::endpoint::Call;
use crate::store::UserRecord;

#[async_trait]
pub trait ProfileContributor: Send + Sync + Debug {
    async fn contribute(
        &self,
        call: &Call<'_>,
        user: &UserRecord,
    ) -> anyhow::Result<Map<String, Value>>;
}

fn is_scalar(value: &Value) -> bool {
    match value {
        Value::String(_) => true,
        Value::Number(n) => n.is_i64() || n.is_u64(),
        _ => false,
    }
}

/// Runs every contributor of the call's registry over `profile`.
pub(crate) async fn extend(call: &Call<'_>, user: &UserRecord, profile: &mut Map<String, Value>) {
    for contributor in call.registry.profile_contributors() {
        let extra = match contributor.contribute(call, user).await {
            Ok(extra) => extra,
            Err(e) => {
                warn!(contributor = ?contributor, error = %e, "profile contributor failed");
                continue;
            }
        };
        for (key, value) in extra {
            if profile.contains_key(&key) {
                debug!(key, "profile key already set, ignoring contribution");
            } else if is_scalar(&value) {
                profile.insert(key, value);
            } else {
                debug!(key, "profile contributions must be strings or integers");
            }
        }
    }
}
