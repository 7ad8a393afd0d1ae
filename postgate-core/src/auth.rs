use tracing::debug;

use crate::error::ApiError;
use crate::rate::RateIdentity;
use crate::services::Tenant;
use crate::store::{ContentStore, UserRecord};
use crate::token::{IdentityToken, TokenService};

/// Who is calling, as far as the API could establish.
#[derive(Debug, Clone)]
pub struct Caller {
    pub token: IdentityToken,
    /// Present only for authenticated callers.
    pub user: Option<UserRecord>,
}

impl Caller {
    pub fn anonymous(token: IdentityToken) -> Self {
        Self { token, user: None }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some() && !self.token.is_anonymous()
    }

    pub fn rate_identity(&self, tenant: &Tenant) -> RateIdentity {
        match &self.user {
            Some(user) if self.is_authenticated() => RateIdentity::user(&user.id),
            _ => RateIdentity::anonymous(&tenant.id),
        }
    }

    pub fn rate_limit(&self) -> Option<u32> {
        self.user.as_ref().and_then(|user| user.rate_limit)
    }
}

pub struct Authenticator<'a> {
    tenant: &'a Tenant,
    tokens: &'a TokenService,
    content: &'a dyn ContentStore,
}

impl<'a> Authenticator<'a> {
    pub fn new(tenant: &'a Tenant, tokens: &'a TokenService, content: &'a dyn ContentStore) -> Self {
        Self {
            tenant,
            tokens,
            content,
        }
    }

    /// Identity carried by a bearer header. The user behind a valid token
    /// must still exist and still be allowed to use the API.
    pub async fn from_bearer(&self, bearer: Option<&str>) -> Result<Caller, ApiError> {
        let token = self.tokens.verify(bearer);
        if token.is_anonymous() {
            return Ok(Caller::anonymous(token));
        }

        match self.content.user(&token.subject).await? {
            Some(user) if user.may_use_api(&self.tenant.id) => Ok(Caller {
                token,
                user: Some(user),
            }),
            _ => {
                debug!(user = %token.subject, tenant = %self.tenant.id, "token holder may not use the api");
                Ok(Caller::anonymous(self.tokens.anonymous()))
            }
        }
    }

    /// Checks credentials and issues a fresh token on success.
    pub async fn login(&self, username: &str, password: &str) -> Result<Caller, ApiError> {
        if username.is_empty() || password.is_empty() {
            return Ok(Caller::anonymous(self.tokens.anonymous()));
        }

        match self.content.verify_credentials(username, password).await? {
            Some(user) if user.may_use_api(&self.tenant.id) => Ok(Caller {
                token: self.tokens.issue(&user.id),
                user: Some(user),
            }),
            Some(_) => {
                debug!(user = username, tenant = %self.tenant.id, "user may not use the api");
                Ok(Caller::anonymous(self.tokens.anonymous()))
            }
            None => {
                debug!(user = username, "invalid credentials");
                Ok(Caller::anonymous(self.tokens.anonymous()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::services::testing::services;
    use crate::store::testing::{user, FixtureStore};
    use crate::store::UserStatus;
    use serde_json::json;

    fn store() -> FixtureStore {
        FixtureStore::default()
            .with_user("secret", user("alice", "blog"))
            .with_user(
                "secret",
                UserRecord {
                    status: UserStatus::Restricted,
                    ..user("mallory", "blog")
                },
            )
    }

    #[tokio::test]
    async fn test_login_and_bearer() {
        let clock = ManualClock::starting_now();
        let services = services(store(), &clock, json!({}));
        let tenant = services.resolve_tenant(None).unwrap();
        let tokens = services.tokens(&tenant, "v1");
        let auth = Authenticator::new(&tenant, &tokens, services.content.as_ref());

        let caller = auth.login("alice", "secret").await.unwrap();
        assert!(caller.is_authenticated());
        assert_eq!(caller.rate_identity(&tenant), RateIdentity::user("alice"));

        let bearer = tokens.encode(&caller.token).unwrap();
        let again = auth.from_bearer(Some(&bearer)).await.unwrap();
        assert_eq!(again.token.subject, "alice");
    }

    #[tokio::test]
    async fn test_rejected_logins_are_anonymous() {
        let clock = ManualClock::starting_now();
        let services = services(store(), &clock, json!({}));
        let tenant = services.resolve_tenant(None).unwrap();
        let tokens = services.tokens(&tenant, "v1");
        let auth = Authenticator::new(&tenant, &tokens, services.content.as_ref());

        for (username, password) in [("alice", "wrong"), ("mallory", "secret"), ("", "")] {
            let caller = auth.login(username, password).await.unwrap();
            assert!(!caller.is_authenticated(), "{username} should be anonymous");
            assert_eq!(caller.rate_identity(&tenant), RateIdentity::anonymous("blog"));
        }
    }

    #[tokio::test]
    async fn test_token_for_unknown_user_is_anonymous() {
        let clock = ManualClock::starting_now();
        let services = services(store(), &clock, json!({}));
        let tenant = services.resolve_tenant(None).unwrap();
        let tokens = services.tokens(&tenant, "v1");
        let auth = Authenticator::new(&tenant, &tokens, services.content.as_ref());

        let bearer = tokens.encode(&tokens.issue("ghost")).unwrap();
        assert!(!auth.from_bearer(Some(&bearer)).await.unwrap().is_authenticated());
    }
}
