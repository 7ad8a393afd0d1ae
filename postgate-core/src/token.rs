//! Signed identity tokens handed out by the `auth` endpoint.
//!
//! Tokens are HS256 JWTs signed with the deployment's master key. The
//! audience is scoped to the API major version so a token minted for one
//! version is rejected by another.

use std::fmt;
use std::sync::Arc;

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::{SharedClock, Window};
use crate::error::ApiError;

pub const ALGORITHM: Algorithm = Algorithm::HS256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityToken {
    /// Empty for anonymous callers.
    pub subject: String,
    pub issued_at: i64,
    pub expires_at: i64,
}

impl IdentityToken {
    pub fn is_anonymous(&self) -> bool {
        self.subject.is_empty()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    user: String,
    iat: i64,
    exp: i64,
    aud: String,
}

/// Key material shared by every tenant of a deployment.
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    audience: String,
}

impl fmt::Debug for TokenKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenKeys")
            .field("audience", &self.audience)
            .finish_non_exhaustive()
    }
}

impl TokenKeys {
    pub fn new(master_key: &SecretString, version: &str) -> Self {
        let secret = master_key.expose_secret().as_bytes();
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            audience: audience_for(version),
        }
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }
}

/// `v1.2` and `v1` share the audience `postgate-v1`.
pub fn audience_for(version: &str) -> String {
    let major = version.split('.').next().unwrap_or(version);
    format!("postgate-{major}")
}

#[derive(Debug, Clone)]
pub struct TokenService {
    keys: Arc<TokenKeys>,
    lifetime: u64,
    clock: SharedClock,
}

impl TokenService {
    pub fn new(keys: Arc<TokenKeys>, lifetime: u64, clock: SharedClock) -> Self {
        Self {
            keys,
            lifetime,
            clock,
        }
    }

    pub fn lifetime(&self) -> u64 {
        self.lifetime
    }

    pub fn issue(&self, subject: &str) -> IdentityToken {
        let window = Window::starting_now(self.clock.as_ref(), self.lifetime);
        IdentityToken {
            subject: subject.to_string(),
            issued_at: window.start,
            expires_at: window.end,
        }
    }

    pub fn anonymous(&self) -> IdentityToken {
        self.issue("")
    }

    /// Encodes a token as the value of an `Authorization: Bearer` header.
    pub fn encode(&self, token: &IdentityToken) -> Result<String, ApiError> {
        let claims = Claims {
            user: token.subject.clone(),
            iat: token.issued_at,
            exp: token.expires_at,
            aud: self.keys.audience.clone(),
        };
        let mut header = Header::new(ALGORITHM);
        header.kid = Some(self.keys.audience.clone());

        encode(&header, &claims, &self.keys.encoding)
            .map_err(|e| ApiError::Internal(format!("failed to encode token: {e}")))
    }

    /// Verifies a bearer value. Any failure yields an anonymous token.
    pub fn verify(&self, bearer: Option<&str>) -> IdentityToken {
        let Some(raw) = bearer.map(|b| b.trim()).filter(|b| !b.is_empty()) else {
            return self.anonymous();
        };
        let raw = raw.strip_prefix("Bearer ").unwrap_or(raw);

        let mut validation = Validation::new(ALGORITHM);
        validation.set_audience(&[self.keys.audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "aud"]);
        // expiry is checked against our own clock below
        validation.validate_exp = false;
        validation.leeway = 0;

        let claims = match decode::<Claims>(raw, &self.keys.decoding, &validation) {
            Ok(data) => data.claims,
            Err(e) => {
                debug!(error = %e, "rejecting bearer token");
                return self.anonymous();
            }
        };

        if self.clock.timestamp() >= claims.exp {
            debug!(user = %claims.user, "bearer token expired");
            return self.anonymous();
        }

        IdentityToken {
            subject: claims.user,
            issued_at: claims.iat,
            expires_at: claims.exp,
        }
    }
}
