pub mod admin_auth;
pub mod handlers;
pub mod rate_limiting;
pub mod router;
