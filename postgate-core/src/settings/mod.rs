pub mod api_server;
pub mod lifetimes;
pub mod rate_limiting;
