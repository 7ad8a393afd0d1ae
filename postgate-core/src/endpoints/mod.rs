//! Endpoints every deployment serves.

use std::sync::Arc;

use crate::endpoint::Endpoint;

pub mod auth;
pub mod blog;
pub mod codes;
pub mod endpoints;
pub mod user;

pub use auth::AuthEndpoint;
pub use blog::BlogEndpoint;
pub use codes::CodesEndpoint;
pub use endpoints::EndpointsEndpoint;
pub use user::UserEndpoint;

pub fn builtins() -> Vec<Arc<dyn Endpoint>> {
    vec![
        Arc::new(AuthEndpoint::new()),
        Arc::new(UserEndpoint::new()),
        Arc::new(EndpointsEndpoint::new()),
        Arc::new(CodesEndpoint::new()),
        Arc::new(BlogEndpoint::new()),
    ]
}
