pub mod auth;
pub mod cache;
pub mod clock;
pub mod dispatcher;
pub mod endpoint;
pub mod endpoints;
pub mod envelope;
pub mod error;
pub mod pipeline;
pub mod profile;
pub mod rate;
pub mod registry;
pub mod response;
pub mod services;
pub mod settings;
pub mod store;
pub mod token;
pub mod usage;

pub use dispatcher::{ApiRequest, Dispatcher};
pub use envelope::Envelope;
pub use error::{ApiCode, ApiError};
pub use registry::RegistryBuilder;
pub use response::ApiResponse;
pub use services::Services;
