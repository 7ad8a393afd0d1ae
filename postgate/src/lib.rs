//! postgate library
//!
//! The server binary is a thin shell around these modules; they are public
//! so integration tests can build the router against fixture settings.

pub mod api;
pub mod app_state;
pub mod content;
pub mod contrib;
pub mod http;
pub mod init_telemetry;
pub mod settings;
pub mod stop_flag;

pub use app_state::AppState;
