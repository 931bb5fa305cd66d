//! Startup and shutdown of the simulated API.

pub mod api_system;
pub mod settings;

pub use api_system::BpkioApi;
pub use settings::ApiSettings;
