pub mod auth;
pub mod config;
pub mod cors;
pub mod error;
pub mod headers;
pub mod metrics;
pub mod routes;
pub mod state;

pub use config::ServerConfig;
pub use error::ApiError;
pub use state::AppState;
