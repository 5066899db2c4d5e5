pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod types;

pub use api::{AppState, create_router};
pub use auth::{AuthError, AuthenticatedUser, Claims, TokenVerifier, UserInfo};
pub use config::VerifierConfig;
pub use db::{DatabaseConfig, UserContextStore, create_connection, ensure_schema};
