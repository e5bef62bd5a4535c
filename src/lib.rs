//! # itemguard
//!
//! A bearer-token gate in front of a small in-memory item store, plus the
//! secrets-manager boundary used to reach the logistics database.
//!
//! ## Features
//!
//! - **Token issuing** (IA-2): HS256-signed tokens for a configured user
//! - **Auth gate** (AC-3): fail-closed bearer token middleware for Axum
//! - **Login lockout** (AC-7): per-username and per-IP failure tracking
//! - **Service layers** (SC-5): request timeout and body size limits
//! - **Secrets** (IA-5): env, in-memory and Conjur providers
//! - **Structured logging** (AU-2): security events through `tracing`
//! - **Database** (SC-8): credentials from the secrets manager, TLS required
//!
//! ## Quick Start
//!
//! ```ignore
//! use itemguard::observability::{self, ObservabilityConfig};
//! use itemguard::{routes, secrets, AppConfig, AppState};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     observability::init(&ObservabilityConfig::from_env())?;
//!
//!     let provider = secrets::provider_from_env()?;
//!     let config = AppConfig::load(provider.as_ref()).await?;
//!     let app = routes::app(AppState::new(&config), &config.http);
//!
//!     let listener = tokio::net::TcpListener::bind(config.socket_addr()).await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod credentials;
mod crypto;
pub mod database;
pub mod error;
pub mod gate;
mod layers;
pub mod login;
pub mod observability;
mod parse;
pub mod routes;
pub mod secrets;
pub mod signing_key;
pub mod store;
pub mod token;
pub mod vessels;

// Re-exports
pub use config::{AppConfig, ConfigError, HttpConfig, DEFAULT_PORT};
pub use credentials::{AuthError, Authenticator, IssuedToken, PasswordEntry, StaticCredentials};
pub use crypto::{constant_time_eq, constant_time_str_eq};
pub use error::{AppError, ErrorKind};
pub use gate::{require_bearer, GateRejection};
pub use layers::ServiceLayers;
pub use login::{LockoutPolicy, LoginTracker};
pub use parse::{parse_duration, parse_size, ParseError};
pub use routes::{router, AppState};
pub use secrets::{SecretPath, SecretsError, SecretsProvider};
pub use signing_key::{SigningKey, SigningKeyError, SigningKeyPolicy};
pub use store::{Item, ItemStore};
pub use token::{Claim, Identity, TokenCodec, TokenError};
