//! Startup configuration
//!
//! Everything the server needs is resolved once, before the listener binds:
//! plain settings from environment variables, the signing secret and the
//! credential pair from the secrets boundary. The result is read-only and
//! shared by reference.
//!
//! # Environment Variables
//!
//! - `APP_ENV`: `production`, `staging` or `development` (default), selects
//!   the signing-key policy
//! - `LISTEN_ADDR`: bind address (default `0.0.0.0`)
//! - `PORT`: listen port (default `9292`)
//! - `TOKEN_LIFETIME`: e.g. `24h` (default), `30m`
//! - `REQUEST_TIMEOUT`: e.g. `30s` (default)
//! - `MAX_REQUEST_SIZE`: e.g. `64KB` (default)
//! - `LOGIN_MAX_ATTEMPTS`: failures before lockout (default `5`)
//! - `LOGIN_LOCKOUT`: first lockout length (default `15m`)
//! - `TRUSTED_PROXIES`: comma-separated proxy IPs whose forwarding headers
//!   name the client for login lockout (default none)
//! - `ITEMGUARD_SIGNING_KEY_ID`, `ITEMGUARD_USERNAME_ID`,
//!   `ITEMGUARD_PASSWORD_ID`: secret identifiers (defaults
//!   `itemguard/jwt-secret`, `itemguard/username`, `itemguard/password`)

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use tracing::warn;

use crate::credentials::{PasswordEntry, StaticCredentials, DEFAULT_TOKEN_LIFETIME};
use crate::login::LockoutPolicy;
use crate::parse::{parse_duration, parse_size};
use crate::secrets::{self, SecretsError, SecretsProvider};
use crate::signing_key::{SigningKey, SigningKeyError, SigningKeyPolicy};

pub const DEFAULT_PORT: u16 = 9292;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {var}: {message}")]
    Invalid { var: &'static str, message: String },

    #[error("failed to resolve secret: {0}")]
    Secret(#[from] SecretsError),

    #[error("signing key rejected: {0}")]
    SigningKey(#[from] SigningKeyError),
}

/// HTTP layer limits (SC-5, SC-10).
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Requests running longer are answered with 408
    pub request_timeout: Duration,
    /// Larger bodies are answered with 413
    pub max_request_size: usize,
    pub tracing_enabled: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            max_request_size: 64 * 1024,
            tracing_enabled: true,
        }
    }
}

/// Identifiers of the secrets resolved at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretIds {
    pub signing_key: String,
    pub username: String,
    pub password: String,
}

impl Default for SecretIds {
    fn default() -> Self {
        Self {
            signing_key: "itemguard/jwt-secret".to_string(),
            username: "itemguard/username".to_string(),
            password: "itemguard/password".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: String,
    pub listen_addr: IpAddr,
    pub port: u16,
    pub token_lifetime: Duration,
    pub http: HttpConfig,
    pub lockout: LockoutPolicy,
    pub signing_key: SigningKey,
    pub credentials: StaticCredentials,
}

impl AppConfig {
    /// Defaults around already-resolved key material.
    pub fn new(signing_key: SigningKey, credentials: StaticCredentials) -> Self {
        Self {
            environment: "development".to_string(),
            listen_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            token_lifetime: DEFAULT_TOKEN_LIFETIME,
            http: HttpConfig::default(),
            lockout: LockoutPolicy::default(),
            signing_key,
            credentials,
        }
    }

    /// Resolve configuration from the process environment and `provider`.
    pub async fn load(provider: &dyn SecretsProvider) -> Result<Self, ConfigError> {
        Self::load_with(provider, |name| std::env::var(name).ok()).await
    }

    /// Like [`AppConfig::load`] with an explicit variable lookup.
    pub async fn load_with<F>(provider: &dyn SecretsProvider, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String> + Sync,
    {
        let env = Env(&lookup);

        let environment = env.get("APP_ENV").unwrap_or_else(|| "development".to_string());
        let defaults = SecretIds::default();
        let ids = SecretIds {
            signing_key: env.get("ITEMGUARD_SIGNING_KEY_ID").unwrap_or(defaults.signing_key),
            username: env.get("ITEMGUARD_USERNAME_ID").unwrap_or(defaults.username),
            password: env.get("ITEMGUARD_PASSWORD_ID").unwrap_or(defaults.password),
        };

        let listen_addr = env.parsed("LISTEN_ADDR", |v| v.parse::<IpAddr>().map_err(|e| e.to_string()))?;
        let port = env.parsed("PORT", |v| v.parse::<u16>().map_err(|e| e.to_string()))?;
        let token_lifetime = env.parsed("TOKEN_LIFETIME", |v| parse_duration(v).map_err(|e| e.to_string()))?;
        let request_timeout = env.parsed("REQUEST_TIMEOUT", |v| parse_duration(v).map_err(|e| e.to_string()))?;
        let max_request_size = env.parsed("MAX_REQUEST_SIZE", |v| parse_size(v).map_err(|e| e.to_string()))?;
        let max_attempts = env.parsed("LOGIN_MAX_ATTEMPTS", |v| v.parse::<u32>().map_err(|e| e.to_string()))?;
        let lockout_duration = env.parsed("LOGIN_LOCKOUT", |v| parse_duration(v).map_err(|e| e.to_string()))?;
        let trusted_proxies = env.parsed("TRUSTED_PROXIES", parse_ip_list)?;

        if token_lifetime == Some(Duration::ZERO) {
            return Err(ConfigError::Invalid {
                var: "TOKEN_LIFETIME",
                message: "must be greater than zero".to_string(),
            });
        }

        let policy = SigningKeyPolicy::for_environment(&environment);
        let signing_key = SigningKey::new(secrets::fetch_string(provider, &ids.signing_key).await?, &policy)?;
        let username = secrets::fetch_string(provider, &ids.username).await?;
        let password = PasswordEntry::parse(secrets::fetch_string(provider, &ids.password).await?);

        if !password.is_hashed() && policy.require_diversity {
            warn!(
                environment = %environment,
                "Login password is stored in plaintext; store an Argon2 PHC hash instead"
            );
        }

        let mut config = Self::new(signing_key, StaticCredentials::new(username, password));
        config.environment = environment;
        if let Some(addr) = listen_addr {
            config.listen_addr = addr;
        }
        if let Some(port) = port {
            config.port = port;
        }
        if let Some(lifetime) = token_lifetime {
            config.token_lifetime = lifetime;
        }
        if let Some(timeout) = request_timeout {
            config.http.request_timeout = timeout;
        }
        if let Some(size) = max_request_size {
            config.http.max_request_size = size;
        }
        if let Some(attempts) = max_attempts {
            config.lockout = config.lockout.max_attempts(attempts);
        }
        if let Some(duration) = lockout_duration {
            config.lockout = config.lockout.lockout_duration(duration);
        }
        if let Some(proxies) = trusted_proxies {
            config.lockout = config.lockout.trusted_proxies(proxies);
        }

        Ok(config)
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen_addr, self.port)
    }

    pub fn is_production(&self) -> bool {
        matches!(self.environment.to_ascii_lowercase().as_str(), "production" | "prod")
    }

    pub fn token_lifetime(mut self, lifetime: Duration) -> Self {
        self.token_lifetime = lifetime;
        self
    }

    pub fn http(mut self, http: HttpConfig) -> Self {
        self.http = http;
        self
    }

    pub fn lockout(mut self, policy: LockoutPolicy) -> Self {
        self.lockout = policy;
        self
    }
}

fn parse_ip_list(value: &str) -> Result<Vec<IpAddr>, String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.parse::<IpAddr>().map_err(|e| format!("'{}': {}", entry, e)))
        .collect()
}

struct Env<'a>(&'a (dyn Fn(&str) -> Option<String> + Sync));

impl Env<'_> {
    fn get(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parsed<T>(
        &self,
        name: &'static str,
        parse: impl Fn(&str) -> Result<T, String>,
    ) -> Result<Option<T>, ConfigError> {
        self.get(name)
            .map(|value| parse(&value))
            .transpose()
            .map_err(|message| ConfigError::Invalid { var: name, message })
    }
}
