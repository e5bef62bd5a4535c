//! Secret Retrieval Boundary (IA-5, SC-28)
//!
//! Key material and credentials are never compiled in. They are fetched by
//! hierarchical identifier (`app/credential-name`) through a
//! [`SecretsProvider`]:
//!
//! - [`EnvSecretsProvider`]: `app/credential-name` is read from
//!   `APP_CREDENTIAL_NAME`
//! - [`StaticSecretsProvider`]: in-memory map, for tests and embedding
//! - `ConjurSecretsProvider` (feature `conjur`): CyberArk Conjur REST API
//!
//! A failed fetch is a typed [`SecretsError`]; nothing here terminates the
//! process, and secret values are only ever logged through
//! [`redact_secret`].

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;

use crate::observability::SecurityEvent;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SecretsError {
    #[error("invalid secret identifier '{path}': {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error("secret '{0}' not found")]
    NotFound(String),

    #[error("secret '{0}' is not valid UTF-8")]
    NotUtf8(String),

    #[error("secrets provider '{provider}' failed for '{path}': {message}")]
    Backend {
        provider: &'static str,
        path: String,
        message: String,
    },

    #[error("secrets provider configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, SecretsError>;

// ============================================================================
// Secret Paths
// ============================================================================

/// Validated hierarchical secret identifier, e.g. `postgresDBApp/password`.
///
/// Segments are separated by `/`; none may be empty, so leading, trailing
/// and doubled separators are rejected. Whitespace and control characters
/// are not allowed anywhere.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SecretPath(String);

impl SecretPath {
    pub fn parse(path: &str) -> Result<Self> {
        let invalid = |reason| SecretsError::InvalidPath {
            path: path.to_string(),
            reason,
        };

        if path.is_empty() {
            return Err(invalid("empty"));
        }
        if path.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(invalid("contains whitespace or control characters"));
        }
        if path.split('/').any(str::is_empty) {
            return Err(invalid("empty path segment"));
        }

        Ok(Self(path.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// Environment variable carrying this secret: upper case, every
    /// non-alphanumeric character replaced by `_`.
    pub fn env_var_name(&self) -> String {
        self.0
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect()
    }
}

impl fmt::Display for SecretPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Provider Trait
// ============================================================================

/// A source of secret bytes keyed by [`SecretPath`].
#[async_trait]
pub trait SecretsProvider: Send + Sync {
    /// Short provider name for logs and errors.
    fn name(&self) -> &'static str;

    async fn fetch_secret(&self, path: &SecretPath) -> Result<Vec<u8>>;

    /// Fetch a secret that must be UTF-8 text.
    async fn fetch_string(&self, path: &SecretPath) -> Result<String> {
        let bytes = self.fetch_secret(path).await?;
        String::from_utf8(bytes).map_err(|_| SecretsError::NotUtf8(path.to_string()))
    }
}

/// Validate `identifier` and fetch it through `provider`, logging failures
/// as security events.
pub async fn fetch_secret(provider: &dyn SecretsProvider, identifier: &str) -> Result<Vec<u8>> {
    let result = match SecretPath::parse(identifier) {
        Ok(path) => provider.fetch_secret(&path).await,
        Err(e) => Err(e),
    };

    if let Err(e) = &result {
        crate::security_event!(
            SecurityEvent::SecretFetchFailed,
            provider = provider.name(),
            identifier = %identifier,
            error = %e,
            "Secret fetch failed"
        );
    }
    result
}

/// Text form of [`fetch_secret`].
pub async fn fetch_string(provider: &dyn SecretsProvider, identifier: &str) -> Result<String> {
    let bytes = fetch_secret(provider, identifier).await?;
    String::from_utf8(bytes).map_err(|_| SecretsError::NotUtf8(identifier.to_string()))
}

// ============================================================================
// Providers
// ============================================================================

/// Reads secrets from process environment variables.
#[derive(Debug, Clone, Default)]
pub struct EnvSecretsProvider {
    prefix: Option<String>,
}

impl EnvSecretsProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepend `prefix` to every variable name (`PREFIX_APP_NAME`).
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }

    pub fn var_name(&self, path: &SecretPath) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}_{}", prefix, path.env_var_name()),
            None => path.env_var_name(),
        }
    }
}

#[async_trait]
impl SecretsProvider for EnvSecretsProvider {
    fn name(&self) -> &'static str {
        "env"
    }

    async fn fetch_secret(&self, path: &SecretPath) -> Result<Vec<u8>> {
        match std::env::var(self.var_name(path)) {
            Ok(value) => Ok(value.into_bytes()),
            Err(std::env::VarError::NotPresent) => Err(SecretsError::NotFound(path.to_string())),
            Err(std::env::VarError::NotUnicode(_)) => Err(SecretsError::NotUtf8(path.to_string())),
        }
    }
}

/// Fixed in-memory secrets.
#[derive(Clone, Default)]
pub struct StaticSecretsProvider {
    secrets: HashMap<String, Vec<u8>>,
}

impl StaticSecretsProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(mut self, path: &str, value: impl Into<Vec<u8>>) -> Self {
        self.secrets.insert(path.to_string(), value.into());
        self
    }
}

impl fmt::Debug for StaticSecretsProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut paths: Vec<&String> = self.secrets.keys().collect();
        paths.sort();
        f.debug_struct("StaticSecretsProvider")
            .field("paths", &paths)
            .finish()
    }
}

#[async_trait]
impl SecretsProvider for StaticSecretsProvider {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn fetch_secret(&self, path: &SecretPath) -> Result<Vec<u8>> {
        self.secrets
            .get(path.as_str())
            .cloned()
            .ok_or_else(|| SecretsError::NotFound(path.to_string()))
    }
}

#[cfg(feature = "conjur")]
pub use conjur::{ConjurConfig, ConjurSecretsProvider};

#[cfg(feature = "conjur")]
mod conjur {
    use std::fmt;
    use std::time::Duration;

    use async_trait::async_trait;
    use reqwest::{StatusCode, Url};

    use super::{Result, SecretPath, SecretsError, SecretsProvider};

    const PROVIDER: &str = "conjur";

    /// Connection settings, normally from `CONJUR_*` variables.
    #[derive(Clone)]
    pub struct ConjurConfig {
        pub appliance_url: String,
        pub account: String,
        pub login: String,
        pub api_key: String,
        pub timeout: Duration,
    }

    impl fmt::Debug for ConjurConfig {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("ConjurConfig")
                .field("appliance_url", &self.appliance_url)
                .field("account", &self.account)
                .field("login", &self.login)
                .field("api_key", &"[REDACTED]")
                .finish()
        }
    }

    impl ConjurConfig {
        /// `CONJUR_APPLIANCE_URL`, `CONJUR_ACCOUNT`, `CONJUR_AUTHN_LOGIN`
        /// and `CONJUR_AUTHN_API_KEY`, all required.
        pub fn from_env() -> Result<Self> {
            let var = |name: &str| {
                std::env::var(name)
                    .map_err(|_| SecretsError::Config(format!("{} is not set", name)))
            };

            Ok(Self {
                appliance_url: var("CONJUR_APPLIANCE_URL")?,
                account: var("CONJUR_ACCOUNT")?,
                login: var("CONJUR_AUTHN_LOGIN")?,
                api_key: var("CONJUR_AUTHN_API_KEY")?,
                timeout: Duration::from_secs(10),
            })
        }

        fn endpoint(&self, segments: &[&str]) -> Result<Url> {
            let mut url = Url::parse(self.appliance_url.trim_end_matches('/'))
                .map_err(|e| SecretsError::Config(format!("invalid CONJUR_APPLIANCE_URL: {}", e)))?;
            url.path_segments_mut()
                .map_err(|_| SecretsError::Config("CONJUR_APPLIANCE_URL cannot be a base".to_string()))?
                .pop_if_empty()
                .extend(segments);
            Ok(url)
        }

        /// `POST {url}/authn/{account}/{login}/authenticate`
        pub fn authn_url(&self) -> Result<Url> {
            self.endpoint(&["authn", &self.account, &self.login, "authenticate"])
        }

        /// `GET {url}/secrets/{account}/variable/{id}`, with `/` inside the
        /// identifier percent-encoded.
        pub fn secret_url(&self, path: &SecretPath) -> Result<Url> {
            self.endpoint(&["secrets", &self.account, "variable", path.as_str()])
        }
    }

    /// Authenticates with the host API key, then reads variables.
    ///
    /// A fresh access token is requested per fetch; fetches happen a handful
    /// of times at startup.
    #[derive(Debug, Clone)]
    pub struct ConjurSecretsProvider {
        config: ConjurConfig,
        client: reqwest::Client,
    }

    impl ConjurSecretsProvider {
        pub fn new(config: ConjurConfig) -> Result<Self> {
            let client = reqwest::Client::builder()
                .timeout(config.timeout)
                .build()
                .map_err(|e| SecretsError::Config(format!("http client: {}", e)))?;
            Ok(Self { config, client })
        }

        pub fn from_env() -> Result<Self> {
            Self::new(ConjurConfig::from_env()?)
        }

        async fn access_token(&self, path: &SecretPath) -> Result<String> {
            let backend = |message: String| SecretsError::Backend {
                provider: PROVIDER,
                path: path.to_string(),
                message,
            };

            let response = self
                .client
                .post(self.config.authn_url()?)
                .header("Accept-Encoding", "base64")
                .body(self.config.api_key.clone())
                .send()
                .await
                .map_err(|e| backend(format!("authentication request: {}", e)))?;

            if !response.status().is_success() {
                return Err(backend(format!("authentication rejected: {}", response.status())));
            }

            response
                .text()
                .await
                .map_err(|e| backend(format!("authentication response: {}", e)))
        }
    }

    #[async_trait]
    impl SecretsProvider for ConjurSecretsProvider {
        fn name(&self) -> &'static str {
            PROVIDER
        }

        async fn fetch_secret(&self, path: &SecretPath) -> Result<Vec<u8>> {
            let token = self.access_token(path).await?;
            let backend = |message: String| SecretsError::Backend {
                provider: PROVIDER,
                path: path.to_string(),
                message,
            };

            let response = self
                .client
                .get(self.config.secret_url(path)?)
                .header("Authorization", format!("Token token=\"{}\"", token.trim()))
                .send()
                .await
                .map_err(|e| backend(format!("request: {}", e)))?;

            match response.status() {
                status if status.is_success() => response
                    .bytes()
                    .await
                    .map(|body| body.to_vec())
                    .map_err(|e| backend(format!("response body: {}", e))),
                StatusCode::NOT_FOUND => Err(SecretsError::NotFound(path.to_string())),
                status => Err(backend(format!("unexpected status {}", status))),
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn config() -> ConjurConfig {
            ConjurConfig {
                appliance_url: "https://conjur.example.com/".to_string(),
                account: "myorg".to_string(),
                login: "host/logistics/lambda".to_string(),
                api_key: "k3y".to_string(),
                timeout: Duration::from_secs(1),
            }
        }

        #[test]
        fn test_authn_url_encodes_login() {
            assert_eq!(
                config().authn_url().unwrap().as_str(),
                "https://conjur.example.com/authn/myorg/host%2Flogistics%2Flambda/authenticate"
            );
        }

        #[test]
        fn test_secret_url_encodes_identifier() {
            let path = SecretPath::parse("postgresDBApp/password").unwrap();
            assert_eq!(
                config().secret_url(&path).unwrap().as_str(),
                "https://conjur.example.com/secrets/myorg/variable/postgresDBApp%2Fpassword"
            );
        }

        #[test]
        fn test_debug_redacts_api_key() {
            assert!(!format!("{:?}", config()).contains("k3y"));
        }
    }
}

// ============================================================================
// Provider Selection
// ============================================================================

/// Build the provider named by `SECRETS_PROVIDER` (`env` when unset).
pub fn provider_from_env() -> Result<Box<dyn SecretsProvider>> {
    let kind = std::env::var("SECRETS_PROVIDER").unwrap_or_else(|_| "env".to_string());
    provider_for(&kind)
}

pub fn provider_for(kind: &str) -> Result<Box<dyn SecretsProvider>> {
    match kind.trim().to_ascii_lowercase().as_str() {
        "env" => Ok(Box::new(EnvSecretsProvider::new())),
        #[cfg(feature = "conjur")]
        "conjur" => Ok(Box::new(ConjurSecretsProvider::from_env()?)),
        #[cfg(not(feature = "conjur"))]
        "conjur" => Err(SecretsError::Config(
            "SECRETS_PROVIDER=conjur requires the `conjur` feature".to_string(),
        )),
        other => Err(SecretsError::Config(format!("unknown secrets provider '{}'", other))),
    }
}

// ============================================================================
// Redaction
// ============================================================================

/// Render a secret for logs: short values are fully masked, longer ones keep
/// three characters at each end with at most 20 stars between.
pub fn redact_secret(secret: &str) -> String {
    const SHOWN: usize = 3;

    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }

    let start: String = chars[..SHOWN].iter().collect();
    let end: String = chars[chars.len() - SHOWN..].iter().collect();
    let hidden = (chars.len() - 2 * SHOWN).min(20);

    format!("{}{}{}", start, "*".repeat(hidden), end)
}
