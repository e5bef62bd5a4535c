//! Credential validation and token issuance (IA-2, IA-5)
//!
//! A single static credential pair, resolved from the secrets boundary at
//! startup, is the whole user table. The password entry is either an Argon2
//! PHC string (`$argon2id$v=19$...`) or a plaintext value. Plaintext is
//! accepted for local development only; production deployments store the
//! hash.
//!
//! Unknown user and wrong password are indistinguishable to the caller, and
//! both halves of the pair are always evaluated.

use std::fmt;
use std::time::Duration;

use argon2::password_hash::PasswordHash;
use argon2::{Argon2, PasswordVerifier};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::crypto::constant_time_str_eq;
use crate::token::{Claim, Identity, TokenCodec, TokenError};

/// Default token lifetime: 24 hours.
pub const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// Username or password did not match. Deliberately carries nothing.
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error(transparent)]
    Token(#[from] TokenError),
}

/// Stored form of the accepted password.
#[derive(Clone)]
pub enum PasswordEntry {
    Plain(String),
    /// Argon2 PHC string
    Hashed(String),
}

impl PasswordEntry {
    /// Classify a configured value: PHC strings starting with `$argon2` are
    /// hashes, anything else is plaintext.
    pub fn parse(value: impl Into<String>) -> Self {
        let value = value.into();
        if value.starts_with("$argon2") {
            Self::Hashed(value)
        } else {
            Self::Plain(value)
        }
    }

    pub fn is_hashed(&self) -> bool {
        matches!(self, Self::Hashed(_))
    }

    fn matches(&self, candidate: &str) -> bool {
        match self {
            Self::Plain(expected) => constant_time_str_eq(expected, candidate),
            Self::Hashed(phc) => PasswordHash::new(phc)
                .map(|parsed| {
                    Argon2::default()
                        .verify_password(candidate.as_bytes(), &parsed)
                        .is_ok()
                })
                .unwrap_or(false),
        }
    }
}

impl fmt::Debug for PasswordEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain(_) => f.write_str("Plain([REDACTED])"),
            Self::Hashed(_) => f.write_str("Hashed([REDACTED])"),
        }
    }
}

/// The static credential table.
#[derive(Debug, Clone)]
pub struct StaticCredentials {
    username: String,
    password: PasswordEntry,
}

impl StaticCredentials {
    pub fn new(username: impl Into<String>, password: PasswordEntry) -> Self {
        Self {
            username: username.into(),
            password,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password_is_hashed(&self) -> bool {
        self.password.is_hashed()
    }

    /// Check a submitted pair.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<Identity, AuthError> {
        let username_ok = constant_time_str_eq(&self.username, username);
        let password_ok = self.password.matches(password);

        if username_ok & password_ok {
            Ok(Identity::new(username))
        } else {
            Err(AuthError::InvalidCredentials)
        }
    }
}

/// A freshly issued token and its expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssuedToken {
    pub token: String,
    /// Unix seconds
    pub expires_at: i64,
}

/// Validates credentials and issues tokens for them.
#[derive(Debug, Clone)]
pub struct Authenticator {
    credentials: StaticCredentials,
    codec: TokenCodec,
    token_lifetime: Duration,
}

impl Authenticator {
    pub fn new(credentials: StaticCredentials, codec: TokenCodec) -> Self {
        Self {
            credentials,
            codec,
            token_lifetime: DEFAULT_TOKEN_LIFETIME,
        }
    }

    pub fn with_token_lifetime(mut self, lifetime: Duration) -> Self {
        self.token_lifetime = lifetime;
        self
    }

    pub fn token_lifetime(&self) -> Duration {
        self.token_lifetime
    }

    pub fn login(&self, username: &str, password: &str) -> Result<IssuedToken, AuthError> {
        self.login_at(username, password, Utc::now())
    }

    /// Authenticate and issue a token as of `now`.
    pub fn login_at(
        &self,
        username: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, AuthError> {
        let identity = self.credentials.authenticate(username, password)?;
        let claim = Claim::new(identity, now, self.token_lifetime);
        let token = self.codec.issue(&claim)?;

        Ok(IssuedToken {
            token,
            expires_at: claim.expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing_key::{SigningKey, SigningKeyPolicy};
    use argon2::password_hash::{PasswordHasher, SaltString};
    use rand::rngs::OsRng;

    fn codec() -> TokenCodec {
        let policy = SigningKeyPolicy::default();
        TokenCodec::new(SigningKey::new(SigningKey::generate(&policy), &policy).unwrap())
    }

    fn hash(password: &str) -> String {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .unwrap()
            .to_string()
    }

    fn plain_table() -> StaticCredentials {
        StaticCredentials::new("testuser", PasswordEntry::parse("testpassword"))
    }

    #[test]
    fn test_valid_credentials() {
        let identity = plain_table().authenticate("testuser", "testpassword").unwrap();
        assert_eq!(identity, Identity::new("testuser"));
    }

    #[test]
    fn test_wrong_password_and_unknown_user_are_identical() {
        let table = plain_table();
        let wrong_password = table.authenticate("testuser", "wrong").unwrap_err();
        let unknown_user = table.authenticate("nobody", "testpassword").unwrap_err();
        let both_wrong = table.authenticate("nobody", "wrong").unwrap_err();

        assert_eq!(wrong_password, AuthError::InvalidCredentials);
        assert_eq!(wrong_password, unknown_user);
        assert_eq!(unknown_user, both_wrong);
        assert_eq!(wrong_password.to_string(), unknown_user.to_string());
    }

    #[test]
    fn test_match_is_exact() {
        let table = plain_table();
        assert!(table.authenticate("TestUser", "testpassword").is_err());
        assert!(table.authenticate("testuser ", "testpassword").is_err());
        assert!(table.authenticate("testuser", "testpassword2").is_err());
        assert!(table.authenticate("", "").is_err());
    }

    #[test]
    fn test_hashed_password_entry() {
        let entry = PasswordEntry::parse(hash("testpassword"));
        assert!(entry.is_hashed());

        let table = StaticCredentials::new("testuser", entry);
        assert!(table.authenticate("testuser", "testpassword").is_ok());
        assert_eq!(
            table.authenticate("testuser", "wrong"),
            Err(AuthError::InvalidCredentials)
        );
    }

    #[test]
    fn test_corrupt_hash_never_matches() {
        let table = StaticCredentials::new(
            "testuser",
            PasswordEntry::parse("$argon2id$v=19$not-a-real-hash"),
        );
        assert!(table.password_is_hashed());
        assert!(table.authenticate("testuser", "$argon2id$v=19$not-a-real-hash").is_err());
    }

    #[test]
    fn test_debug_redacts_password() {
        let rendered = format!("{:?}", plain_table());
        assert!(rendered.contains("testuser"));
        assert!(!rendered.contains("testpassword"));
    }

    #[test]
    fn test_login_issues_verifiable_token() {
        let codec = codec();
        let auth = Authenticator::new(plain_table(), codec.clone());

        let issued = auth.login("testuser", "testpassword").unwrap();
        let claim = codec.verify(&issued.token).unwrap();

        assert_eq!(claim.username.as_str(), "testuser");
        assert_eq!(claim.expires_at, issued.expires_at);
        assert_eq!(claim.expires_at - claim.issued_at, 24 * 60 * 60);
    }

    #[test]
    fn test_login_rejects_bad_credentials() {
        let auth = Authenticator::new(plain_table(), codec());
        assert_eq!(
            auth.login("testuser", "wrong"),
            Err(AuthError::InvalidCredentials)
        );
    }

    #[test]
    fn test_custom_token_lifetime() {
        let codec = codec();
        let auth = Authenticator::new(plain_table(), codec.clone())
            .with_token_lifetime(Duration::from_secs(600));
        let now = Utc::now();

        let issued = auth.login_at("testuser", "testpassword", now).unwrap();
        assert_eq!(issued.expires_at, now.timestamp() + 600);
        assert_eq!(
            codec.verify_at(&issued.token, now.timestamp() + 601),
            Err(TokenError::Expired)
        );
    }
}
