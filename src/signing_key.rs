//! Signing Key Validation (IA-5, SC-12)
//!
//! The token signing secret is the single piece of key material in the
//! process: anyone holding it can mint identities. It is resolved from the
//! secrets boundary at startup and checked against a [`SigningKeyPolicy`]
//! before the server accepts a request.
//!
//! # Checks
//!
//! - Minimum length per environment
//! - Weak pattern detection (`secret`, `password`, `changeme`, ...)
//! - Shannon entropy over the whole secret
//! - Character diversity in production and staging
//!
//! # Example
//!
//! ```
//! use itemguard::signing_key::{SigningKey, SigningKeyPolicy};
//!
//! let policy = SigningKeyPolicy::for_environment("production");
//! let key = SigningKey::new(SigningKey::generate(&policy), &policy).unwrap();
//! assert!(!format!("{:?}", key).contains(key.expose_secret()));
//! ```

use std::collections::HashMap;
use std::fmt;

use rand::Rng;

/// Why a signing secret was refused.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SigningKeyError {
    #[error("signing key length ({actual} chars) is below minimum ({minimum} chars) for {context}")]
    TooShort {
        actual: usize,
        minimum: usize,
        context: String,
    },

    #[error("signing key contains weak pattern: '{pattern}'")]
    WeakPattern { pattern: String },

    #[error("signing key entropy ({actual:.1} bits) is below minimum ({minimum:.1} bits) for {context}")]
    LowEntropy {
        actual: f64,
        minimum: f64,
        context: String,
    },

    #[error("signing key must contain: {}", .missing.join(", "))]
    InsufficientDiversity { missing: Vec<String> },
}

/// Strength requirements for the signing secret.
#[derive(Debug, Clone)]
pub struct SigningKeyPolicy {
    /// Minimum length in characters
    pub min_length: usize,
    /// Minimum total Shannon entropy in bits
    pub min_entropy: f64,
    /// Require upper, lower, digit and special characters
    pub require_diversity: bool,
    /// Reject secrets containing common words
    pub check_weak_patterns: bool,
    /// Used in error messages
    pub context: String,
}

impl Default for SigningKeyPolicy {
    fn default() -> Self {
        Self::for_environment("development")
    }
}

impl SigningKeyPolicy {
    /// Policy for a deployment environment (`APP_ENV`).
    ///
    /// - `production`: 64 chars, 128 bits, diversity
    /// - `staging`: 48 chars, 96 bits, diversity
    /// - anything else: 32 chars, 32 bits
    pub fn for_environment(environment: &str) -> Self {
        match environment.to_ascii_lowercase().as_str() {
            "production" | "prod" => Self {
                min_length: 64,
                min_entropy: 128.0,
                require_diversity: true,
                check_weak_patterns: true,
                context: "production environment".to_string(),
            },
            "staging" | "stage" => Self {
                min_length: 48,
                min_entropy: 96.0,
                require_diversity: true,
                check_weak_patterns: true,
                context: "staging environment".to_string(),
            },
            _ => Self {
                min_length: 32,
                min_entropy: 32.0,
                require_diversity: false,
                check_weak_patterns: true,
                context: "development environment".to_string(),
            },
        }
    }

    /// Check `secret` against every rule of the policy, first failure wins.
    pub fn validate(&self, secret: &str) -> Result<(), SigningKeyError> {
        let length = secret.chars().count();
        if length < self.min_length {
            return Err(SigningKeyError::TooShort {
                actual: length,
                minimum: self.min_length,
                context: self.context.clone(),
            });
        }

        if self.check_weak_patterns {
            if let Some(pattern) = find_weak_pattern(secret) {
                return Err(SigningKeyError::WeakPattern {
                    pattern: pattern.to_string(),
                });
            }
        }

        let entropy = shannon_entropy(secret);
        if entropy < self.min_entropy {
            return Err(SigningKeyError::LowEntropy {
                actual: entropy,
                minimum: self.min_entropy,
                context: self.context.clone(),
            });
        }

        if self.require_diversity {
            let missing = missing_character_classes(secret);
            if !missing.is_empty() {
                return Err(SigningKeyError::InsufficientDiversity { missing });
            }
        }

        Ok(())
    }
}

/// Validated HMAC key material.
///
/// Only constructed through [`SigningKey::new`], so holding one means the
/// secret passed the active policy. `Debug` never prints the secret.
#[derive(Clone)]
pub struct SigningKey {
    secret: String,
}

impl SigningKey {
    /// Validate `secret` against `policy` and wrap it.
    pub fn new(secret: impl Into<String>, policy: &SigningKeyPolicy) -> Result<Self, SigningKeyError> {
        let secret = secret.into();
        policy.validate(&secret)?;
        Ok(Self { secret })
    }

    /// Generate a random secret that satisfies `policy`.
    ///
    /// The output is at least 64 characters drawn from letters, digits and
    /// punctuation. A draw that happens to contain a weak word is retried.
    pub fn generate(policy: &SigningKeyPolicy) -> String {
        let length = policy.min_length.max(64);
        loop {
            let secret = random_secret(length);
            if policy.validate(&secret).is_ok() {
                return secret;
            }
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.secret.as_bytes()
    }

    /// The raw secret, for handing to another HS256 implementation.
    pub fn expose_secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("secret", &"[REDACTED]")
            .field("len", &self.secret.len())
            .finish()
    }
}

/// Total Shannon entropy of `s` in bits (per-character entropy times length).
pub fn shannon_entropy(s: &str) -> f64 {
    let mut counts: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *counts.entry(c).or_insert(0) += 1;
    }

    let total: usize = counts.values().sum();
    if total == 0 {
        return 0.0;
    }

    let total = total as f64;
    let per_char: f64 = counts
        .values()
        .map(|&count| {
            let p = count as f64 / total;
            -p * p.log2()
        })
        .sum();

    per_char * total
}

fn find_weak_pattern(secret: &str) -> Option<&'static str> {
    const WEAK_PATTERNS: &[&str] = &[
        "secret", "password", "admin", "123456", "qwerty", "default", "example", "test",
        "demo", "sample", "changeme", "letmein", "welcome", "itemguard",
    ];

    let lowered = secret.to_lowercase();
    WEAK_PATTERNS.iter().copied().find(|p| lowered.contains(p))
}

fn missing_character_classes(secret: &str) -> Vec<String> {
    let classes: [(&str, fn(char) -> bool); 4] = [
        ("uppercase letters", |c| c.is_uppercase()),
        ("lowercase letters", |c| c.is_lowercase()),
        ("digits", |c| c.is_ascii_digit()),
        ("special characters", |c| !c.is_alphanumeric() && !c.is_whitespace()),
    ];

    classes
        .iter()
        .filter(|(_, matches)| !secret.chars().any(*matches))
        .map(|(name, _)| name.to_string())
        .collect()
}

fn random_secret(length: usize) -> String {
    const CHARSET: &[u8] =
        b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!@#$%^&*()_+-=[]{}|;:,.<>?/~";

    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}
