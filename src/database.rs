//! Database credentials (IA-5, SC-8)
//!
//! The logistics database is reached with credentials held in the secrets
//! manager, never in configuration files:
//!
//! | Identifier                       | Use      |
//! |----------------------------------|----------|
//! | `postgresDBApp/connectionstring` | host     |
//! | `postgresDBApp/username`         | user     |
//! | `postgresDBApp/password`         | password |
//!
//! The port comes from the caller (`PORT` or a CLI argument). Connections
//! always use `sslmode=require`, and the password never appears in `Debug`,
//! `Display` or logs.

use std::fmt;

use crate::secrets::{self, SecretsError, SecretsProvider};

pub const HOST_SECRET: &str = "postgresDBApp/connectionstring";
pub const USERNAME_SECRET: &str = "postgresDBApp/username";
pub const PASSWORD_SECRET: &str = "postgresDBApp/password";

pub const DEFAULT_DB_PORT: u16 = 5432;

#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("failed to resolve database credentials: {0}")]
    Secret(#[from] SecretsError),

    #[error("database connection failed: {0}")]
    Connection(String),

    #[error("database query failed: {0}")]
    Query(String),
}

/// Resolved connection parameters.
#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseCredentials {
    pub host: String,
    pub port: u16,
    pub user: String,
    password: String,
}

impl DatabaseCredentials {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
            password: password.into(),
        }
    }

    /// Fetch host, user and password through `provider`.
    pub async fn from_secrets(
        provider: &dyn SecretsProvider,
        port: u16,
    ) -> Result<Self, DatabaseError> {
        let host = secrets::fetch_string(provider, HOST_SECRET).await?;
        let user = secrets::fetch_string(provider, USERNAME_SECRET).await?;
        let password = secrets::fetch_string(provider, PASSWORD_SECRET).await?;

        Ok(Self::new(host.trim(), port, user.trim(), password))
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// Connection string safe for logs.
    pub fn redacted_description(&self) -> String {
        format!(
            "host={} port={} user={} password=[REDACTED] sslmode=require",
            self.host, self.port, self.user
        )
    }

    #[cfg(feature = "postgres")]
    pub fn connect_options(&self) -> sqlx::postgres::PgConnectOptions {
        use sqlx::postgres::{PgConnectOptions, PgSslMode};

        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .ssl_mode(PgSslMode::Require)
    }
}

impl fmt::Display for DatabaseCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted_description())
    }
}

impl fmt::Debug for DatabaseCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseCredentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Open a small pool against the credentials' database.
#[cfg(feature = "postgres")]
pub async fn connect(credentials: &DatabaseCredentials) -> Result<sqlx::PgPool, DatabaseError> {
    use std::time::Duration;

    use sqlx::postgres::PgPoolOptions;
    use tracing::info;

    use crate::observability::SecurityEvent;

    info!(connection = %credentials, "Connecting to database");

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .acquire_timeout(Duration::from_secs(30))
        .connect_with(credentials.connect_options())
        .await
        .map_err(|e| DatabaseError::Connection(e.to_string()))?;

    crate::security_event!(
        SecurityEvent::DatabaseConnected,
        host = %credentials.host,
        port = credentials.port,
        user = %credentials.user,
        "Database connection established"
    );

    Ok(pool)
}
