//! Security Event Logging (AU-2, AU-3)
//!
//! Every authentication decision, lockout and secret-fetch failure is logged
//! through [`security_event!`](crate::security_event) so the records share
//! the `security_event`, `category` and `severity` fields and the log level
//! follows the severity.
//!
//! ```ignore
//! security_event!(
//!     SecurityEvent::AccessDenied,
//!     reason = "expired",
//!     path = %path,
//!     "Bearer token rejected"
//! );
//! ```

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityEvent {
    /// Login succeeded and a token was issued
    AuthenticationSuccess,
    /// Login refused
    AuthenticationFailure,
    /// Bearer token accepted by the gate
    AccessGranted,
    /// Bearer token missing or rejected by the gate
    AccessDenied,
    /// Guarded item created
    ResourceCreated,
    /// Username locked after repeated failures
    AccountLocked,
    /// Username lock lifted by a successful login or an operator
    AccountUnlocked,
    /// Client IP locked after repeated failures
    BruteForceDetected,
    /// Secret lookup failed at the secrets boundary
    SecretFetchFailed,
    SystemStartup,
    SystemShutdown,
    DatabaseConnected,
}

impl SecurityEvent {
    pub fn category(&self) -> &'static str {
        match self {
            Self::AuthenticationSuccess | Self::AuthenticationFailure => "authentication",
            Self::AccessGranted | Self::AccessDenied => "authorization",
            Self::ResourceCreated => "data",
            Self::AccountLocked | Self::AccountUnlocked | Self::BruteForceDetected => "security",
            Self::SecretFetchFailed => "secrets",
            Self::SystemStartup | Self::SystemShutdown | Self::DatabaseConnected => "system",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::BruteForceDetected => Severity::Critical,

            Self::AuthenticationFailure
            | Self::AccessDenied
            | Self::AccountLocked
            | Self::SecretFetchFailed => Severity::High,

            Self::AuthenticationSuccess
            | Self::ResourceCreated
            | Self::AccountUnlocked
            | Self::SystemStartup
            | Self::SystemShutdown => Severity::Medium,

            Self::AccessGranted | Self::DatabaseConnected => Severity::Low,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::AuthenticationSuccess => "authentication_success",
            Self::AuthenticationFailure => "authentication_failure",
            Self::AccessGranted => "access_granted",
            Self::AccessDenied => "access_denied",
            Self::ResourceCreated => "resource_created",
            Self::AccountLocked => "account_locked",
            Self::AccountUnlocked => "account_unlocked",
            Self::BruteForceDetected => "brute_force_detected",
            Self::SecretFetchFailed => "secret_fetch_failed",
            Self::SystemStartup => "system_startup",
            Self::SystemShutdown => "system_shutdown",
            Self::DatabaseConnected => "database_connected",
        }
    }
}

impl fmt::Display for SecurityEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Routine operations
    Low,
    /// Important state changes
    Medium,
    /// Security-relevant failures
    High,
    /// Immediate attention required
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Log a [`SecurityEvent`] with structured fields.
///
/// Critical events log at `error`, high at `warn`, medium at `info` and low
/// at `debug`.
#[macro_export]
macro_rules! security_event {
    ($event:expr, $($field:tt)*) => {{
        let event: $crate::observability::SecurityEvent = $event;
        let event_name = event.name();
        let category = event.category();

        match event.severity() {
            $crate::observability::Severity::Critical => {
                ::tracing::error!(
                    security_event = event_name,
                    category = category,
                    severity = "critical",
                    $($field)*
                );
            }
            $crate::observability::Severity::High => {
                ::tracing::warn!(
                    security_event = event_name,
                    category = category,
                    severity = "high",
                    $($field)*
                );
            }
            $crate::observability::Severity::Medium => {
                ::tracing::info!(
                    security_event = event_name,
                    category = category,
                    severity = "medium",
                    $($field)*
                );
            }
            $crate::observability::Severity::Low => {
                ::tracing::debug!(
                    security_event = event_name,
                    category = category,
                    severity = "low",
                    $($field)*
                );
            }
        }
    }};
}
