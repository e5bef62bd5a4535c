//! Login Attempt Tracking (AC-7)
//!
//! Failed logins are counted per submitted username and per client IP. Once
//! a username reaches `max_attempts` failures inside `attempt_window` it is
//! locked for `lockout_duration`; each further lockout doubles that, up to
//! `max_lockout_duration`. IPs have a separate, higher threshold.
//!
//! The login handler checks both locks *before* validating credentials, so
//! a locked username gets the same 429 whether or not it exists.
//!
//! The IP key is the socket peer. `X-Forwarded-For` / `X-Real-IP` are read
//! only when the peer is one of the policy's `trusted_proxies`.
//!
//! Tracking is in-memory and per process.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::HeaderMap;
use parking_lot::RwLock;

use crate::observability::SecurityEvent;

// ============================================================================
// Lockout Policy
// ============================================================================

#[derive(Debug, Clone)]
pub struct LockoutPolicy {
    /// Failures before a username is locked
    pub max_attempts: u32,
    /// Failures older than this are forgotten
    pub attempt_window: Duration,
    /// First lockout length
    pub lockout_duration: Duration,
    /// Double the lockout each time the same username is locked again
    pub progressive_lockout: bool,
    /// Cap for progressive lockout
    pub max_lockout_duration: Duration,
    /// Also count failures per client IP
    pub track_by_ip: bool,
    /// Failures before an IP is locked
    pub max_ip_attempts: u32,
    pub ip_lockout_duration: Duration,
    /// Peers allowed to report the client address in forwarding headers
    pub trusted_proxies: Vec<IpAddr>,
}

impl Default for LockoutPolicy {
    /// 5 failures in 30 minutes lock a username for 15 minutes, doubling up
    /// to 24 hours; 20 failures lock an IP for an hour.
    fn default() -> Self {
        Self {
            max_attempts: 5,
            attempt_window: Duration::from_secs(30 * 60),
            lockout_duration: Duration::from_secs(15 * 60),
            progressive_lockout: true,
            max_lockout_duration: Duration::from_secs(24 * 60 * 60),
            track_by_ip: true,
            max_ip_attempts: 20,
            ip_lockout_duration: Duration::from_secs(60 * 60),
            trusted_proxies: Vec::new(),
        }
    }
}

impl LockoutPolicy {
    pub fn trusted_proxies(mut self, proxies: impl IntoIterator<Item = IpAddr>) -> Self {
        self.trusted_proxies = proxies.into_iter().collect();
        self
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn attempt_window(mut self, window: Duration) -> Self {
        self.attempt_window = window;
        self
    }

    pub fn lockout_duration(mut self, duration: Duration) -> Self {
        self.lockout_duration = duration;
        self
    }

    pub fn progressive_lockout(mut self, enabled: bool) -> Self {
        self.progressive_lockout = enabled;
        self
    }

    pub fn track_by_ip(mut self, enabled: bool) -> Self {
        self.track_by_ip = enabled;
        self
    }

    pub fn max_ip_attempts(mut self, attempts: u32) -> Self {
        self.max_ip_attempts = attempts.max(1);
        self
    }

    pub fn ip_lockout_duration(mut self, duration: Duration) -> Self {
        self.ip_lockout_duration = duration;
        self
    }

    /// Length of the `nth` lockout (1-based) for one username.
    pub fn lockout_duration_for(&self, nth: u32) -> Duration {
        if !self.progressive_lockout || nth <= 1 {
            return self.lockout_duration;
        }

        let factor = 1u32.checked_shl(nth - 1).unwrap_or(u32::MAX);
        self.lockout_duration
            .checked_mul(factor)
            .unwrap_or(self.max_lockout_duration)
            .min(self.max_lockout_duration)
    }
}

// ============================================================================
// Attempt Records
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct AttemptRecord {
    /// Failures inside the window
    pub failures: Vec<Instant>,
    /// Lockouts so far, drives progressive duration
    pub lockout_count: u32,
    pub locked_until: Option<Instant>,
}

impl AttemptRecord {
    fn forget_before(&mut self, cutoff: Option<Instant>) {
        if let Some(cutoff) = cutoff {
            self.failures.retain(|&at| at > cutoff);
        }
    }

    fn lockout(&self, now: Instant) -> Option<LockoutInfo> {
        self.locked_until
            .filter(|&until| until > now)
            .map(|until| LockoutInfo {
                remaining: until - now,
                lockout_count: self.lockout_count,
            })
    }

    fn lock(&mut self, now: Instant, duration: Duration) {
        self.locked_until = Some(now + duration);
        self.lockout_count += 1;
        self.failures.clear();
    }

    fn is_idle(&self, now: Instant) -> bool {
        self.failures.is_empty() && self.lockout(now).is_none()
    }
}

/// An active lockout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockoutInfo {
    pub remaining: Duration,
    pub lockout_count: u32,
}

impl LockoutInfo {
    /// Remaining lock in whole seconds, rounded up.
    pub fn retry_after_secs(&self) -> u64 {
        let secs = self.remaining.as_secs();
        if self.remaining.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        }
    }
}

/// Outcome of [`LoginTracker::record_failure`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptResult {
    pub failed_count: u32,
    pub remaining_attempts: u32,
    /// Set when this failure locked the username
    pub lockout: Option<LockoutInfo>,
    /// Set when this failure locked the client IP
    pub ip_locked: bool,
}

// ============================================================================
// Login Tracker
// ============================================================================

/// Shared, cloneable failure tracker. Clones share state.
#[derive(Debug, Clone)]
pub struct LoginTracker {
    policy: Arc<LockoutPolicy>,
    by_user: Arc<RwLock<HashMap<String, AttemptRecord>>>,
    by_ip: Arc<RwLock<HashMap<String, AttemptRecord>>>,
}

impl Default for LoginTracker {
    fn default() -> Self {
        Self::new(LockoutPolicy::default())
    }
}

impl LoginTracker {
    pub fn new(policy: LockoutPolicy) -> Self {
        Self {
            policy: Arc::new(policy),
            by_user: Arc::new(RwLock::new(HashMap::new())),
            by_ip: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn policy(&self) -> &LockoutPolicy {
        &self.policy
    }

    pub fn check_lockout(&self, username: &str) -> Option<LockoutInfo> {
        self.by_user.read().get(username)?.lockout(Instant::now())
    }

    pub fn check_ip_lockout(&self, ip: &str) -> Option<LockoutInfo> {
        if !self.policy.track_by_ip {
            return None;
        }
        self.by_ip.read().get(ip)?.lockout(Instant::now())
    }

    /// Count a failed login and lock the username or IP once a threshold
    /// is reached.
    pub fn record_failure(&self, username: &str, ip: Option<&str>) -> AttemptResult {
        let now = Instant::now();
        let cutoff = now.checked_sub(self.policy.attempt_window);

        let (failed_count, lockout) = {
            let mut records = self.by_user.write();
            let record = records.entry(username.to_string()).or_default();
            record.forget_before(cutoff);
            record.failures.push(now);

            let failed_count = record.failures.len() as u32;
            let lockout = if failed_count >= self.policy.max_attempts && record.lockout(now).is_none() {
                let duration = self.policy.lockout_duration_for(record.lockout_count + 1);
                record.lock(now, duration);
                log_account_locked(username, failed_count, duration);
                record.lockout(now)
            } else {
                None
            };
            (failed_count, lockout)
        };

        let ip_locked = match ip {
            Some(ip) if self.policy.track_by_ip => self.record_ip_failure(ip, now, cutoff),
            _ => false,
        };

        let remaining_attempts = self.policy.max_attempts.saturating_sub(failed_count);
        log_login_failure(username, ip, failed_count, remaining_attempts);

        AttemptResult {
            failed_count,
            remaining_attempts,
            lockout,
            ip_locked,
        }
    }

    fn record_ip_failure(&self, ip: &str, now: Instant, cutoff: Option<Instant>) -> bool {
        let mut records = self.by_ip.write();
        let record = records.entry(ip.to_string()).or_default();
        record.forget_before(cutoff);
        record.failures.push(now);

        let failures = record.failures.len() as u32;
        if failures >= self.policy.max_ip_attempts && record.lockout(now).is_none() {
            record.lock(now, self.policy.ip_lockout_duration);
            log_ip_locked(ip, failures);
            true
        } else {
            false
        }
    }

    /// Clear failure counts after a successful login. The lockout count is
    /// kept so the next lockout is still progressive.
    pub fn record_success(&self, username: &str, ip: Option<&str>) {
        if let Some(record) = self.by_user.write().get_mut(username) {
            record.failures.clear();
        }

        if let Some(ip) = ip {
            if let Some(record) = self.by_ip.write().get_mut(ip) {
                record.failures.clear();
            }
        }
    }

    /// Lift a username lock (operator action).
    pub fn unlock(&self, username: &str) {
        if let Some(record) = self.by_user.write().get_mut(username) {
            record.locked_until = None;
            record.failures.clear();
            crate::security_event!(
                SecurityEvent::AccountUnlocked,
                identifier = %username,
                "Account unlocked"
            );
        }
    }

    pub fn attempt_info(&self, username: &str) -> Option<AttemptRecord> {
        self.by_user.read().get(username).cloned()
    }

    /// Drop records with no recent failures and no active lock. Run
    /// periodically, since usernames are attacker-chosen.
    pub fn cleanup(&self) {
        let now = Instant::now();
        let cutoff = now.checked_sub(self.policy.attempt_window);

        for map in [&self.by_user, &self.by_ip] {
            map.write().retain(|_, record| {
                record.forget_before(cutoff);
                !record.is_idle(now)
            });
        }
    }

    /// Number of tracked usernames and IPs.
    pub fn tracked(&self) -> (usize, usize) {
        (self.by_user.read().len(), self.by_ip.read().len())
    }
}

/// Address a login attempt is counted against.
///
/// Without a trusted proxy in front this is simply `peer`. When `peer` is a
/// trusted proxy, `X-Forwarded-For` is walked from the right, skipping
/// trusted hops, and the first other address wins; `X-Real-IP` is the
/// fallback. Unparseable header values are ignored.
pub fn client_ip(
    peer: Option<IpAddr>,
    headers: &HeaderMap,
    trusted_proxies: &[IpAddr],
) -> Option<IpAddr> {
    let peer = peer?;
    if !trusted_proxies.contains(&peer) {
        return Some(peer);
    }

    let forwarded = headers
        .get_all("x-forwarded-for")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|hop| hop.trim().parse::<IpAddr>().ok())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .find(|hop| !trusted_proxies.contains(hop));
    let real = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<IpAddr>().ok())
    };

    forwarded.or_else(real).or(Some(peer))
}

// ============================================================================
// Security Event Logging (AU-2, AU-3)
// ============================================================================

fn log_login_failure(username: &str, ip: Option<&str>, failed_count: u32, remaining: u32) {
    crate::security_event!(
        SecurityEvent::AuthenticationFailure,
        identifier = %username,
        ip_address = ip.unwrap_or("unknown"),
        failed_count = failed_count,
        remaining_attempts = remaining,
        "Login failed"
    );
}

fn log_account_locked(username: &str, failed_count: u32, duration: Duration) {
    crate::security_event!(
        SecurityEvent::AccountLocked,
        identifier = %username,
        failed_count = failed_count,
        lockout_duration_secs = duration.as_secs(),
        "Account locked due to failed login attempts"
    );
}

fn log_ip_locked(ip: &str, failed_count: u32) {
    crate::security_event!(
        SecurityEvent::BruteForceDetected,
        ip_address = %ip,
        failed_count = failed_count,
        "IP address locked due to excessive failed attempts"
    );
}
