//! Human-readable configuration values
//!
//! Sizes (`64KB`, `10MB`) and durations (`30s`, `15m`, `24h`, `7d`) as they
//! appear in environment variables. Unlike a silent fallback, a value that
//! does not parse is reported so startup can fail with the offending input.

use std::time::Duration;

/// A configuration value that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid size '{0}' (expected e.g. 512B, 64KB, 10MB, 1GB)")]
    Size(String),

    #[error("invalid duration '{0}' (expected e.g. 100ms, 30s, 15m, 24h, 7d)")]
    Duration(String),
}

/// Parse a size such as `"64KB"` into bytes.
///
/// Units are binary (1KB = 1024 bytes) and case-insensitive. A bare number
/// is taken as bytes.
pub fn parse_size(input: &str) -> Result<usize, ParseError> {
    let normalized = input.trim().to_ascii_uppercase();
    let (digits, multiplier) = split_unit(
        &normalized,
        &[("GB", 1 << 30), ("MB", 1 << 20), ("KB", 1 << 10), ("B", 1)],
        1,
    );

    digits
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_mul(multiplier))
        .ok_or_else(|| ParseError::Size(input.to_string()))
}

/// Parse a duration such as `"30s"` or `"24h"`.
///
/// A bare number is taken as seconds.
pub fn parse_duration(input: &str) -> Result<Duration, ParseError> {
    let normalized = input.trim().to_ascii_lowercase();
    let (digits, millis) = split_unit(
        &normalized,
        &[
            ("ms", 1),
            ("s", 1_000),
            ("m", 60_000),
            ("h", 3_600_000),
            ("d", 86_400_000),
        ],
        1_000,
    );

    digits
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(millis))
        .map(Duration::from_millis)
        .ok_or_else(|| ParseError::Duration(input.to_string()))
}

/// Split a trailing unit off `value`. Units are tried in order, so longer
/// suffixes sharing a last letter (`ms` before `s`) must come first.
fn split_unit<'a, T: Copy>(value: &'a str, units: &[(&str, T)], bare: T) -> (&'a str, T) {
    units
        .iter()
        .find_map(|(suffix, factor)| value.strip_suffix(*suffix).map(|rest| (rest.trim(), *factor)))
        .unwrap_or((value, bare))
}
