//! Constant-time comparison
//!
//! Usernames and plaintext passwords are never compared with `==`, so a
//! mismatch takes the same time wherever it occurs.

use subtle::ConstantTimeEq;

/// Compare two byte slices without an early exit on the first mismatch.
///
/// Slices of different length compare unequal. The length itself is not
/// treated as secret.
///
/// ```rust
/// use itemguard::constant_time_eq;
///
/// assert!(constant_time_eq(b"tag", b"tag"));
/// assert!(!constant_time_eq(b"tag", b"tab"));
/// ```
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

/// String form of [`constant_time_eq`].
pub fn constant_time_str_eq(a: &str, b: &str) -> bool {
    constant_time_eq(a.as_bytes(), b.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"hello", b"hello"));
        assert!(!constant_time_eq(b"hello", b"world"));
        assert!(!constant_time_eq(b"short", b"longer"));
        assert!(constant_time_eq(b"", b""));
    }

    #[test]
    fn test_constant_time_str_eq() {
        assert!(constant_time_str_eq("testuser", "testuser"));
        assert!(!constant_time_str_eq("testuser", "testUser"));
    }
}
