//! Content checksums for cached documents
//!
//! A cached progress document is stored inside an envelope carrying a
//! checksum of its canonical JSON form. On read, a recomputed checksum that
//! does not match means the cache is unusable and is treated as absent.
//!
//! The hash is the 32-bit shift-accumulate digest over the canonical
//! (sorted-key) JSON string, rendered in signed lowercase base-36. It
//! detects corruption, not tampering.

use serde::Serialize;

use crate::shared::error::SharedError;

/// Compute the checksum of a value's canonical JSON form
///
/// The value is first converted to a `serde_json::Value`, which stores
/// object keys in sorted order, so logically equal values produce the same
/// checksum regardless of field declaration order.
pub fn checksum<T: Serialize>(value: &T) -> Result<String, SharedError> {
    let canonical = serde_json::to_value(value)?;
    let json = serde_json::to_string(&canonical)?;

    let mut hash: i32 = 0;
    for &byte in json.as_bytes() {
        hash = hash.wrapping_shl(5).wrapping_sub(hash).wrapping_add(byte as i32);
    }

    if hash < 0 {
        Ok(format!("-{}", to_base36(hash.unsigned_abs())))
    } else {
        Ok(to_base36(hash as u32))
    }
}

/// True when `expected` matches the value's current checksum
pub fn verify<T: Serialize>(value: &T, expected: &str) -> Result<bool, SharedError> {
    Ok(checksum(value)? == expected)
}

fn to_base36(mut n: u32) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while n > 0 {
        let digit = std::char::from_digit(n % 36, 36).unwrap_or('0');
        digits.push(digit);
        n /= 36;
    }
    digits.iter().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::progress::{PendingUpdate, ProgressDocument};
    use chrono::TimeZone;

    #[test]
    fn test_checksum_is_stable_for_equal_values() {
        let ts = chrono::Utc.timestamp_opt(100, 0).single().unwrap();
        let mut a = ProgressDocument::new();
        a.apply(&PendingUpdate::add_to_path("x", true).with_timestamp(ts));
        let b = a.clone();

        assert_eq!(checksum(&a).unwrap(), checksum(&b).unwrap());
    }

    #[test]
    fn test_checksum_ignores_key_order() {
        let a = serde_json::json!({"alpha": 1, "beta": 2});
        let b = serde_json::json!({"beta": 2, "alpha": 1});
        assert_eq!(checksum(&a).unwrap(), checksum(&b).unwrap());
    }

    #[test]
    fn test_checksum_changes_with_content() {
        let a = serde_json::json!({"items": [1, 2, 3]});
        let b = serde_json::json!({"items": [1, 2, 4]});
        assert_ne!(checksum(&a).unwrap(), checksum(&b).unwrap());
    }

    #[test]
    fn test_verify_detects_mismatch() {
        let value = serde_json::json!({"a": 1});
        let sum = checksum(&value).unwrap();
        assert!(verify(&value, &sum).unwrap());
        assert!(!verify(&value, "not-the-checksum").unwrap());
    }

    #[test]
    fn test_known_digest() {
        // "\"7\"" hashes to 34413, which is "qjx" in base-36
        assert_eq!(checksum(&serde_json::json!("7")).unwrap(), "qjx");
    }

    #[test]
    fn test_base36_rendering() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
    }

    #[test]
    fn test_digest_charset() {
        let sum = checksum(&serde_json::json!({"items": ["a", "b"]})).unwrap();
        assert!(sum
            .strip_prefix('-')
            .unwrap_or(&sum)
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }
}
