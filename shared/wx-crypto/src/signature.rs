//! SHA1 Callback Signing
//!
//! The platform signs every callback (and expects every reply to be signed)
//! with SHA1 over the lexicographically sorted concatenation of the token,
//! timestamp, nonce, and payload. The payload is the echo string during the
//! URL-verification handshake and the base64 ciphertext everywhere else.

use sha1::{Digest, Sha1};

/// Compute the hex-encoded callback signature.
///
/// Deterministic and pure: the four inputs are sorted lexicographically,
/// concatenated, and hashed with SHA1.
#[must_use]
pub fn compute_signature(token: &str, timestamp: &str, nonce: &str, payload: &str) -> String {
    let mut parts = [token, timestamp, nonce, payload];
    parts.sort_unstable();

    let mut hasher = Sha1::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Compare two signature strings in constant time.
///
/// Length is checked first; equal-length inputs are compared with an XOR
/// fold so the comparison does not short-circuit on the first difference.
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    a.len() == b.len()
        && a.as_bytes()
            .iter()
            .zip(b.as_bytes())
            .fold(0u8, |acc, (x, y)| acc | (x ^ y))
            == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_deterministic() {
        let a = compute_signature("token", "1409735669", "nonce123", "payload");
        let b = compute_signature("token", "1409735669", "nonce123", "payload");
        assert_eq!(a, b);
        assert_eq!(a.len(), 40); // SHA1 = 20 bytes = 40 hex chars
    }

    #[test]
    fn signature_ignores_argument_order() {
        // Sorting happens over values, so swapping which value arrives in
        // which position must not change the digest.
        let a = compute_signature("aaa", "bbb", "ccc", "ddd");
        let b = compute_signature("ddd", "ccc", "bbb", "aaa");
        assert_eq!(a, b);
    }

    #[test]
    fn single_character_mutation_flips_result() {
        let sig = compute_signature("token", "1409735669", "nonce123", "payload");
        assert_ne!(
            sig,
            compute_signature("token", "1409735669", "nonce123", "paylbad")
        );
        assert_ne!(
            sig,
            compute_signature("token", "1409735668", "nonce123", "payload")
        );
        assert_ne!(
            sig,
            compute_signature("token", "1409735669", "nonce124", "payload")
        );
    }

    #[test]
    fn constant_time_eq_basics() {
        assert!(constant_time_eq("abcdef", "abcdef"));
        assert!(!constant_time_eq("abcdef", "abcdeg"));
        assert!(!constant_time_eq("abcdef", "abcde"));
        assert!(constant_time_eq("", ""));
    }
}
