//! Admin password hashing.
//!
//! Stored form is `salt:hexDigest` where `salt` is 16 random bytes rendered
//! as 32 hex chars and the digest is PBKDF2-HMAC-SHA512 (10k rounds, 64-byte
//! output) keyed with the hex salt string. Existing credentials written in
//! this format by earlier deployments verify unchanged.

use rand::RngCore;
use sha2::Sha512;

/// Salt byte length before hex encoding.
const SALT_BYTES: usize = 16;

/// PBKDF2 iteration count.
const PBKDF2_ITERATIONS: u32 = 10_000;

/// Derived key length in bytes (128 hex chars).
const DERIVED_KEY_BYTES: usize = 64;

/// Hash a password with a fresh random salt.
pub fn hash_password(plaintext: &str) -> String {
    let salt = generate_salt();
    let digest = derive(plaintext, &salt);
    format!("{salt}:{digest}")
}

/// Check a password against a stored `salt:hexDigest` value.
/// A malformed stored value never verifies.
pub fn verify_password(plaintext: &str, stored: &str) -> bool {
    let Some((salt, digest)) = stored.split_once(':') else {
        return false;
    };
    if salt.is_empty() || digest.is_empty() {
        return false;
    }
    let attempt = derive(plaintext, salt);
    constant_time_eq(attempt.as_bytes(), digest.as_bytes())
}

fn derive(plaintext: &str, salt: &str) -> String {
    let mut key = [0u8; DERIVED_KEY_BYTES];
    pbkdf2::pbkdf2_hmac::<Sha512>(plaintext.as_bytes(), salt.as_bytes(), PBKDF2_ITERATIONS, &mut key);
    hex::encode(key)
}

/// Generate a random salt (hex-encoded).
fn generate_salt() -> String {
    let mut bytes = [0u8; SALT_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Constant-time byte comparison to prevent timing attacks.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let stored = hash_password("teatime");
        assert!(verify_password("teatime", &stored));
        assert!(!verify_password("coffeetime", &stored));
    }

    #[test]
    fn hash_is_salted_per_call() {
        let a = hash_password("teatime");
        let b = hash_password("teatime");
        assert_ne!(a, b);
        assert!(verify_password("teatime", &a));
        assert!(verify_password("teatime", &b));
    }

    #[test]
    fn stored_format_is_hex_salt_and_digest() {
        let stored = hash_password("teatime");
        let (salt, digest) = stored.split_once(':').unwrap();
        assert_eq!(salt.len(), SALT_BYTES * 2);
        assert_eq!(digest.len(), DERIVED_KEY_BYTES * 2);
        assert!(stored
            .chars()
            .all(|c| c == ':' || (c.is_ascii_hexdigit() && !c.is_ascii_uppercase())));
    }

    #[test]
    fn verifies_known_credential() {
        // Produced by PBKDF2-HMAC-SHA512("teatime", "00112233445566778899aabbccddeeff", 10000, 64).
        let stored = "00112233445566778899aabbccddeeff:\
            f91e8bf65f927eec27eddbd603f2f4aff06da7e879046c9f082267761b6c3be3\
            dce174ed6d5fe25f0496ebbce466eeea19f7723c6c2e367b6cc52eeda648b75a";
        assert!(verify_password("teatime", stored));
        assert!(!verify_password("Teatime", stored));
    }

    #[test]
    fn malformed_stored_values_never_verify() {
        assert!(!verify_password("teatime", ""));
        assert!(!verify_password("teatime", "no-separator"));
        assert!(!verify_password("teatime", ":digest-only"));
        assert!(!verify_password("teatime", "salt-only:"));
    }

    #[test]
    fn constant_time_eq_works() {
        assert!(constant_time_eq(b"hello", b"hello"));
        assert!(!constant_time_eq(b"hello", b"world"));
        assert!(!constant_time_eq(b"short", b"longer"));
    }
}
