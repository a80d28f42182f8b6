//! Password hashing.

use bcrypt::{hash, verify, DEFAULT_COST};

use crate::error::{AuthError, AuthResult};

/// Bcrypt only keys off the first 72 bytes of input. Truncate explicitly,
/// on a character boundary, so hashing and verification agree on exactly
/// which prefix was used.
const BCRYPT_MAX_BYTES: usize = 72;

fn truncated(password: &str) -> &str {
    if password.len() <= BCRYPT_MAX_BYTES {
        return password;
    }
    let mut end = BCRYPT_MAX_BYTES;
    while !password.is_char_boundary(end) {
        end -= 1;
    }
    &password[..end]
}

pub fn hash_password(password: &str) -> AuthResult<String> {
    hash(truncated(password), DEFAULT_COST).map_err(|_| AuthError::AuthenticationFailed)
}

/// Constant outcome on malformed stored hashes: verification failure, never
/// an error that would distinguish a corrupt row from a wrong password.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    verify(truncated(password), stored_hash).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_round_trip() {
        let hashed = hash_password("hunter2").unwrap();
        assert!(verify_password("hunter2", &hashed));
        assert!(!verify_password("hunter3", &hashed));
    }

    #[test]
    fn long_passwords_truncate_consistently() {
        let long = "a".repeat(200);
        let hashed = hash_password(&long).unwrap();
        // Bytes past the 72nd are not part of the key.
        let same_prefix = format!("{}{}", "a".repeat(72), "different-tail");
        assert!(verify_password(&long, &hashed));
        assert!(verify_password(&same_prefix, &hashed));
        assert!(!verify_password(&"b".repeat(200), &hashed));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        // 24 three-byte chars = 72 bytes; one more crosses the limit.
        let multibyte = "€".repeat(25);
        let hashed = hash_password(&multibyte).unwrap();
        assert!(verify_password(&multibyte, &hashed));
    }

    #[test]
    fn malformed_hash_is_just_a_mismatch() {
        assert!(!verify_password("anything", "not-a-bcrypt-hash"));
    }
}
