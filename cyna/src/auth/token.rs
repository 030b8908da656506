//! Opaque token generation.

use rand::{TryRngCore, rngs::OsRng};
use sha2::{Digest, Sha256};

use super::errors::{AuthError, AuthResult};

/// Random bytes behind every session token and API key (64 hex chars).
pub const TOKEN_BYTES: usize = 32;

/// Fill `N` bytes from the OS random source.
///
/// # Errors
///
/// * `AuthError::EntropyUnavailable` - The OS source failed; no fallback is tried
pub fn random_bytes<const N: usize>() -> AuthResult<[u8; N]> {
    let mut buf = [0u8; N];
    OsRng.try_fill_bytes(&mut buf).map_err(|e| {
        log::error!("OS random source failed: {e}");
        AuthError::EntropyUnavailable
    })?;
    Ok(buf)
}

/// Generate a hex-encoded token of [`TOKEN_BYTES`] random bytes.
pub fn generate_token() -> AuthResult<String> {
    Ok(hex::encode(random_bytes::<TOKEN_BYTES>()?))
}

/// Short label for a presented token that is safe to write to logs.
pub fn fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    hex::encode(&digest[..6])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_token_is_fixed_width_hex() {
        let token = generate_token().unwrap();
        assert_eq!(token.len(), TOKEN_BYTES * 2);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_tokens_never_repeat() {
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            assert!(seen.insert(generate_token().unwrap()), "duplicate token");
        }
    }

    #[test]
    fn test_fingerprint_hides_token() {
        let token = "0123456789abcdef0123456789abcdef";
        let fp = fingerprint(token);
        assert_eq!(fp.len(), 12);
        assert!(!token.contains(&fp));
        assert_eq!(fp, fingerprint(token));
    }
}
