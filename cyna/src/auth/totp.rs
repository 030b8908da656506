//! Time-based one-time codes (RFC 6238: SHA-1, 6 digits, 30 s step).

use totp_rs::{Algorithm, Secret, TOTP};

use super::{
    errors::{AuthError, AuthResult},
    models::TwoFactorSetup,
    token::random_bytes,
};

/// Issuer shown by authenticator apps
pub const ISSUER: &str = "CYNA";

/// Code length
pub const DIGITS: usize = 6;

/// Step length in seconds
pub const STEP_SECS: u64 = 30;

/// Steps of clock drift tolerated either side of the current one
pub const SKEW_STEPS: u8 = 1;

/// Size of generated secrets (160 bits)
pub const SECRET_BYTES: usize = 20;

fn build(secret: Vec<u8>, account_name: &str) -> AuthResult<TOTP> {
    TOTP::new(
        Algorithm::SHA1,
        DIGITS,
        SKEW_STEPS,
        STEP_SECS,
        secret,
        Some(ISSUER.to_string()),
        account_name.to_string(),
    )
    .map_err(|_| AuthError::InvalidTwoFactorSecret)
}

/// Decode a base32 secret as stored on the account or typed by a user.
fn decode(secret: &str) -> AuthResult<Vec<u8>> {
    let normalized: String = secret
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect();

    Secret::Encoded(normalized)
        .to_bytes()
        .map_err(|_| AuthError::InvalidTwoFactorSecret)
}

/// Check `code` against `secret` at `unix_time`, allowing ±[`SKEW_STEPS`].
///
/// # Errors
///
/// * `AuthError::InvalidTwoFactorSecret` - Secret is not valid base32 or is shorter than 128 bits
pub fn verify_code(secret: &str, code: &str, unix_time: u64) -> AuthResult<bool> {
    let totp = build(decode(secret)?, "")?;
    Ok(totp.check(code.trim(), unix_time))
}

/// Code for `secret` at `unix_time`.
pub fn code_at(secret: &str, unix_time: u64) -> AuthResult<String> {
    Ok(build(decode(secret)?, "")?.generate(unix_time))
}

/// Generate a fresh secret with its provisioning URL and QR code.
pub fn generate_setup(account_name: &str) -> AuthResult<TwoFactorSetup> {
    let raw = random_bytes::<SECRET_BYTES>()?;
    // A freshly drawn secret is always valid, so a failure here is the label.
    let totp = build(raw.to_vec(), account_name).map_err(|_| {
        log::error!("Cannot build authenticator label for account {account_name:?}");
        AuthError::TwoFactorSetupFailed
    })?;

    let qr = totp.get_qr_base64().map_err(|e| {
        log::error!("QR code rendering failed: {e}");
        AuthError::TwoFactorSetupFailed
    })?;

    Ok(TwoFactorSetup {
        secret: totp.get_secret_base32(),
        otpauth_url: totp.get_url(),
        qr_code: format!("data:image/png;base64,{qr}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 4648 base32 of "12345678901234567890", the RFC 6238 test key.
    const RFC_SECRET: &str = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ";

    #[test]
    fn test_rfc6238_vector() {
        // RFC 6238 Appendix B, SHA-1, T = 59 -> 94287082 (last six digits)
        assert_eq!(code_at(RFC_SECRET, 59).unwrap(), "287082");
    }

    #[test]
    fn test_adjacent_steps_accepted() {
        let now = 1_700_000_000;
        let previous = code_at(RFC_SECRET, now - STEP_SECS).unwrap();
        let next = code_at(RFC_SECRET, now + STEP_SECS).unwrap();

        assert!(verify_code(RFC_SECRET, &previous, now).unwrap());
        assert!(verify_code(RFC_SECRET, &next, now).unwrap());
    }

    #[test]
    fn test_distant_step_rejected() {
        let now = 1_700_000_000;
        let stale = code_at(RFC_SECRET, now - 3 * STEP_SECS).unwrap();
        assert!(!verify_code(RFC_SECRET, &stale, now).unwrap());
    }

    #[test]
    fn test_unusable_label_is_a_setup_failure() {
        let err = generate_setup("a:b@example.com").unwrap_err();
        assert!(matches!(err, AuthError::TwoFactorSetupFailed));
        assert!(err.is_internal());
    }

    #[test]
    fn test_lowercase_and_spaced_secret() {
        let now = 1_700_000_000;
        let code = code_at(RFC_SECRET, now).unwrap();
        assert!(verify_code("gezd gnbv gy3t qojq gezd gnbv gy3t qojq", &code, now).unwrap());
    }

    #[test]
    fn test_short_secret_rejected() {
        assert!(matches!(
            verify_code("JBSWY3DP", "123456", 0),
            Err(AuthError::InvalidTwoFactorSecret)
        ));
    }

    #[test]
    fn test_generate_setup() {
        let setup = generate_setup("alice@example.com").unwrap();
        assert_eq!(setup.secret.len(), 32);
        assert!(setup.otpauth_url.starts_with("otpauth://totp/"));
        assert!(setup.otpauth_url.contains("issuer=CYNA"));
        assert!(setup.qr_code.starts_with("data:image/png;base64,"));

        let now = 1_700_000_000;
        let code = code_at(&setup.secret, now).unwrap();
        assert!(verify_code(&setup.secret, &code, now).unwrap());
    }
}
