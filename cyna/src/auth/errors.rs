//! Authentication error types.

use thiserror::Error;

/// Authentication errors
#[derive(Debug, Error)]
pub enum AuthError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Password hashing failed
    #[error("Password hashing failed")]
    HashingFailed,

    /// Unknown email or wrong password. Both read the same on purpose.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Invalid 2FA code
    #[error("Invalid 2FA code")]
    InvalidTwoFactorCode,

    /// Bearer token did not resolve to any account
    #[error("Unauthorized")]
    Unauthorized,

    /// Email already exists
    #[error("Email already exists")]
    EmailTaken,

    /// Email missing or malformed
    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    /// Password too weak
    #[error("Password too weak: {0}")]
    WeakPassword(String),

    /// TOTP secret could not be decoded or is too short
    #[error("Invalid two-factor secret")]
    InvalidTwoFactorSecret,

    /// QR code rendering for enrollment failed
    #[error("Two-factor setup failed")]
    TwoFactorSetupFailed,

    /// Account not found
    #[error("Account not found")]
    AccountNotFound,

    /// OS random source unavailable
    #[error("Secure random source unavailable")]
    EntropyUnavailable,
}

impl AuthError {
    /// Get a client-safe error message that doesn't leak sensitive information
    ///
    /// Store, hashing and entropy failures collapse to a generic message; the
    /// detail belongs in the server log.
    pub fn client_message(&self) -> String {
        match self {
            AuthError::Database(_)
            | AuthError::HashingFailed
            | AuthError::EntropyUnavailable
            | AuthError::TwoFactorSetupFailed => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }

    /// Whether the failure is on the server side rather than the caller's
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            AuthError::Database(_)
                | AuthError::HashingFailed
                | AuthError::EntropyUnavailable
                | AuthError::TwoFactorSetupFailed
        )
    }
}

/// Result type for authentication operations
pub type AuthResult<T> = Result<T, AuthError>;
