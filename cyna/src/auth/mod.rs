//! Authentication module providing login, session issuance and bearer-token verification.
//!
//! This module implements:
//! - Argon2id password hashing with server-side pepper
//! - Opaque session tokens (24-hour expiry, stored server-side)
//! - Long-lived API tokens with best-effort last-used tracking
//! - An optional master secret acting as the first admin account
//! - Two-factor authentication (TOTP) with enrollment
//!
//! ## Example
//!
//! ```no_run
//! use cyna::auth::{AuthManager, LoginOutcome, LoginRequest};
//! use cyna::db::Database;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::new(&Default::default()).await?;
//!     let auth = AuthManager::new(
//!         Arc::new(db.auth_store()),
//!         "secret_pepper_value".to_string(),
//!         None,
//!     );
//!
//!     let request = LoginRequest {
//!         email: "alice@example.com".to_string(),
//!         password: "correct-horse".to_string(),
//!         totp_code: None,
//!     };
//!
//!     if let LoginOutcome::Authenticated(grant) = auth.login(request).await? {
//!         let identity = auth.authenticate(&grant.token).await?;
//!         println!("Logged in as account {}", identity.user_id);
//!     }
//!     Ok(())
//! }
//! ```

pub mod errors;
pub mod manager;
pub mod models;
pub mod token;
pub mod totp;

pub use errors::{AuthError, AuthResult};
pub use manager::AuthManager;
pub use models::{
    Account, AccountProfile, ApiToken, AuthScheme, Identity, LoginOutcome, LoginRequest,
    NewAccount, ProfileUpdate, RegisterRequest, Session, SessionGrant, TwoFactorSetup, UserId,
};
