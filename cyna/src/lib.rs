//! # CYNA
//!
//! Authentication and session core for the CYNA service-catalog API.
//!
//! The catalog, billing and ticketing tables are plain CRUD reached through
//! parameterized SQL; this crate owns the part that decides who the caller is.
//!
//! ## Flow
//!
//! - **Login**: email + password (Argon2id), then a TOTP code when the account
//!   has the second factor switched on. Success persists a 24-hour session.
//! - **Bearer verification**: a presented token is resolved, in order, as a live
//!   session, an active API token, or the configured master secret.
//! - **Bootstrap**: on first start, one API token is provisioned if none exist.
//!
//! ## Core Modules
//!
//! - [`auth`]: Login, bearer verification, 2FA enrollment, token generation
//! - [`db`]: Connection pool, repository traits and their PostgreSQL and in-memory implementations
//!
//! ## Example
//!
//! ```
//! use cyna::{AuthManager, db::MemoryAuthStore};
//! use std::sync::Arc;
//!
//! let auth = AuthManager::new(
//!     Arc::new(MemoryAuthStore::new()),
//!     "pepper_for_docs_only".to_string(),
//!     None,
//! );
//! assert!(!auth.has_master_secret());
//! ```

/// Login, sessions, API tokens and two-factor authentication.
pub mod auth;
pub use auth::{AuthError, AuthManager, AuthResult, AuthScheme, Identity, LoginOutcome};

/// Connection pool and storage backends.
pub mod db;
