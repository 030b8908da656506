//! Repository trait definitions for testability and dependency injection.
//!
//! The auth core talks to storage only through these traits, so the same
//! logic runs against PostgreSQL in production and an in-memory store in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::auth::{Account, ApiToken, AuthResult, NewAccount, ProfileUpdate, Session, UserId};

/// Account lookups and the few account writes the auth core performs
#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Insert an account and return the stored row
    async fn create_account(&self, account: &NewAccount) -> AuthResult<Account>;

    /// Find account by exact (case-sensitive) email
    async fn find_account_by_email(&self, email: &str) -> AuthResult<Option<Account>>;

    /// Find account by ID
    async fn find_account_by_id(&self, user_id: UserId) -> AuthResult<Option<Account>>;

    /// Whether an account uses this email
    async fn email_exists(&self, email: &str) -> AuthResult<bool>;

    /// Lowest-ID account flagged admin
    async fn first_admin_id(&self) -> AuthResult<Option<UserId>>;

    /// Lowest-ID account of any role
    async fn any_account_id(&self) -> AuthResult<Option<UserId>>;

    /// Update last login timestamp
    async fn update_last_login(&self, user_id: UserId, at: DateTime<Utc>) -> AuthResult<()>;

    /// Overwrite email, names and phone; fails with `EmailTaken` on a clash
    async fn update_profile(
        &self,
        user_id: UserId,
        update: &ProfileUpdate,
    ) -> AuthResult<Account>;

    /// Set or clear the TOTP secret and its gate
    async fn set_two_factor(
        &self,
        user_id: UserId,
        secret: Option<&str>,
        enabled: bool,
    ) -> AuthResult<()>;
}

/// Trait for session repository operations
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Persist a new session
    async fn insert_session(&self, session: &Session) -> AuthResult<()>;

    /// Session with this token that is valid and not expired at `now`
    async fn find_active_session(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<Option<Session>>;

    /// Flip the validity flag off
    async fn invalidate_session(&self, token: &str) -> AuthResult<()>;
}

/// Trait for API token repository operations
#[async_trait]
pub trait ApiTokenRepository: Send + Sync {
    /// Number of API tokens, active or not
    async fn count_api_tokens(&self) -> AuthResult<i64>;

    /// Persist a new API token
    async fn insert_api_token(&self, token: &ApiToken) -> AuthResult<()>;

    /// Token with this key, if it is active
    async fn find_active_api_token(&self, key: &str) -> AuthResult<Option<ApiToken>>;

    /// Record a use of the token
    async fn touch_api_token(&self, key: &str, at: DateTime<Utc>) -> AuthResult<()>;
}

/// Everything the auth core needs from storage
pub trait AuthStore: AccountRepository + SessionRepository + ApiTokenRepository {}

impl<T> AuthStore for T where T: AccountRepository + SessionRepository + ApiTokenRepository {}
