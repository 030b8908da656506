//! In-memory implementation of the auth repositories.
//!
//! Used by tests and local demos. Every map sits behind its own mutex; a
//! poisoned lock is recovered rather than propagated since the data is plain.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::repository::{AccountRepository, ApiTokenRepository, SessionRepository};
use crate::auth::{
    Account, ApiToken, AuthError, AuthResult, NewAccount, ProfileUpdate, Session, UserId,
};

/// Auth store kept entirely in process memory
pub struct MemoryAuthStore {
    accounts: Mutex<HashMap<UserId, Account>>,
    sessions: Mutex<HashMap<String, Session>>,
    api_tokens: Mutex<HashMap<String, ApiToken>>,
    next_id: Mutex<UserId>,
    fail_touches: AtomicBool,
}

impl Default for MemoryAuthStore {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryAuthStore {
    pub fn new() -> Self {
        Self {
            accounts: Mutex::new(HashMap::new()),
            sessions: Mutex::new(HashMap::new()),
            api_tokens: Mutex::new(HashMap::new()),
            next_id: Mutex::new(1),
            fail_touches: AtomicBool::new(false),
        }
    }

    /// Start account IDs at `id` instead of 1
    pub fn with_next_id(self, id: UserId) -> Self {
        *lock(&self.next_id) = id;
        self
    }

    /// Make every last-used update fail, as a dropped connection would
    pub fn fail_api_token_touches(&self, fail: bool) {
        self.fail_touches.store(fail, Ordering::SeqCst);
    }

    /// Stored session, whatever its state
    pub fn session(&self, token: &str) -> Option<Session> {
        lock(&self.sessions).get(token).cloned()
    }

    /// Number of stored sessions
    pub fn session_count(&self) -> usize {
        lock(&self.sessions).len()
    }

    /// Stored API token, whatever its state
    pub fn api_token(&self, key: &str) -> Option<ApiToken> {
        lock(&self.api_tokens).get(key).cloned()
    }

    /// Flip an API token's active flag
    pub fn set_api_token_active(&self, key: &str, active: bool) {
        if let Some(token) = lock(&self.api_tokens).get_mut(key) {
            token.active = active;
        }
    }

    /// Change an account's role
    pub fn set_role(&self, user_id: UserId, role: &str) {
        if let Some(account) = lock(&self.accounts).get_mut(&user_id) {
            account.role = role.to_string();
        }
    }
}

#[async_trait]
impl AccountRepository for MemoryAuthStore {
    async fn create_account(&self, account: &NewAccount) -> AuthResult<Account> {
        let mut accounts = lock(&self.accounts);
        if accounts.values().any(|a| a.email == account.email) {
            return Err(AuthError::EmailTaken);
        }

        let id = {
            let mut next_id = lock(&self.next_id);
            let id = *next_id;
            *next_id += 1;
            id
        };

        let stored = Account {
            id,
            email: account.email.clone(),
            password_hash: account.password_hash.clone(),
            first_name: account.first_name.clone(),
            last_name: account.last_name.clone(),
            phone: account.phone.clone(),
            role: account.role.clone(),
            status: account.status.clone(),
            totp_secret: None,
            totp_enabled: false,
            created_at: Utc::now(),
            last_login: None,
        };
        accounts.insert(id, stored.clone());
        Ok(stored)
    }

    async fn find_account_by_email(&self, email: &str) -> AuthResult<Option<Account>> {
        Ok(lock(&self.accounts)
            .values()
            .find(|a| a.email == email)
            .cloned())
    }

    async fn find_account_by_id(&self, user_id: UserId) -> AuthResult<Option<Account>> {
        Ok(lock(&self.accounts).get(&user_id).cloned())
    }

    async fn email_exists(&self, email: &str) -> AuthResult<bool> {
        Ok(lock(&self.accounts).values().any(|a| a.email == email))
    }

    async fn first_admin_id(&self) -> AuthResult<Option<UserId>> {
        Ok(lock(&self.accounts)
            .values()
            .filter(|a| a.is_admin())
            .map(|a| a.id)
            .min())
    }

    async fn any_account_id(&self) -> AuthResult<Option<UserId>> {
        Ok(lock(&self.accounts).keys().copied().min())
    }

    async fn update_last_login(&self, user_id: UserId, at: DateTime<Utc>) -> AuthResult<()> {
        if let Some(account) = lock(&self.accounts).get_mut(&user_id) {
            account.last_login = Some(at);
        }
        Ok(())
    }

    async fn update_profile(
        &self,
        user_id: UserId,
        update: &ProfileUpdate,
    ) -> AuthResult<Account> {
        let mut accounts = lock(&self.accounts);
        if accounts
            .values()
            .any(|a| a.id != user_id && a.email == update.email)
        {
            return Err(AuthError::EmailTaken);
        }

        let account = accounts
            .get_mut(&user_id)
            .ok_or(AuthError::AccountNotFound)?;
        account.email = update.email.clone();
        account.first_name = update.first_name.clone();
        account.last_name = update.last_name.clone();
        account.phone = update.phone.clone();
        Ok(account.clone())
    }

    async fn set_two_factor(
        &self,
        user_id: UserId,
        secret: Option<&str>,
        enabled: bool,
    ) -> AuthResult<()> {
        let mut accounts = lock(&self.accounts);
        let account = accounts
            .get_mut(&user_id)
            .ok_or(AuthError::AccountNotFound)?;
        account.totp_secret = secret.map(str::to_string);
        account.totp_enabled = enabled;
        Ok(())
    }
}

#[async_trait]
impl SessionRepository for MemoryAuthStore {
    async fn insert_session(&self, session: &Session) -> AuthResult<()> {
        lock(&self.sessions).insert(session.token.clone(), session.clone());
        Ok(())
    }

    async fn find_active_session(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<Option<Session>> {
        Ok(lock(&self.sessions)
            .get(token)
            .filter(|s| s.is_usable_at(now))
            .cloned())
    }

    async fn invalidate_session(&self, token: &str) -> AuthResult<()> {
        if let Some(session) = lock(&self.sessions).get_mut(token) {
            session.valid = false;
        }
        Ok(())
    }
}

#[async_trait]
impl ApiTokenRepository for MemoryAuthStore {
    async fn count_api_tokens(&self) -> AuthResult<i64> {
        Ok(lock(&self.api_tokens).len() as i64)
    }

    async fn insert_api_token(&self, token: &ApiToken) -> AuthResult<()> {
        lock(&self.api_tokens).insert(token.key.clone(), token.clone());
        Ok(())
    }

    async fn find_active_api_token(&self, key: &str) -> AuthResult<Option<ApiToken>> {
        Ok(lock(&self.api_tokens)
            .get(key)
            .filter(|t| t.active)
            .cloned())
    }

    async fn touch_api_token(&self, key: &str, at: DateTime<Utc>) -> AuthResult<()> {
        if self.fail_touches.load(Ordering::SeqCst) {
            return Err(AuthError::Database(sqlx::Error::PoolTimedOut));
        }
        if let Some(token) = lock(&self.api_tokens).get_mut(key) {
            token.last_used = Some(at);
        }
        Ok(())
    }
}
