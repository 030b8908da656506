//! Authentication manager implementation.

use super::{
    errors::{AuthError, AuthResult},
    models::{
        AccountProfile, ApiToken, AuthScheme, DEFAULT_ROLE, DEFAULT_STATUS, Identity,
        LoginOutcome, LoginRequest, NewAccount, ProfileUpdate, RegisterRequest, Session,
        SessionGrant, TwoFactorSetup, UserId,
    },
    token::{fingerprint, generate_token},
    totp,
};
use crate::db::AuthStore;
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, OnceLock};
use subtle::ConstantTimeEq;

/// Lifetime of a session token
pub const SESSION_TTL_HOURS: i64 = 24;

/// Minimum accepted password length at registration
pub const MIN_PASSWORD_LEN: usize = 8;

/// Name given to the token provisioned on first boot
pub const BOOTSTRAP_TOKEN_NAME: &str = "System Token";

/// Permission scope of the token provisioned on first boot
pub const BOOTSTRAP_TOKEN_PERMISSIONS: &str = "all";

/// Authentication manager
#[derive(Clone)]
pub struct AuthManager {
    store: Arc<dyn AuthStore>,
    pepper: String,
    master_secret: Option<String>,
    session_duration: Duration,
    hash_params: Params,
    /// Verified against when the login email is unknown
    dummy_hash: OnceLock<String>,
}

impl AuthManager {
    /// Create a new authentication manager
    ///
    /// # Arguments
    ///
    /// * `store` - Backing store for accounts, sessions and API tokens
    /// * `pepper` - Server-side pepper for password hashing
    /// * `master_secret` - Optional static override credential; `None` or empty disables it
    pub fn new(store: Arc<dyn AuthStore>, pepper: String, master_secret: Option<String>) -> Self {
        Self {
            store,
            pepper,
            master_secret: master_secret.filter(|s| !s.is_empty()),
            session_duration: Duration::hours(SESSION_TTL_HOURS),
            hash_params: Params::default(),
            dummy_hash: OnceLock::new(),
        }
    }

    /// Override the Argon2 cost used for new hashes.
    ///
    /// Existing hashes carry their own parameters, so verification is unaffected.
    pub fn with_hash_params(mut self, params: Params) -> Self {
        self.hash_params = params;
        self
    }

    /// Whether a master secret is configured
    pub fn has_master_secret(&self) -> bool {
        self.master_secret.is_some()
    }

    /// Register a new account
    ///
    /// # Errors
    ///
    /// * `AuthError::InvalidEmail` - Email empty or without `@`
    /// * `AuthError::WeakPassword` - Password shorter than [`MIN_PASSWORD_LEN`]
    /// * `AuthError::EmailTaken` - Email already registered
    pub async fn register(&self, request: RegisterRequest) -> AuthResult<AccountProfile> {
        let email = request.email.trim().to_string();
        validate_email(&email)?;
        validate_password(&request.password)?;

        if self.store.email_exists(&email).await? {
            return Err(AuthError::EmailTaken);
        }

        let password_hash = self.hash_password(&request.password)?;
        let account = self
            .store
            .create_account(&NewAccount {
                email,
                password_hash,
                first_name: request.first_name,
                last_name: request.last_name,
                phone: request.phone,
                role: DEFAULT_ROLE.to_string(),
                status: DEFAULT_STATUS.to_string(),
            })
            .await?;

        log::info!("Registered account {}", account.id);
        Ok(account.profile())
    }

    /// Whether an account uses `email`
    pub async fn email_exists(&self, email: &str) -> AuthResult<bool> {
        self.store.email_exists(email).await
    }

    /// Log in with email, password and optional TOTP code
    ///
    /// # Errors
    ///
    /// * `AuthError::InvalidCredentials` - Unknown email or wrong password
    /// * `AuthError::InvalidTwoFactorCode` - 2FA is on and the code does not match
    pub async fn login(&self, request: LoginRequest) -> AuthResult<LoginOutcome> {
        self.login_at(request, Utc::now()).await
    }

    /// [`login`](Self::login) evaluated at a given instant.
    pub async fn login_at(
        &self,
        request: LoginRequest,
        now: DateTime<Utc>,
    ) -> AuthResult<LoginOutcome> {
        let Some(account) = self.store.find_account_by_email(&request.email).await? else {
            log::debug!("Login rejected: unknown email");
            if let Some(dummy) = self.dummy_hash() {
                let _ = self.verify_password(&request.password, dummy);
            }
            return Err(AuthError::InvalidCredentials);
        };

        if self
            .verify_password(&request.password, &account.password_hash)
            .is_err()
        {
            log::debug!("Login rejected: password mismatch for account {}", account.id);
            return Err(AuthError::InvalidCredentials);
        }

        if let Some(secret) = account.second_factor_secret() {
            let code = request
                .totp_code
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty());

            let Some(code) = code else {
                log::debug!("Login for account {} awaits a second factor", account.id);
                return Ok(LoginOutcome::TwoFactorRequired);
            };

            let accepted = match totp::verify_code(secret, code, unix_seconds(now)) {
                Ok(accepted) => accepted,
                Err(e) => {
                    log::error!("Stored 2FA secret for account {} is unusable: {e}", account.id);
                    false
                }
            };
            if !accepted {
                return Err(AuthError::InvalidTwoFactorCode);
            }
        }

        let grant = self.create_session(account.id, now).await?;

        if let Err(e) = self.store.update_last_login(account.id, now).await {
            log::warn!("Failed to record last login for account {}: {e}", account.id);
        }

        log::info!("Account {} logged in", account.id);
        Ok(LoginOutcome::Authenticated(grant))
    }

    /// Persist a new session for `user_id`
    async fn create_session(&self, user_id: UserId, now: DateTime<Utc>) -> AuthResult<SessionGrant> {
        let session = Session {
            token: generate_token()?,
            user_id,
            created_at: now,
            expires_at: now + self.session_duration,
            valid: true,
        };
        self.store.insert_session(&session).await?;

        Ok(SessionGrant {
            token: session.token,
            user_id,
            expires_at: session.expires_at,
        })
    }

    /// Resolve a bearer token to the calling account
    ///
    /// Tried in order: live session, active API token, master secret.
    ///
    /// # Errors
    ///
    /// * `AuthError::Unauthorized` - No mechanism accepted the token
    /// * `AuthError::Database` - The store could not be queried
    pub async fn authenticate(&self, token: &str) -> AuthResult<Identity> {
        self.authenticate_at(token, Utc::now()).await
    }

    /// [`authenticate`](Self::authenticate) evaluated at a given instant.
    pub async fn authenticate_at(&self, token: &str, now: DateTime<Utc>) -> AuthResult<Identity> {
        if token.is_empty() {
            return Err(AuthError::Unauthorized);
        }

        if let Some(session) = self.store.find_active_session(token, now).await? {
            return Ok(Identity {
                user_id: session.user_id,
                scheme: AuthScheme::Session,
            });
        }

        if let Some(api_token) = self.store.find_active_api_token(token).await? {
            self.record_api_token_use(token, now);
            return Ok(Identity {
                user_id: api_token.user_id,
                scheme: AuthScheme::ApiToken,
            });
        }

        if self.matches_master_secret(token) {
            let user_id = self.resolve_master_account().await?;
            return Ok(Identity {
                user_id,
                scheme: AuthScheme::MasterSecret,
            });
        }

        log::warn!("Rejected bearer token {}", fingerprint(token));
        Err(AuthError::Unauthorized)
    }

    /// Update last-used in the background; the request never waits on it.
    fn record_api_token_use(&self, token: &str, now: DateTime<Utc>) {
        let store = Arc::clone(&self.store);
        let key = token.to_string();
        tokio::spawn(async move {
            if let Err(e) = store.touch_api_token(&key, now).await {
                log::warn!("Failed to record use of API token {}: {e}", fingerprint(&key));
            }
        });
    }

    fn matches_master_secret(&self, token: &str) -> bool {
        self.master_secret
            .as_deref()
            .is_some_and(|secret| bool::from(token.as_bytes().ct_eq(secret.as_bytes())))
    }

    /// First admin account, or any account when none is flagged admin.
    async fn resolve_master_account(&self) -> AuthResult<UserId> {
        if let Some(id) = self.store.first_admin_id().await? {
            log::info!("Master secret used, acting as admin account {id}");
            return Ok(id);
        }

        match self.store.any_account_id().await? {
            Some(id) => {
                log::warn!("Master secret used but no admin account exists, acting as account {id}");
                Ok(id)
            }
            None => {
                log::warn!("Master secret used but no account exists");
                Err(AuthError::Unauthorized)
            }
        }
    }

    /// Profile of the given account
    pub async fn profile(&self, user_id: UserId) -> AuthResult<AccountProfile> {
        self.store
            .find_account_by_id(user_id)
            .await?
            .map(|account| account.profile())
            .ok_or(AuthError::AccountNotFound)
    }

    /// Replace the caller-editable profile fields
    ///
    /// # Errors
    ///
    /// * `AuthError::InvalidEmail` - New email empty or malformed
    /// * `AuthError::EmailTaken` - New email belongs to another account
    /// * `AuthError::AccountNotFound` - No such account
    pub async fn update_profile(
        &self,
        user_id: UserId,
        update: ProfileUpdate,
    ) -> AuthResult<AccountProfile> {
        let update = ProfileUpdate {
            email: update.email.trim().to_string(),
            ..update
        };
        validate_email(&update.email)?;

        let account = self.store.update_profile(user_id, &update).await?;
        log::info!("Updated profile of account {user_id}");
        Ok(account.profile())
    }

    /// Generate 2FA enrollment material for an account. Nothing is persisted.
    pub async fn begin_two_factor(&self, user_id: UserId) -> AuthResult<TwoFactorSetup> {
        let account = self
            .store
            .find_account_by_id(user_id)
            .await?
            .ok_or(AuthError::AccountNotFound)?;

        log::info!("Generating 2FA secret for account {user_id}");
        totp::generate_setup(&account.email)
    }

    /// Enable 2FA once the user proves their authenticator holds `secret`
    ///
    /// # Errors
    ///
    /// * `AuthError::InvalidTwoFactorSecret` - `secret` is not usable
    /// * `AuthError::InvalidTwoFactorCode` - `code` does not match `secret`
    pub async fn confirm_two_factor(&self, user_id: UserId, secret: &str, code: &str) -> AuthResult<()> {
        self.confirm_two_factor_at(user_id, secret, code, Utc::now())
            .await
    }

    /// [`confirm_two_factor`](Self::confirm_two_factor) evaluated at a given instant.
    pub async fn confirm_two_factor_at(
        &self,
        user_id: UserId,
        secret: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<()> {
        if !totp::verify_code(secret, code, unix_seconds(now))? {
            return Err(AuthError::InvalidTwoFactorCode);
        }

        let secret: String = secret
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| c.to_ascii_uppercase())
            .collect();

        self.store.set_two_factor(user_id, Some(&secret), true).await?;
        log::info!("2FA enabled for account {user_id}");
        Ok(())
    }

    /// Remove the 2FA secret and switch the gate off
    pub async fn disable_two_factor(&self, user_id: UserId) -> AuthResult<()> {
        self.store.set_two_factor(user_id, None, false).await?;
        log::info!("2FA disabled for account {user_id}");
        Ok(())
    }

    /// Provision a first API token if none exist yet
    ///
    /// The token is bound to an arbitrary existing account. Returns `None` when
    /// tokens already exist or no account is available to own one.
    pub async fn bootstrap_api_token(&self) -> AuthResult<Option<ApiToken>> {
        if self.store.count_api_tokens().await? > 0 {
            return Ok(None);
        }

        let Some(owner) = self.store.any_account_id().await? else {
            log::warn!("No account exists yet, skipping bootstrap API token");
            return Ok(None);
        };

        let token = ApiToken {
            key: generate_token()?,
            user_id: owner,
            name: BOOTSTRAP_TOKEN_NAME.to_string(),
            permissions: BOOTSTRAP_TOKEN_PERMISSIONS.to_string(),
            active: true,
            created_at: Utc::now(),
            last_used: None,
        };
        self.store.insert_api_token(&token).await?;

        Ok(Some(token))
    }

    /// Hash password with Argon2id + pepper
    pub fn hash_password(&self, password: &str) -> AuthResult<String> {
        let peppered = format!("{}{}", password, self.pepper);
        let salt = SaltString::generate(&mut OsRng);
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, self.hash_params.clone());

        Ok(argon2
            .hash_password(peppered.as_bytes(), &salt)
            .map_err(|_| AuthError::HashingFailed)?
            .to_string())
    }

    /// Lazily built so the cost matches the configured hash parameters.
    fn dummy_hash(&self) -> Option<&str> {
        if let Some(hash) = self.dummy_hash.get() {
            return Some(hash.as_str());
        }
        let hash = self.hash_password("no-such-account-placeholder").ok()?;
        Some(self.dummy_hash.get_or_init(|| hash).as_str())
    }

    /// Verify password against hash
    fn verify_password(&self, password: &str, hash: &str) -> AuthResult<()> {
        let peppered = format!("{}{}", password, self.pepper);
        let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;

        Argon2::default()
            .verify_password(peppered.as_bytes(), &parsed_hash)
            .map_err(|_| AuthError::InvalidCredentials)
    }
}

fn validate_email(email: &str) -> AuthResult<()> {
    if email.is_empty() {
        return Err(AuthError::InvalidEmail("Email is required".to_string()));
    }
    if !email.contains('@') {
        return Err(AuthError::InvalidEmail("Email must contain '@'".to_string()));
    }
    // Used as the authenticator account label, where ':' is the issuer separator.
    if email.contains(':') {
        return Err(AuthError::InvalidEmail("Email must not contain ':'".to_string()));
    }
    Ok(())
}

fn validate_password(password: &str) -> AuthResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::WeakPassword(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

fn unix_seconds(now: DateTime<Utc>) -> u64 {
    u64::try_from(now.timestamp()).unwrap_or(0)
}
