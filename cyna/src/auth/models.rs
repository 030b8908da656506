//! Authentication data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Account ID type
pub type UserId = i64;

/// Role value that flags an administrator account
pub const ADMIN_ROLE: &str = "admin";

/// Role given to self-registered accounts
pub const DEFAULT_ROLE: &str = "client";

/// Status given to self-registered accounts
pub const DEFAULT_STATUS: &str = "active";

/// Account model, including its credential. Never serialized.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: UserId,
    pub email: String,
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub role: String,
    pub status: String,
    pub totp_secret: Option<String>,
    pub totp_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl Account {
    pub fn is_admin(&self) -> bool {
        self.role == ADMIN_ROLE
    }

    /// Secret to check a login against, if the second factor is switched on.
    ///
    /// The `totp_enabled` gate and the presence of a secret are independent;
    /// step-up is demanded only when both hold.
    pub fn second_factor_secret(&self) -> Option<&str> {
        if !self.totp_enabled {
            return None;
        }
        self.totp_secret.as_deref().filter(|s| !s.is_empty())
    }

    /// Public view of the account
    pub fn profile(&self) -> AccountProfile {
        AccountProfile {
            id: self.id,
            email: self.email.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            phone: self.phone.clone(),
            role: self.role.clone(),
            status: self.status.clone(),
            two_factor_enabled: self.second_factor_secret().is_some(),
            created_at: self.created_at,
            last_login: self.last_login,
        }
    }
}

/// Account fields safe to hand to a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountProfile {
    pub id: UserId,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub role: String,
    pub status: String,
    pub two_factor_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

/// Row to insert for a new account
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub role: String,
    pub status: String,
}

/// Account registration request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Caller-editable account fields. Every field is replaced, `None` clears it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Login request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub totp_code: Option<String>,
}

/// Session model
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub valid: bool,
}

impl Session {
    /// A session counts only while flagged valid and strictly before its expiry.
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        self.valid && now < self.expires_at
    }
}

/// Long-lived API token
#[derive(Debug, Clone)]
pub struct ApiToken {
    pub key: String,
    pub user_id: UserId,
    pub name: String,
    pub permissions: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
}

/// Freshly minted session handed back after a successful login
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionGrant {
    pub token: String,
    pub user_id: UserId,
    pub expires_at: DateTime<Utc>,
}

/// Result of a credential check
#[derive(Debug, Clone)]
pub enum LoginOutcome {
    /// Credentials (and second factor, if any) accepted
    Authenticated(SessionGrant),
    /// Password accepted but the account needs a TOTP code
    TwoFactorRequired,
}

/// Which bearer mechanism resolved the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    Session,
    ApiToken,
    MasterSecret,
}

impl AuthScheme {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthScheme::Session => "session",
            AuthScheme::ApiToken => "api_token",
            AuthScheme::MasterSecret => "master_secret",
        }
    }
}

/// Authenticated caller, produced by bearer-token verification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub scheme: AuthScheme,
}

/// Two-factor enrollment material
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwoFactorSetup {
    pub secret: String,
    pub otpauth_url: String,
    pub qr_code: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn account(totp_secret: Option<&str>, totp_enabled: bool) -> Account {
        Account {
            id: 7,
            email: "alice@example.com".to_string(),
            password_hash: "$argon2id$v=19$...".to_string(),
            first_name: None,
            last_name: None,
            phone: None,
            role: DEFAULT_ROLE.to_string(),
            status: DEFAULT_STATUS.to_string(),
            totp_secret: totp_secret.map(str::to_string),
            totp_enabled,
            created_at: Utc::now(),
            last_login: None,
        }
    }

    #[test]
    fn test_second_factor_needs_flag_and_secret() {
        assert!(account(None, false).second_factor_secret().is_none());
        assert!(account(None, true).second_factor_secret().is_none());
        assert!(account(Some(""), true).second_factor_secret().is_none());
        assert!(account(Some("ABC"), false).second_factor_secret().is_none());
        assert_eq!(account(Some("ABC"), true).second_factor_secret(), Some("ABC"));
    }

    #[test]
    fn test_profile_omits_credentials() {
        let json = serde_json::to_value(account(Some("ABC"), true).profile()).unwrap();
        assert!(json.get("password_hash").is_none());
        assert!(json.get("totp_secret").is_none());
        assert_eq!(json["two_factor_enabled"], true);
    }

    #[test]
    fn test_login_request_code_is_optional() {
        let request: LoginRequest =
            serde_json::from_str(r#"{"email":"a@example.com","password":"pw"}"#).unwrap();
        assert!(request.totp_code.is_none());
    }

    #[test]
    fn test_session_usable_strictly_before_expiry() {
        let now = Utc::now();
        let session = Session {
            token: "t".to_string(),
            user_id: 1,
            created_at: now,
            expires_at: now + Duration::hours(24),
            valid: true,
        };
        assert!(session.is_usable_at(session.expires_at - Duration::seconds(1)));
        assert!(!session.is_usable_at(session.expires_at));

        let revoked = Session { valid: false, ..session };
        assert!(!revoked.is_usable_at(now));
    }
}
