//! PostgreSQL implementation of the auth repositories.
//!
//! Tables are described in `migrations/0001_auth.sql`. Timestamps are stored
//! as UTC `TIMESTAMP` columns; expiry checks bind the caller's clock instead of
//! `NOW()` so the auth core decides what "now" is.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};

use super::repository::{AccountRepository, ApiTokenRepository, SessionRepository};
use crate::auth::{
    Account, ApiToken, AuthError, AuthResult, NewAccount, ProfileUpdate, Session, UserId,
};

const ACCOUNT_COLUMNS: &str = "id, email, password_hash, first_name, last_name, phone, role, status,
     totp_secret, totp_enabled, created_at, last_login";

/// Auth store backed by a PostgreSQL pool
#[derive(Clone)]
pub struct PgAuthStore {
    pool: PgPool,
}

impl PgAuthStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn account_from_row(row: &PgRow) -> Account {
    Account {
        id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        phone: row.get("phone"),
        role: row.get("role"),
        status: row.get("status"),
        totp_secret: row.get("totp_secret"),
        totp_enabled: row.get("totp_enabled"),
        created_at: row.get::<NaiveDateTime, _>("created_at").and_utc(),
        last_login: row
            .get::<Option<NaiveDateTime>, _>("last_login")
            .map(|dt| dt.and_utc()),
    }
}

/// Unique violations on `accounts.email` surface as `EmailTaken`.
fn map_email_conflict(e: sqlx::Error) -> AuthError {
    let duplicate = e
        .as_database_error()
        .is_some_and(|db_err| db_err.is_unique_violation());
    if duplicate {
        AuthError::EmailTaken
    } else {
        AuthError::Database(e)
    }
}

fn session_from_row(row: &PgRow) -> Session {
    Session {
        token: row.get("token"),
        user_id: row.get("user_id"),
        created_at: row.get::<NaiveDateTime, _>("created_at").and_utc(),
        expires_at: row.get::<NaiveDateTime, _>("expires_at").and_utc(),
        valid: row.get("valid"),
    }
}

fn api_token_from_row(row: &PgRow) -> ApiToken {
    ApiToken {
        key: row.get("api_key"),
        user_id: row.get("user_id"),
        name: row.get("name"),
        permissions: row.get("permissions"),
        active: row.get("active"),
        created_at: row.get::<NaiveDateTime, _>("created_at").and_utc(),
        last_used: row
            .get::<Option<NaiveDateTime>, _>("last_used")
            .map(|dt| dt.and_utc()),
    }
}

#[async_trait]
impl AccountRepository for PgAuthStore {
    async fn create_account(&self, account: &NewAccount) -> AuthResult<Account> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO accounts (email, password_hash, first_name, last_name, phone, role, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {ACCOUNT_COLUMNS}
            "#
        ))
        .bind(&account.email)
        .bind(&account.password_hash)
        .bind(&account.first_name)
        .bind(&account.last_name)
        .bind(&account.phone)
        .bind(&account.role)
        .bind(&account.status)
        .fetch_one(&self.pool)
        .await
        .map_err(map_email_conflict)?;

        Ok(account_from_row(&row))
    }

    async fn update_profile(
        &self,
        user_id: UserId,
        update: &ProfileUpdate,
    ) -> AuthResult<Account> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE accounts
            SET email = $1, first_name = $2, last_name = $3, phone = $4
            WHERE id = $5
            RETURNING {ACCOUNT_COLUMNS}
            "#
        ))
        .bind(&update.email)
        .bind(&update.first_name)
        .bind(&update.last_name)
        .bind(&update.phone)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_email_conflict)?;

        row.as_ref()
            .map(account_from_row)
            .ok_or(AuthError::AccountNotFound)
    }

    async fn find_account_by_email(&self, email: &str) -> AuthResult<Option<Account>> {
        let row = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(account_from_row))
    }

    async fn find_account_by_id(&self, user_id: UserId) -> AuthResult<Option<Account>> {
        let row = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(account_from_row))
    }

    async fn email_exists(&self, email: &str) -> AuthResult<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM accounts WHERE email = $1)")
                .bind(email)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn first_admin_id(&self) -> AuthResult<Option<UserId>> {
        let id: Option<UserId> = sqlx::query_scalar(
            "SELECT id FROM accounts WHERE role = 'admin' ORDER BY id LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(id)
    }

    async fn any_account_id(&self) -> AuthResult<Option<UserId>> {
        let id: Option<UserId> = sqlx::query_scalar("SELECT id FROM accounts ORDER BY id LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(id)
    }

    async fn update_last_login(&self, user_id: UserId, at: DateTime<Utc>) -> AuthResult<()> {
        sqlx::query("UPDATE accounts SET last_login = $1 WHERE id = $2")
            .bind(at.naive_utc())
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_two_factor(
        &self,
        user_id: UserId,
        secret: Option<&str>,
        enabled: bool,
    ) -> AuthResult<()> {
        let result =
            sqlx::query("UPDATE accounts SET totp_secret = $1, totp_enabled = $2 WHERE id = $3")
                .bind(secret)
                .bind(enabled)
                .bind(user_id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(AuthError::AccountNotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl SessionRepository for PgAuthStore {
    async fn insert_session(&self, session: &Session) -> AuthResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions (token, user_id, created_at, expires_at, valid)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&session.token)
        .bind(session.user_id)
        .bind(session.created_at.naive_utc())
        .bind(session.expires_at.naive_utc())
        .bind(session.valid)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_active_session(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<Option<Session>> {
        let row = sqlx::query(
            r#"
            SELECT token, user_id, created_at, expires_at, valid
            FROM sessions
            WHERE token = $1 AND valid = TRUE AND expires_at > $2
            "#,
        )
        .bind(token)
        .bind(now.naive_utc())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(session_from_row))
    }

    async fn invalidate_session(&self, token: &str) -> AuthResult<()> {
        sqlx::query("UPDATE sessions SET valid = FALSE WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ApiTokenRepository for PgAuthStore {
    async fn count_api_tokens(&self) -> AuthResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM api_tokens")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn insert_api_token(&self, token: &ApiToken) -> AuthResult<()> {
        sqlx::query(
            r#"
            INSERT INTO api_tokens (api_key, user_id, name, permissions, active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&token.key)
        .bind(token.user_id)
        .bind(&token.name)
        .bind(&token.permissions)
        .bind(token.active)
        .bind(token.created_at.naive_utc())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_active_api_token(&self, key: &str) -> AuthResult<Option<ApiToken>> {
        let row = sqlx::query(
            r#"
            SELECT api_key, user_id, name, permissions, active, created_at, last_used
            FROM api_tokens
            WHERE api_key = $1 AND active = TRUE
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(api_token_from_row))
    }

    async fn touch_api_token(&self, key: &str, at: DateTime<Utc>) -> AuthResult<()> {
        sqlx::query("UPDATE api_tokens SET last_used = $1 WHERE api_key = $2")
            .bind(at.naive_utc())
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
