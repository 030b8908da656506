//! Authentication API handlers.
//!
//! This module provides the HTTP endpoints around the auth core:
//! - Login with email/password and, when enabled, a TOTP code
//! - Account registration and email existence check
//! - The caller's own profile, read and update
//! - Two-factor enrollment, confirmation and removal
//!
//! All endpoints return JSON, errors as `{"error": "<message>"}`.
//!
//! # Examples
//!
//! Login:
//! ```bash
//! curl -X POST http://localhost:8080/login \
//!   -H "Content-Type: application/json" \
//!   -d '{"email": "alice@example.com", "password": "correct-horse"}'
//! ```
//!
//! Start 2FA enrollment:
//! ```bash
//! curl -X POST http://localhost:8080/api/user/2fa/setup \
//!   -H "Authorization: Bearer <token>"
//! ```

use axum::{
    Extension, Json,
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
};
use cyna::{
    AuthError, Identity, LoginOutcome,
    auth::{
        AccountProfile, LoginRequest, ProfileUpdate, RegisterRequest, TwoFactorSetup, UserId,
    },
};
use serde::{Deserialize, Serialize};

use super::{
    AppState,
    error::{ApiError, ApiResult},
    request_id::RequestId,
};
use crate::{logging::log_security_event, metrics};

#[derive(Debug, Deserialize)]
pub struct LoginPayload {
    pub email: String,
    #[serde(alias = "mot_de_passe")]
    pub password: String,
    #[serde(default)]
    pub totp_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterPayload {
    pub email: String,
    #[serde(alias = "mot_de_passe")]
    pub password: String,
    #[serde(default, alias = "prenom")]
    pub first_name: Option<String>,
    #[serde(default, alias = "nom")]
    pub last_name: Option<String>,
    #[serde(default, alias = "telephone")]
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfilePayload {
    pub email: String,
    #[serde(default, alias = "prenom")]
    pub first_name: Option<String>,
    #[serde(default, alias = "nom")]
    pub last_name: Option<String>,
    #[serde(default, alias = "telephone")]
    pub phone: Option<String>,
}

/// Body of a successful login: either a session or a request for the second factor
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum LoginResponse {
    Session { token: String, user_id: UserId },
    TwoFactorRequired { requires_2fa: bool },
}

#[derive(Debug, Deserialize)]
pub struct ExistsQuery {
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ExistsResponse {
    pub exists: bool,
}

#[derive(Debug, Deserialize)]
pub struct VerifyTwoFactorPayload {
    pub secret: String,
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Check credentials and open a 24-hour session.
///
/// # Request Body
///
/// ```json
/// {
///   "email": "alice@example.com",
///   "password": "correct-horse",
///   "totp_code": "123456"  // Only needed when 2FA is enabled
/// }
/// ```
///
/// # Response
///
/// `200 OK` with either
/// ```json
/// { "token": "9f2c...64 hex chars", "user_id": 42 }
/// ```
/// or, when the account has 2FA and no code was sent,
/// ```json
/// { "requires_2fa": true }
/// ```
///
/// # Errors
///
/// - `400 Bad Request`: Body is not valid JSON for this shape
/// - `401 Unauthorized`: Invalid credentials or invalid 2FA code
/// - `500 Internal Server Error`: Store or entropy failure
pub async fn login(
    State(state): State<AppState>,
    request_id: RequestId,
    payload: Result<Json<LoginPayload>, JsonRejection>,
) -> ApiResult<Json<LoginResponse>> {
    let Json(payload) = payload?;
    let request = LoginRequest {
        email: payload.email,
        password: payload.password,
        totp_code: payload.totp_code,
    };

    match state.auth_manager.login(request).await {
        Ok(LoginOutcome::Authenticated(grant)) => {
            metrics::login_attempts_total("success");
            Ok(Json(LoginResponse::Session {
                token: grant.token,
                user_id: grant.user_id,
            }))
        }
        Ok(LoginOutcome::TwoFactorRequired) => {
            metrics::login_attempts_total("requires_2fa");
            Ok(Json(LoginResponse::TwoFactorRequired { requires_2fa: true }))
        }
        Err(err) => {
            let (outcome, event) = match err {
                AuthError::InvalidCredentials => ("invalid_credentials", Some("failed_login")),
                AuthError::InvalidTwoFactorCode => ("invalid_2fa", Some("failed_2fa")),
                _ => ("error", None),
            };
            metrics::login_attempts_total(outcome);
            if let Some(event) = event {
                log_security_event(event, None, Some(request_id.as_str()), &err.to_string());
            }
            Err(err.into())
        }
    }
}

/// Create a client account.
///
/// # Request Body
///
/// ```json
/// {
///   "email": "bob@example.com",
///   "password": "at-least-8-chars",
///   "first_name": "Bob",   // Optional
///   "last_name": "Smith",  // Optional
///   "phone": "+33..."      // Optional
/// }
/// ```
///
/// # Errors
///
/// - `400 Bad Request`: Malformed body, missing `@` in email, short password
/// - `409 Conflict`: Email already registered
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterPayload>, JsonRejection>,
) -> ApiResult<Json<AccountProfile>> {
    let Json(payload) = payload?;
    let profile = state
        .auth_manager
        .register(RegisterRequest {
            email: payload.email,
            password: payload.password,
            first_name: payload.first_name,
            last_name: payload.last_name,
            phone: payload.phone,
        })
        .await?;

    Ok(Json(profile))
}

/// Whether an account uses `?email=`.
pub async fn email_exists(
    State(state): State<AppState>,
    query: Result<Query<ExistsQuery>, QueryRejection>,
) -> ApiResult<Json<ExistsResponse>> {
    let Query(query) = query?;
    let email = query
        .email
        .filter(|e| !e.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Email required".to_string()))?;

    let exists = state.auth_manager.email_exists(&email).await?;
    Ok(Json(ExistsResponse { exists }))
}

/// Profile of the authenticated caller.
pub async fn me(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Json<AccountProfile>> {
    Ok(Json(state.auth_manager.profile(identity.user_id).await?))
}

/// Replace the caller's email, names and phone.
///
/// # Request Body
///
/// ```json
/// {
///   "email": "alice@example.com",
///   "first_name": "Alice",  // Optional, omitted clears it
///   "last_name": "Martin",  // Optional
///   "phone": "+33..."       // Optional
/// }
/// ```
///
/// The French field names `prenom`, `nom` and `telephone` are accepted too.
///
/// # Errors
///
/// - `400 Bad Request`: Malformed body or email
/// - `409 Conflict`: Email belongs to another account
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    payload: Result<Json<UpdateProfilePayload>, JsonRejection>,
) -> ApiResult<Json<AccountProfile>> {
    let Json(payload) = payload?;
    let profile = state
        .auth_manager
        .update_profile(
            identity.user_id,
            ProfileUpdate {
                email: payload.email,
                first_name: payload.first_name,
                last_name: payload.last_name,
                phone: payload.phone,
            },
        )
        .await?;

    Ok(Json(profile))
}

/// Generate a TOTP secret, provisioning URL and QR code for the caller.
///
/// Nothing is stored until the code is confirmed via `/api/user/2fa/verify`.
pub async fn setup_two_factor(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Json<TwoFactorSetup>> {
    Ok(Json(state.auth_manager.begin_two_factor(identity.user_id).await?))
}

/// Confirm a secret with a current code and switch 2FA on.
///
/// # Errors
///
/// - `400 Bad Request`: Malformed body or unusable secret
/// - `401 Unauthorized`: Code does not match the secret
pub async fn verify_two_factor(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    payload: Result<Json<VerifyTwoFactorPayload>, JsonRejection>,
) -> ApiResult<Json<MessageResponse>> {
    let Json(payload) = payload?;
    state
        .auth_manager
        .confirm_two_factor(identity.user_id, &payload.secret, &payload.code)
        .await?;

    Ok(Json(MessageResponse {
        message: "2FA enabled successfully".to_string(),
    }))
}

/// Clear the caller's TOTP secret and switch 2FA off.
pub async fn remove_two_factor(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Json<MessageResponse>> {
    state.auth_manager.disable_two_factor(identity.user_id).await?;

    Ok(Json(MessageResponse {
        message: "2FA disabled successfully".to_string(),
    }))
}
