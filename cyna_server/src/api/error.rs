//! Mapping from auth failures to HTTP responses.
//!
//! Every error renders as `{"error": "<message>"}`. Server-side failures are
//! logged in full and shown to the client only as `Internal server error`.

use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use cyna::AuthError;
use serde::Serialize;

/// Message for any unparseable request body or query
pub const INVALID_REQUEST: &str = "Invalid request";

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Error returned by API handlers
#[derive(Debug)]
pub enum ApiError {
    /// Malformed input
    BadRequest(String),
    /// Failure reported by the auth core
    Auth(AuthError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Auth(err) => match err {
                AuthError::InvalidCredentials
                | AuthError::InvalidTwoFactorCode
                | AuthError::Unauthorized => StatusCode::UNAUTHORIZED,
                AuthError::EmailTaken => StatusCode::CONFLICT,
                AuthError::InvalidEmail(_)
                | AuthError::WeakPassword(_)
                | AuthError::InvalidTwoFactorSecret => StatusCode::BAD_REQUEST,
                AuthError::AccountNotFound => StatusCode::NOT_FOUND,
                AuthError::Database(_)
                | AuthError::HashingFailed
                | AuthError::TwoFactorSetupFailed
                | AuthError::EntropyUnavailable => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::Auth(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!("Rejected request body: {rejection}");
        ApiError::BadRequest(INVALID_REQUEST.to_string())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        tracing::debug!("Rejected query string: {rejection}");
        ApiError::BadRequest(INVALID_REQUEST.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::BadRequest(message) => message.clone(),
            ApiError::Auth(err) => {
                if err.is_internal() {
                    tracing::error!("Request failed: {err}");
                }
                err.client_message()
            }
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
