//! Bearer-token middleware for protected endpoints.
//!
//! Extracts the token from `Authorization: Bearer <token>`, resolves it through
//! the auth manager (session, then API token, then master secret) and injects
//! the resulting [`Identity`] into request extensions.
//!
//! # Usage
//!
//! ```rust,no_run
//! use axum::{Router, routing::get, middleware};
//! # use cyna_server::api::middleware::auth_middleware;
//! # use cyna_server::api::AppState;
//! # async fn handler() {}
//! # let state: AppState = unimplemented!();
//!
//! let protected_routes: Router = Router::new()
//!     .route("/api/me", get(handler))
//!     .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
//!     .with_state(state);
//! # let _ = protected_routes;
//! ```
//!
//! Handlers then take `Extension<Identity>`:
//!
//! ```rust,no_run
//! use axum::extract::Extension;
//! use cyna::Identity;
//!
//! async fn protected_handler(Extension(identity): Extension<Identity>) -> String {
//!     format!("Authenticated as account {}", identity.user_id)
//! }
//! # let _ = protected_handler;
//! ```

use axum::{
    extract::{Request, State},
    http::{HeaderMap, header::AUTHORIZATION},
    middleware::Next,
    response::{IntoResponse, Response},
};
use cyna::AuthError;

use super::{AppState, error::ApiError, request_id::RequestId};
use crate::{logging::log_security_event, metrics};

/// Pull the token out of an `Authorization: Bearer <token>` header.
///
/// The value must be exactly two space-separated parts, the first `Bearer`.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) if !token.is_empty() => Some(token),
        _ => None,
    }
}

/// Authentication middleware that resolves the bearer token and injects the identity.
///
/// # Behavior
///
/// - **Success**: Injects [`cyna::Identity`] into request extensions → Calls next handler
/// - **Missing or malformed header**: `401 Unauthorized`
/// - **Token not accepted by any mechanism**: `401 Unauthorized`
/// - **Store failure**: `500 Internal Server Error`
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let request_id = request.extensions().get::<RequestId>().cloned();
    let request_id = request_id.as_ref().map(RequestId::as_str);

    let Some(token) = bearer_token(request.headers()) else {
        metrics::bearer_auth_total("none", false);
        log_security_event("missing_bearer", None, request_id, "Missing or malformed Authorization header");
        return ApiError::from(AuthError::Unauthorized).into_response();
    };

    match state.auth_manager.authenticate(token).await {
        Ok(identity) => {
            metrics::bearer_auth_total(identity.scheme.as_str(), true);
            if identity.scheme == cyna::AuthScheme::MasterSecret {
                log_security_event(
                    "master_secret_used",
                    Some(identity.user_id),
                    request_id,
                    "Request authenticated with the master secret",
                );
            }
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(err) => {
            metrics::bearer_auth_total("none", false);
            if matches!(err, AuthError::Unauthorized) {
                log_security_event("rejected_bearer", None, request_id, "Bearer token rejected");
            }
            ApiError::from(err).into_response()
        }
    }
}
