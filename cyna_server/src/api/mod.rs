//! HTTP API for the CYNA authentication service.
//!
//! # Modules
//!
//! - [`auth`]: Login, registration, profile and 2FA handlers
//! - [`middleware`]: Bearer-token resolution for protected endpoints
//! - [`request_id`]: Request correlation IDs and HTTP metrics
//! - [`error`]: Mapping of auth failures to status codes
//!
//! # Endpoints Overview
//!
//! ```text
//! GET    /health                      - Store connectivity (public)
//! POST   /login                       - Login (public)
//! POST   /api/login                   - Same as /login (public)
//! POST   /api/register                - Register account (public)
//! POST   /api/utilisateurs            - Same as /api/register (public)
//! GET    /api/accounts/exists?email=  - Email existence check (public)
//! GET    /api/utilisateurs/exists     - Same as /api/accounts/exists (public)
//! GET    /api/me                      - Caller profile (bearer)
//! GET    /api/user/profile            - Same as /api/me (bearer)
//! PUT    /api/user/profile            - Update email, names and phone (bearer)
//! POST   /api/user/2fa/setup          - Start 2FA enrollment (bearer)
//! POST   /api/user/2fa/verify         - Confirm and enable 2FA (bearer)
//! DELETE /api/user/2fa/remove         - Disable 2FA (bearer)
//! ```
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use cyna::{AuthManager, db::Database};
//! use cyna_server::api::{AppState, create_router};
//! use std::sync::Arc;
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new(&Default::default()).await?;
//! let store = Arc::new(db.auth_store());
//! let state = AppState {
//!     auth_manager: Arc::new(AuthManager::new(store, "pepper_value_16ch".to_string(), None)),
//!     database: Some(db),
//! };
//!
//! let app = create_router(state);
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod error;
pub mod middleware;
pub mod request_id;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{delete, get, post},
};
use cyna::{AuthManager, db::Database};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Application state shared across all HTTP handlers.
///
/// Cloned for each request; the fields are cheap handles.
#[derive(Clone)]
pub struct AppState {
    pub auth_manager: Arc<AuthManager>,
    /// Checked by `/health`; `None` when running on the in-memory store
    pub database: Option<Database>,
}

/// Create the complete API router with all endpoints and middleware.
pub fn create_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health_check))
        .route("/login", post(auth::login))
        .route("/api/login", post(auth::login))
        .route("/api/register", post(auth::register))
        .route("/api/utilisateurs", post(auth::register))
        .route("/api/accounts/exists", get(auth::email_exists))
        .route("/api/utilisateurs/exists", get(auth::email_exists));

    let protected_routes = Router::new()
        .route("/api/me", get(auth::me))
        .route("/api/user/profile", get(auth::me).put(auth::update_profile))
        .route("/api/user/2fa/setup", post(auth::setup_two_factor))
        .route("/api/user/2fa/verify", post(auth::verify_two_factor))
        .route("/api/user/2fa/remove", delete(auth::remove_two_factor))
        // Route layer only, so unmatched paths still fall through to 404.
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint for monitoring and load balancers.
///
/// Returns `200 OK` when the store answers, `503 Service Unavailable` otherwise.
///
/// ```bash
/// curl http://localhost:8080/health
/// # {"status":"healthy","database":true,"version":"0.1.0","timestamp":"2026-01-01T10:30:00Z"}
/// ```
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let db_healthy = match &state.database {
        Some(database) => database.health_check().await.is_ok(),
        None => true,
    };

    let status_code = if db_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = json!({
        "status": if db_healthy { "healthy" } else { "unhealthy" },
        "version": env!("CARGO_PKG_VERSION"),
        "database": db_healthy,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    (status_code, Json(response))
}
