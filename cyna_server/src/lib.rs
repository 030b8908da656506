//! HTTP server for the CYNA authentication core.
//!
//! Exposes login, registration and two-factor endpoints on top of
//! [`cyna::AuthManager`], and guards protected routes with bearer-token
//! verification.

pub mod api;
pub mod config;
pub mod logging;
pub mod metrics;
