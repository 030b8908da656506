//! CYNA authentication server.
//!
//! Connects to PostgreSQL, provisions the bootstrap API token when the store
//! has none, and serves the login and account endpoints.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Error};
use cyna::{AuthManager, db::Database};
use cyna_server::{api, config::ServerConfig, logging, metrics};
use pico_args::Arguments;
use tracing::{error, info, warn};

const HELP: &str = "\
Run the CYNA authentication server

USAGE:
  cyna_server [OPTIONS]

OPTIONS:
  --bind       IP:PORT     Server socket bind address  [default: env SERVER_BIND or 127.0.0.1:8080]
  --db-url     URL         Database connection string  [default: env DATABASE_URL or postgres://postgres@localhost/cyna]

FLAGS:
  -h, --help               Print help information

ENVIRONMENT:
  SERVER_BIND              Server bind address (e.g., 0.0.0.0:8080)
  DATABASE_URL             PostgreSQL connection string
  PASSWORD_PEPPER          Password hashing pepper (required, 16+ chars)
  API_SECRET               Master secret accepted as a bearer token (optional)
  BOOTSTRAP_API_TOKEN      Provision an API token on first start [default: true]
  METRICS_BIND             Prometheus exporter address (optional)
  RUST_LOG                 Log filter [default: info,sqlx=warn,hyper=warn]
";

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let bind_override: Option<SocketAddr> = pargs
        .opt_value_from_str("--bind")
        .context("Invalid --bind address")?;
    let database_url_override: Option<String> = pargs
        .opt_value_from_str("--db-url")
        .context("Invalid --db-url value")?;

    logging::init();

    let config = ServerConfig::from_env(bind_override, database_url_override)?;
    config.validate()?;

    if let Some(metrics_bind) = config.metrics_bind {
        metrics::init_metrics(metrics_bind).map_err(anyhow::Error::msg)?;
        info!("Prometheus metrics exposed at http://{metrics_bind}/metrics");
    }

    info!("Connecting to database");
    let db = Database::new(&config.database)
        .await
        .context("Failed to connect to database")?;
    info!("Database connected successfully");

    let store = Arc::new(db.auth_store());
    let auth_manager = Arc::new(AuthManager::new(
        store,
        config.security.password_pepper.clone(),
        config.security.master_secret.clone(),
    ));

    if !auth_manager.has_master_secret() {
        info!("API_SECRET not set, master secret authentication disabled");
    }

    if config.bootstrap_api_token {
        match auth_manager.bootstrap_api_token().await {
            Ok(Some(token)) => {
                logging::log_security_event(
                    "bootstrap_api_token",
                    Some(token.user_id),
                    None,
                    "Provisioned initial API token",
                );
                warn!("==================================================");
                warn!("Initial API token (shown once): {}", token.key);
                warn!("==================================================");
            }
            Ok(None) => info!("API tokens already provisioned"),
            Err(e) => error!("Failed to provision bootstrap API token: {e}"),
        }
    }

    let state = api::AppState {
        auth_manager,
        database: Some(db.clone()),
    };
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind))?;

    info!(
        "Server is running at http://{}. Press Ctrl+C to stop.",
        config.bind
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutting down server...");
    db.close().await;

    Ok(())
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {e}");
        std::future::pending::<()>().await;
    }
}
