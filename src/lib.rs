pub mod api;
pub mod auth;
pub mod cleanup;
pub mod cli;
pub mod db;
pub mod error;
pub mod events;
pub mod issuer;
pub mod jwt;
pub mod rate_limit;
pub mod service;
pub mod users;

pub use error::{AuthError, Result};
pub use service::{AuthConfig, AuthService};

use api::create_api_router;
use axum::Router;
use db::Database;
use rate_limit::{RateLimitConfig, RateLimitQuotas};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// Signing secrets and session policy
    pub auth: AuthConfig,
    /// Whether new user signups are disabled
    pub no_signup: bool,
    /// Take the client IP from X-Forwarded-For (requires running behind a proxy)
    pub trust_forwarded_for: bool,
    /// Per-IP budgets for login and registration
    pub rate_limits: RateLimitQuotas,
}

/// Create the application router with the given configuration.
/// Fails if the signing secrets are unusable.
pub fn create_app(config: &ServerConfig) -> Result<Router> {
    let users = config.db.users();
    let service = Arc::new(AuthService::new(
        &config.auth,
        config.db.sessions(),
        Arc::new(users.clone()),
    )?);
    let rate_limit_config = Arc::new(RateLimitConfig::new(
        config.rate_limits,
        config.trust_forwarded_for,
    ));

    let api_router = create_api_router(service, users, config.no_signup, rate_limit_config);

    Ok(Router::new().nest("/api", api_router))
}

/// Run cleanup tasks and spawn background scheduler.
/// Call this before starting the server.
pub async fn init_cleanup(db: &Database) {
    let ledger = db.sessions();
    cleanup::run_cleanup(&ledger).await;
    cleanup::spawn_cleanup_scheduler(ledger);
}

/// Run the server on the given listener. This function blocks until the server exits.
/// Call `init_cleanup` before this to run cleanup on startup.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> std::io::Result<()> {
    let app = create_app(&config).map_err(std::io::Error::other)?;
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
/// Note: For production use, prefer `run_server` directly in main.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> std::io::Result<(tokio::task::JoinHandle<()>, SocketAddr)> {
    // Run cleanup tasks on startup
    init_cleanup(&config.db).await;

    let addr = format!("127.0.0.1:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = run_server(config, listener).await {
            tracing::error!(error = %e, "Server error");
        }
    });

    Ok((handle, local_addr))
}
