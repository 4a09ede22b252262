//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use crate::db::Database;
use crate::rate_limit::RateLimitQuotas;
use crate::service::AuthConfig;
use clap::Parser;
use tracing::{error, info};

const MIN_SECRET_LENGTH: usize = 32;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "Tokenward",
    about = "Bearer token and session lifecycle service"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "7292")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, default_value = "tokenward.db")]
    pub database: String,

    /// Path to file containing the access token secret. Prefer the ACCESS_SECRET env var
    #[arg(long)]
    pub access_secret_file: Option<String>,

    /// Path to file containing the refresh token secret. Prefer the REFRESH_SECRET env var
    #[arg(long)]
    pub refresh_secret_file: Option<String>,

    /// Check every access token against the session ledger
    #[arg(long, env = "STRICT_SESSIONS")]
    pub strict_sessions: bool,

    /// Disable new user signups
    #[arg(long)]
    pub no_signup: bool,

    /// Take the client IP from X-Forwarded-For (only behind a trusted proxy)
    #[arg(long)]
    pub trust_forwarded_for: bool,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load a secret from an environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_secret(env_var: &str, secret_file: Option<&str>) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var(env_var) {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var(env_var) };
        secret
    } else if let Some(path) = secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read secret file");
                return None;
            }
        }
    } else {
        error!(
            variable = %env_var,
            "Secret is required. Set the environment variable (recommended) or pass a secret file"
        );
        return None;
    };

    if secret.len() < MIN_SECRET_LENGTH {
        error!(
            variable = %env_var,
            "Secret is shorter than {} characters. Use a longer secret",
            MIN_SECRET_LENGTH
        );
        return None;
    }

    Some(secret)
}

/// Build ServerConfig from validated arguments.
pub fn build_config(
    db: Database,
    access_secret: String,
    refresh_secret: String,
    args: &Args,
) -> ServerConfig {
    ServerConfig {
        db,
        auth: AuthConfig {
            access_secret: access_secret.into_bytes(),
            refresh_secret: refresh_secret.into_bytes(),
            strict_sessions: args.strict_sessions,
        },
        no_signup: args.no_signup,
        trust_forwarded_for: args.trust_forwarded_for,
        rate_limits: RateLimitQuotas::default(),
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}
