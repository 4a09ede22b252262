//! Hooks for observing login and token lifecycle events.

use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    LoginFailed { username: String },
    TokensGranted { user_id: String, access_token_id: String },
    TokensRevoked { user_id: String, token_id: String },
}

/// Receives [`AuthEvent`]s. Must not block; the outcome of the operation
/// that emitted the event does not depend on it.
pub trait AuthObserver: Send + Sync {
    fn on_event(&self, event: &AuthEvent);
}

/// Default observer: writes each event to the log.
pub struct TracingObserver;

impl AuthObserver for TracingObserver {
    fn on_event(&self, event: &AuthEvent) {
        match event {
            AuthEvent::LoginFailed { username } => {
                warn!(username = %username, "Login failed")
            }
            AuthEvent::TokensGranted {
                user_id,
                access_token_id,
            } => info!(user_id = %user_id, token_id = %access_token_id, "Tokens granted"),
            AuthEvent::TokensRevoked { user_id, token_id } => {
                info!(user_id = %user_id, token_id = %token_id, "Tokens revoked")
            }
        }
    }
}
