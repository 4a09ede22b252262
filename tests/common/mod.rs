#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use axum::Router;
use tokenward::{
    AuthConfig, AuthService, ServerConfig, create_app,
    db::{DEFAULT_ROLES, Database},
    events::{AuthEvent, AuthObserver},
    rate_limit::RateLimitQuotas,
    users::User,
};

pub const ACCESS_SECRET: &[u8] = b"access-secret-for-tests-0123456789abcdef";
pub const REFRESH_SECRET: &[u8] = b"refresh-secret-for-tests-0123456789abcdef";
pub const PASSWORD: &str = "correct horse battery staple";
pub const TEST_IP: &str = "127.0.0.1";

pub fn auth_config(strict_sessions: bool) -> AuthConfig {
    AuthConfig {
        access_secret: ACCESS_SECRET.to_vec(),
        refresh_secret: REFRESH_SECRET.to_vec(),
        strict_sessions,
    }
}

/// Create a service over a fresh in-memory database.
pub async fn test_service(strict_sessions: bool) -> (AuthService, Database) {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    let service = AuthService::new(
        &auth_config(strict_sessions),
        db.sessions(),
        Arc::new(db.users()),
    )
    .expect("Failed to create auth service");
    (service, db)
}

/// Create a user with the default roles and [`PASSWORD`].
pub async fn create_user(db: &Database, username: &str) -> User {
    db.users()
        .create(username, &format!("{username}@example.com"), PASSWORD, DEFAULT_ROLES)
        .await
        .expect("Failed to create user")
}

/// Create a test app and return (app, db).
pub async fn test_app(no_signup: bool, rate_limits: RateLimitQuotas) -> (Router, Database) {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    let config = ServerConfig {
        db: db.clone(),
        auth: auth_config(false),
        no_signup,
        trust_forwarded_for: true,
        rate_limits,
    };
    let app = create_app(&config).expect("Failed to create app");
    (app, db)
}

/// Observer that keeps every event for later inspection.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<AuthEvent>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<AuthEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl AuthObserver for RecordingObserver {
    fn on_event(&self, event: &AuthEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
