use std::sync::LazyLock;

use argon2::Argon2;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;
use tracing::warn;
use uuid::Uuid;

use crate::error::Result;
use crate::jwt::Claims;
use crate::users::{User, UserStore};

/// Roles assigned to self-registered users.
pub const DEFAULT_ROLES: &str = "ROLE_USER";

/// Hash checked against when a login names no existing user.
static DECOY_HASH: LazyLock<String> = LazyLock::new(|| {
    let secret: [u8; 16] = rand::random();
    let password: String = secret.iter().map(|b| format!("{b:02x}")).collect();
    hash_password(&password).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to build decoy password hash");
        String::new()
    })
});

#[derive(Debug, thiserror::Error)]
pub enum CreateUserError {
    #[error("username already taken")]
    UsernameTaken,
    #[error("failed to hash password: {0}")]
    Hashing(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// SQLite-backed [`UserStore`] with Argon2 password hashes.
#[derive(Clone)]
pub struct SqliteUserStore {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    username: String,
    email: String,
    roles: String,
    password_hash: String,
    details: String,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        let details = serde_json::from_str(&row.details).unwrap_or_else(|e| {
            warn!(user_id = %row.id, error = %e, "Ignoring unreadable user details");
            Claims::new()
        });
        Self {
            id: row.id,
            username: row.username,
            email: row.email,
            roles: row.roles,
            password_hash: row.password_hash,
            details,
        }
    }
}

impl SqliteUserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a user with a fresh UUID and a hashed password.
    pub async fn create(
        &self,
        username: &str,
        email: &str,
        password: &str,
        roles: &str,
    ) -> std::result::Result<User, CreateUserError> {
        let password = password.to_string();
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .map_err(|e| CreateUserError::Hashing(e.to_string()))??;

        let id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO users (id, username, email, roles, password_hash) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(username)
        .bind(email)
        .bind(roles)
        .bind(&password_hash)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if e.as_database_error()
                .is_some_and(|db| db.is_unique_violation())
            {
                CreateUserError::UsernameTaken
            } else {
                CreateUserError::Database(e)
            }
        })?;

        Ok(User {
            id,
            username: username.to_string(),
            email: email.to_string(),
            roles: roles.to_string(),
            password_hash,
            details: Claims::new(),
        })
    }

    /// Get a user by ID.
    pub async fn get_by_id(&self, id: &str) -> std::result::Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, username, email, roles, password_hash, details FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    /// Get a user by username (case-insensitive).
    pub async fn get_by_username(
        &self,
        username: &str,
    ) -> std::result::Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, username, email, roles, password_hash, details FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    /// Replace the comma-joined role list of a user.
    pub async fn set_roles(&self, id: &str, roles: &str) -> std::result::Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET roles = ? WHERE id = ?")
            .bind(roles)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Replace the extra claims embedded in this user's access tokens.
    pub async fn set_details(
        &self,
        id: &str,
        details: &Claims,
    ) -> std::result::Result<bool, sqlx::Error> {
        let json = serde_json::to_string(details).map_err(|e| sqlx::Error::Encode(e.into()))?;
        let result = sqlx::query("UPDATE users SET details = ? WHERE id = ?")
            .bind(json)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a user by ID.
    pub async fn delete(&self, id: &str) -> std::result::Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl UserStore for SqliteUserStore {
    async fn load_by_id(&self, id: &str) -> Result<Option<User>> {
        Ok(self.get_by_id(id).await?)
    }

    async fn load_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(self.get_by_username(username).await?)
    }

    async fn verify_password(&self, user: &User, password: &str) -> bool {
        let hash = user.password_hash.clone();
        let password = password.to_string();
        tokio::task::spawn_blocking(move || verify_password_hash(&password, &hash))
            .await
            .unwrap_or(false)
    }

    async fn verify_unknown(&self, password: &str) {
        let password = password.to_string();
        let _ = tokio::task::spawn_blocking(move || verify_password_hash(&password, &DECOY_HASH))
            .await;
    }
}

/// Hash a password with Argon2id into a PHC string.
pub fn hash_password(password: &str) -> std::result::Result<String, CreateUserError> {
    let salt_bytes: [u8; 16] = rand::random();
    let salt =
        SaltString::encode_b64(&salt_bytes).map_err(|e| CreateUserError::Hashing(e.to_string()))?;

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| CreateUserError::Hashing(e.to_string()))
}

fn verify_password_hash(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}
