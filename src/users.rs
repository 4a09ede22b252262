//! The user collaborator consumed by the token lifecycle.

use async_trait::async_trait;

use crate::error::Result;
use crate::jwt::Claims;

/// Role allowed to manage other users' sessions.
pub const ROLE_ADMIN: &str = "ROLE_ADMIN";

/// An account as loaded from a [`UserStore`].
#[derive(Debug, Clone)]
pub struct User {
    /// Stable, immutable identifier
    pub id: String,
    pub username: String,
    pub email: String,
    /// Comma-joined role list, e.g. `ROLE_ADMIN,ROLE_MODERATOR`
    pub roles: String,
    pub password_hash: String,
    /// Extra claims embedded in access tokens issued for this user
    pub details: Claims,
}

impl User {
    pub fn role_list(&self) -> impl Iterator<Item = &str> {
        self.roles.split(',').map(str::trim).filter(|r| !r.is_empty())
    }
}

/// Credential storage and lookup.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn load_by_id(&self, id: &str) -> Result<Option<User>>;

    async fn load_by_username(&self, username: &str) -> Result<Option<User>>;

    async fn verify_password(&self, user: &User, password: &str) -> bool;

    /// Spend the cost of a password check when no user matched, so a
    /// missing account takes as long to reject as a wrong password.
    async fn verify_unknown(&self, password: &str);
}
