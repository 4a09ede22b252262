//! Error taxonomy shared by the token and session lifecycle.
//!
//! Every variant maps to a coarse denial category. Messages never reveal
//! which reserved claim or internal check failed.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Username unknown or password mismatch.
    #[error("invalid credentials")]
    InvalidCredentials,
    /// No usable `Bearer` credential was presented.
    #[error("missing credentials")]
    MissingCredentials,
    /// Token could not be parsed or lacks required claims.
    #[error("malformed token")]
    Malformed,
    /// Token MAC does not match the expected secret.
    #[error("invalid token signature")]
    InvalidSignature,
    /// Token or session record is past its expiry.
    #[error("token expired")]
    Expired,
    /// Token id is no longer present in the session ledger.
    #[error("token revoked")]
    Revoked,
    /// Token id already exists in the session ledger.
    #[error("duplicate token id")]
    DuplicateToken,
    /// Owner of a token could not be loaded.
    #[error("user not found")]
    UserNotFound,
    /// Signing failed, typically a secret or claim misconfiguration.
    #[error("failed to sign token: {0}")]
    SigningFailed(String),
    /// The backing store rejected an operation.
    #[error("persistence failure: {0}")]
    PersistenceFailure(#[from] sqlx::Error),
}

impl AuthError {
    /// Verification-layer errors mean the presented token is unusable and
    /// the caller must re-authenticate.
    pub fn is_verification_failure(&self) -> bool {
        matches!(
            self,
            Self::MissingCredentials | Self::Malformed | Self::InvalidSignature | Self::Expired
        )
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
