//! Session ledger: which token ids are currently live.
//!
//! Both halves of every issued pair get a row. A row past its `expires_at`
//! is dead even while it is still stored; the cleanup sweep only reclaims
//! space.

use serde::Serialize;
use sqlx::sqlite::SqlitePool;
use tracing::error;

use crate::error::{AuthError, Result};
use crate::issuer::{TokenPair, refresh_token_id};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
        }
    }
}

impl TryFrom<&str> for TokenType {
    type Error = String;

    fn try_from(s: &str) -> std::result::Result<Self, Self::Error> {
        match s {
            "access" => Ok(TokenType::Access),
            "refresh" => Ok(TokenType::Refresh),
            other => Err(format!("unknown token type: {other}")),
        }
    }
}

/// A persisted token half.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionRecord {
    pub token_id: String,
    pub user_id: String,
    pub token_type: TokenType,
    /// Unix seconds
    pub expires_at: u64,
}

impl SessionRecord {
    pub fn is_expired_at(&self, now: u64) -> bool {
        now > self.expires_at
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    token_id: String,
    user_id: String,
    token_type: String,
    expires_at: i64,
}

impl TryFrom<SessionRow> for SessionRecord {
    type Error = AuthError;

    fn try_from(row: SessionRow) -> Result<Self> {
        let token_type = TokenType::try_from(row.token_type.as_str())
            .map_err(|e| AuthError::PersistenceFailure(sqlx::Error::Decode(e.into())))?;
        Ok(Self {
            token_id: row.token_id,
            user_id: row.user_id,
            token_type,
            expires_at: u64::try_from(row.expires_at).unwrap_or(0),
        })
    }
}

/// Outcome of revoking both halves of a pair. `false` means the row was
/// already absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairRevocation {
    pub access: bool,
    pub refresh: bool,
}

#[derive(Clone)]
pub struct SessionLedger {
    pool: SqlitePool,
}

impl SessionLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a record. Token ids are unique across the whole ledger.
    pub async fn record(
        &self,
        user_id: &str,
        token_id: &str,
        token_type: TokenType,
        expires_at: u64,
    ) -> Result<()> {
        insert_record(&self.pool, user_id, token_id, token_type, expires_at).await
    }

    /// Record both halves of a pair in one transaction: both rows are
    /// written or neither is.
    pub async fn record_pair(&self, pair: &TokenPair) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let written = async {
            insert_record(
                &mut *tx,
                &pair.user_id,
                &pair.access_token_id,
                TokenType::Access,
                pair.access_expires_at,
            )
            .await?;
            insert_record(
                &mut *tx,
                &pair.user_id,
                &pair.refresh_token_id,
                TokenType::Refresh,
                pair.refresh_expires_at,
            )
            .await
        }
        .await;

        match written {
            Ok(()) => tx.commit().await?,
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    error!(error = %rollback, "Failed to roll back session pair");
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// Find a record by token id. Expired rows are returned as-is.
    pub async fn lookup(&self, token_id: &str) -> Result<Option<SessionRecord>> {
        let row: Option<SessionRow> = sqlx::query_as(
            "SELECT token_id, user_id, token_type, expires_at FROM sessions WHERE token_id = ?",
        )
        .bind(token_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(SessionRecord::try_from).transpose()
    }

    /// Look up a record and require it to be live at `now`.
    pub async fn check(&self, token_id: &str, now: u64) -> Result<SessionRecord> {
        let record = self.lookup(token_id).await?.ok_or(AuthError::Revoked)?;
        if record.is_expired_at(now) {
            return Err(AuthError::Expired);
        }
        Ok(record)
    }

    /// Delete a record. Returns whether a row was removed; exactly one of
    /// any number of concurrent callers sees `true`.
    pub async fn revoke(&self, token_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE token_id = ?")
            .bind(token_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Revoke an access token and the refresh token derived from it. Both
    /// deletes are attempted even if the first fails.
    pub async fn revoke_pair(&self, access_token_id: &str, user_id: &str) -> Result<PairRevocation> {
        let refresh_id = refresh_token_id(access_token_id, user_id);
        let access = self.revoke(access_token_id).await;
        let refresh = self.revoke(&refresh_id).await;

        match (access, refresh) {
            (Ok(access), Ok(refresh)) => Ok(PairRevocation { access, refresh }),
            (Err(e), Ok(_)) | (Ok(_), Err(e)) => Err(e),
            (Err(access_err), Err(refresh_err)) => {
                error!(token_id = %refresh_id, error = %refresh_err, "Failed to revoke refresh token");
                Err(access_err)
            }
        }
    }

    /// Delete every record of a user (logout everywhere).
    pub async fn revoke_all(&self, user_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Snapshot of every stored record for a user, expired ones included.
    pub async fn list_active(&self, user_id: &str) -> Result<Vec<SessionRecord>> {
        let rows: Vec<SessionRow> = sqlx::query_as(
            "SELECT token_id, user_id, token_type, expires_at FROM sessions WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(SessionRecord::try_from).collect()
    }

    /// Delete all records that expired before `now`.
    pub async fn delete_expired(&self, now: u64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at < ?")
            .bind(to_db_secs(now))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

async fn insert_record<'e, E>(
    executor: E,
    user_id: &str,
    token_id: &str,
    token_type: TokenType,
    expires_at: u64,
) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        "INSERT INTO sessions (token_id, user_id, token_type, expires_at) VALUES (?, ?, ?, ?)",
    )
    .bind(token_id)
    .bind(user_id)
    .bind(token_type.as_str())
    .bind(to_db_secs(expires_at))
    .execute(executor)
    .await
    .map_err(|e| {
        if e.as_database_error()
            .is_some_and(|db| db.is_unique_violation())
        {
            AuthError::DuplicateToken
        } else {
            AuthError::PersistenceFailure(e)
        }
    })?;
    Ok(())
}

fn to_db_secs(secs: u64) -> i64 {
    i64::try_from(secs).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::jwt::now_secs;

    fn pair(access_id: &str, user_id: &str, now: u64) -> TokenPair {
        TokenPair {
            user_id: user_id.to_string(),
            access_token: String::new(),
            refresh_token: String::new(),
            access_token_id: access_id.to_string(),
            refresh_token_id: refresh_token_id(access_id, user_id),
            issued_at: now,
            access_expires_at: now + 1800,
            refresh_expires_at: now + 604800,
        }
    }

    #[tokio::test]
    async fn test_record_and_lookup() {
        let db = Database::open(":memory:").await.unwrap();
        let ledger = db.sessions();

        ledger
            .record("user-1", "tok-1", TokenType::Access, 2_000)
            .await
            .unwrap();

        let record = ledger.lookup("tok-1").await.unwrap().unwrap();
        assert_eq!(record.user_id, "user-1");
        assert_eq!(record.token_type, TokenType::Access);
        assert_eq!(record.expires_at, 2_000);

        assert!(ledger.lookup("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_token_id_rejected_across_users() {
        let db = Database::open(":memory:").await.unwrap();
        let ledger = db.sessions();

        ledger
            .record("user-1", "tok-1", TokenType::Access, 2_000)
            .await
            .unwrap();
        let result = ledger
            .record("user-2", "tok-1", TokenType::Refresh, 2_000)
            .await;

        assert!(matches!(result, Err(AuthError::DuplicateToken)));
    }

    #[tokio::test]
    async fn test_check_distinguishes_expired_from_missing() {
        let db = Database::open(":memory:").await.unwrap();
        let ledger = db.sessions();

        ledger
            .record("user-1", "tok-1", TokenType::Access, 1_000)
            .await
            .unwrap();

        assert!(ledger.check("tok-1", 1_000).await.is_ok());
        assert!(matches!(
            ledger.check("tok-1", 1_001).await,
            Err(AuthError::Expired)
        ));
        assert!(matches!(
            ledger.check("missing", 0).await,
            Err(AuthError::Revoked)
        ));
        assert!(ledger.lookup("tok-1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent() {
        let db = Database::open(":memory:").await.unwrap();
        let ledger = db.sessions();

        ledger
            .record("user-1", "tok-1", TokenType::Access, 2_000)
            .await
            .unwrap();

        assert!(ledger.revoke("tok-1").await.unwrap());
        assert!(!ledger.revoke("tok-1").await.unwrap());
        assert!(!ledger.revoke("never-existed").await.unwrap());
    }

    #[tokio::test]
    async fn test_record_pair_and_revoke_pair() {
        let db = Database::open(":memory:").await.unwrap();
        let ledger = db.sessions();
        let now = now_secs();
        let pair = pair("acc-1", "user-1", now);

        ledger.record_pair(&pair).await.unwrap();
        let refresh = ledger.lookup("acc-1++user-1").await.unwrap().unwrap();
        assert_eq!(refresh.token_type, TokenType::Refresh);
        assert_eq!(refresh.expires_at, now + 604800);

        let revoked = ledger.revoke_pair("acc-1", "user-1").await.unwrap();
        assert_eq!(
            revoked,
            PairRevocation {
                access: true,
                refresh: true
            }
        );
        assert!(ledger.lookup("acc-1").await.unwrap().is_none());
        assert!(ledger.lookup("acc-1++user-1").await.unwrap().is_none());

        let again = ledger.revoke_pair("acc-1", "user-1").await.unwrap();
        assert_eq!(
            again,
            PairRevocation {
                access: false,
                refresh: false
            }
        );
    }

    #[tokio::test]
    async fn test_revoke_pair_with_one_half_missing() {
        let db = Database::open(":memory:").await.unwrap();
        let ledger = db.sessions();

        ledger
            .record("user-1", "acc-1++user-1", TokenType::Refresh, 2_000)
            .await
            .unwrap();

        let revoked = ledger.revoke_pair("acc-1", "user-1").await.unwrap();
        assert!(!revoked.access);
        assert!(revoked.refresh);
    }

    #[tokio::test]
    async fn test_revoke_pair_continues_after_access_failure() {
        let db = Database::open(":memory:").await.unwrap();
        let ledger = db.sessions();
        ledger
            .record_pair(&pair("acc-1", "user-1", now_secs()))
            .await
            .unwrap();

        sqlx::query(
            "CREATE TRIGGER block_access_delete BEFORE DELETE ON sessions \
             WHEN old.token_type = 'access' \
             BEGIN SELECT RAISE(ABORT, 'access delete blocked'); END",
        )
        .execute(db.pool())
        .await
        .unwrap();

        let result = ledger.revoke_pair("acc-1", "user-1").await;
        assert!(matches!(result, Err(AuthError::PersistenceFailure(_))));
        assert!(ledger.lookup("acc-1").await.unwrap().is_some());
        assert!(ledger.lookup("acc-1++user-1").await.unwrap().is_none());
    }

    #[test]
    fn test_token_type_parsing() {
        assert_eq!(TokenType::try_from("access"), Ok(TokenType::Access));
        assert_eq!(TokenType::try_from("refresh"), Ok(TokenType::Refresh));
        assert!(TokenType::try_from("Access").is_err());
        assert!(TokenType::try_from("").is_err());
    }

    #[tokio::test]
    async fn test_record_pair_is_all_or_nothing() {
        let db = Database::open(":memory:").await.unwrap();
        let ledger = db.sessions();
        let now = now_secs();
        let pair = pair("acc-1", "user-1", now);

        // Occupy the refresh id so the second insert fails.
        ledger
            .record("user-9", &pair.refresh_token_id, TokenType::Refresh, now)
            .await
            .unwrap();

        let result = ledger.record_pair(&pair).await;
        assert!(matches!(result, Err(AuthError::DuplicateToken)));
        assert!(ledger.lookup("acc-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_active_includes_expired_and_is_per_user() {
        let db = Database::open(":memory:").await.unwrap();
        let ledger = db.sessions();

        ledger
            .record("user-1", "tok-1", TokenType::Access, 10)
            .await
            .unwrap();
        ledger
            .record("user-1", "tok-2", TokenType::Refresh, u64::MAX / 4)
            .await
            .unwrap();
        ledger
            .record("user-2", "tok-3", TokenType::Access, 10)
            .await
            .unwrap();

        let mut ids: Vec<String> = ledger
            .list_active("user-1")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.token_id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["tok-1".to_string(), "tok-2".to_string()]);

        assert!(ledger.list_active("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_revoke_all() {
        let db = Database::open(":memory:").await.unwrap();
        let ledger = db.sessions();

        ledger.record_pair(&pair("acc-1", "user-1", 100)).await.unwrap();
        ledger.record_pair(&pair("acc-2", "user-1", 100)).await.unwrap();
        ledger.record_pair(&pair("acc-3", "user-2", 100)).await.unwrap();

        assert_eq!(ledger.revoke_all("user-1").await.unwrap(), 4);
        assert!(ledger.list_active("user-1").await.unwrap().is_empty());
        assert_eq!(ledger.list_active("user-2").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_delete_expired() {
        let db = Database::open(":memory:").await.unwrap();
        let ledger = db.sessions();

        ledger
            .record("user-1", "old", TokenType::Access, 100)
            .await
            .unwrap();
        ledger
            .record("user-1", "new", TokenType::Access, 10_000)
            .await
            .unwrap();

        assert_eq!(ledger.delete_expired(5_000).await.unwrap(), 1);
        assert!(ledger.lookup("old").await.unwrap().is_none());
        assert!(ledger.lookup("new").await.unwrap().is_some());
    }
}
