/// Server-side login sessions
///
/// The browser holds an opaque token in the session cookie; the server only
/// stores its SHA-256 digest. A session has an absolute lifetime fixed at
/// login and is never extended.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use uuid::Uuid;

/// Default absolute session lifetime in seconds
pub const DEFAULT_SESSION_TTL_SECS: i64 = 3600;

/// Stored session row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SessionRecord {
    /// Hex SHA-256 of the cookie token
    pub token_hash: String,

    pub user_id: Uuid,

    pub created_at: DateTime<Utc>,

    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// A session about to be issued, before it is bound to a user
///
/// Registration creates the user and the session in the same transaction, so
/// the user id is only known inside the store.
#[derive(Debug, Clone)]
pub struct SessionGrant {
    pub token_hash: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SessionGrant {
    pub fn new(token_hash: String, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            token_hash,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    /// Binds the grant to a user
    pub fn for_user(self, user_id: Uuid) -> SessionRecord {
        SessionRecord {
            token_hash: self.token_hash,
            user_id,
            created_at: self.created_at,
            expires_at: self.expires_at,
        }
    }
}

impl SessionRecord {
    pub async fn insert<'e, E>(executor: E, record: &SessionRecord) -> Result<(), sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query(
            r#"
            INSERT INTO sessions (token_hash, user_id, created_at, expires_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&record.token_hash)
        .bind(record.user_id)
        .bind(record.created_at)
        .bind(record.expires_at)
        .execute(executor)
        .await?;

        Ok(())
    }

    pub async fn find_by_token_hash<'e, E>(
        executor: E,
        token_hash: &str,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, SessionRecord>(
            r#"
            SELECT token_hash, user_id, created_at, expires_at
            FROM sessions
            WHERE token_hash = $1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(executor)
        .await
    }

    pub async fn delete_by_token_hash<'e, E>(
        executor: E,
        token_hash: &str,
    ) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query("DELETE FROM sessions WHERE token_hash = $1")
            .bind(token_hash)
            .execute(executor)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn purge_expired<'e, E>(executor: E, now: DateTime<Utc>) -> Result<u64, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= $1")
            .bind(now)
            .execute(executor)
            .await?;

        Ok(result.rows_affected())
    }
}
