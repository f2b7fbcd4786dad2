/// Pending email verifications
///
/// A `PendingVerification` stages a registration until the user types in the
/// code that was emailed to them. The row carries everything needed to create
/// the `User` (username, email, password hash), so no user row exists before
/// the address is confirmed.
///
/// # Lifecycle
///
/// ```text
/// start ──> PENDING ──(correct code)──> row deleted, User created
///              │
///              ├──(now > expires_at)────> row deleted (EXPIRED)
///              └──(attempts >= 5)───────> row deleted (FAILED)
/// ```
///
/// # Schema
///
/// ```sql
/// CREATE TABLE pending_verifications (
///     email VARCHAR(254) PRIMARY KEY,
///     username VARCHAR(30) NOT NULL UNIQUE,
///     password_hash VARCHAR(255) NOT NULL,
///     code VARCHAR(4) NOT NULL,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     expires_at TIMESTAMPTZ NOT NULL,
///     attempts INTEGER NOT NULL DEFAULT 0
/// );
/// ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgExecutor};
use subtle::ConstantTimeEq;

/// How long an emailed code stays valid
pub const CODE_TTL_MINUTES: i64 = 10;

/// Failed guesses allowed before the record is purged
pub const MAX_ATTEMPTS: i32 = 5;

/// Registration awaiting email confirmation
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PendingVerification {
    /// Lower-cased email address (primary key)
    pub email: String,

    /// Desired username
    pub username: String,

    /// Argon2id hash of the chosen password
    #[serde(skip_serializing)]
    pub password_hash: String,

    /// 4-digit verification code
    #[serde(skip_serializing)]
    pub code: String,

    pub created_at: DateTime<Utc>,

    /// The code is accepted while `now <= expires_at`
    pub expires_at: DateTime<Utc>,

    /// Number of wrong codes submitted so far
    pub attempts: i32,
}

impl PendingVerification {
    /// Whether the code window has closed
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Whether the attempt budget is used up
    pub fn attempts_exhausted(&self) -> bool {
        self.attempts >= MAX_ATTEMPTS
    }

    /// Guesses left before the record is purged
    pub fn remaining_attempts(&self) -> u32 {
        remaining_after(self.attempts)
    }

    /// Compares in constant time
    pub fn matches_code(&self, code: &str) -> bool {
        self.code.as_bytes().ct_eq(code.as_bytes()).into()
    }

    /// Whether the stored code can still confirm the registration
    pub fn is_redeemable(&self, now: DateTime<Utc>) -> bool {
        !self.is_expired(now) && !self.attempts_exhausted()
    }
}

/// Remaining guesses once `attempts` wrong codes have been recorded
pub fn remaining_after(attempts: i32) -> u32 {
    (MAX_ATTEMPTS - attempts).max(0) as u32
}

/// Expiry timestamp for a code issued at `now`
pub fn code_expiry(now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::minutes(CODE_TTL_MINUTES)
}

/// Input for staging a registration
#[derive(Debug, Clone)]
pub struct NewPendingVerification {
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub code: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl NewPendingVerification {
    /// Builds a record issued at `now`, expiring after [`CODE_TTL_MINUTES`]
    pub fn issued_at(
        email: String,
        username: String,
        password_hash: String,
        code: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            email,
            username,
            password_hash,
            code,
            created_at: now,
            expires_at: code_expiry(now),
        }
    }

    /// Materialises the row as it will be stored
    pub fn into_record(self) -> PendingVerification {
        PendingVerification {
            email: self.email,
            username: self.username,
            password_hash: self.password_hash,
            code: self.code,
            created_at: self.created_at,
            expires_at: self.expires_at,
            attempts: 0,
        }
    }
}

impl PendingVerification {
    /// Finds the pending record for an email
    pub async fn find_by_email<'e, E>(
        executor: E,
        email: &str,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, PendingVerification>(
            r#"
            SELECT email, username, password_hash, code, created_at, expires_at, attempts
            FROM pending_verifications
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(executor)
        .await
    }

    /// Finds and row-locks the pending record until the transaction ends
    pub async fn find_for_update(
        conn: &mut PgConnection,
        email: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, PendingVerification>(
            r#"
            SELECT email, username, password_hash, code, created_at, expires_at, attempts
            FROM pending_verifications
            WHERE email = $1
            FOR UPDATE
            "#,
        )
        .bind(email)
        .fetch_optional(conn)
        .await
    }

    /// Serialises concurrent registrations touching the same email or username
    ///
    /// Takes transaction-scoped advisory locks, always in sorted key order so
    /// two registrations sharing both keys cannot deadlock. Must be called
    /// inside a transaction.
    pub async fn lock_registration(
        conn: &mut PgConnection,
        email: &str,
        username: &str,
    ) -> Result<(), sqlx::Error> {
        let mut keys = [
            format!("pending:email:{}", email),
            format!("pending:username:{}", username),
        ];
        keys.sort();

        for key in &keys {
            sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
                .bind(key)
                .execute(&mut *conn)
                .await?;
        }

        Ok(())
    }

    /// Deletes every pending record holding this email or this username
    pub async fn delete_conflicting<'e, E>(
        executor: E,
        email: &str,
        username: &str,
    ) -> Result<u64, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query(
            "DELETE FROM pending_verifications WHERE email = $1 OR username = $2",
        )
        .bind(email)
        .bind(username)
        .execute(executor)
        .await?;

        Ok(result.rows_affected())
    }

    /// Inserts a new pending record with zero attempts
    pub async fn insert<'e, E>(
        executor: E,
        data: NewPendingVerification,
    ) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, PendingVerification>(
            r#"
            INSERT INTO pending_verifications
                (email, username, password_hash, code, created_at, expires_at, attempts)
            VALUES ($1, $2, $3, $4, $5, $6, 0)
            RETURNING email, username, password_hash, code, created_at, expires_at, attempts
            "#,
        )
        .bind(data.email)
        .bind(data.username)
        .bind(data.password_hash)
        .bind(data.code)
        .bind(data.created_at)
        .bind(data.expires_at)
        .fetch_one(executor)
        .await
    }

    /// Atomically bumps the failed-attempt counter while budget remains
    ///
    /// Returns the new count, or `None` if the record no longer exists or
    /// already holds [`MAX_ATTEMPTS`] failures.
    pub async fn increment_attempts<'e, E>(
        executor: E,
        email: &str,
    ) -> Result<Option<i32>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_scalar::<_, i32>(
            r#"
            UPDATE pending_verifications
            SET attempts = attempts + 1
            WHERE email = $1 AND attempts < $2
            RETURNING attempts
            "#,
        )
        .bind(email)
        .bind(MAX_ATTEMPTS)
        .fetch_optional(executor)
        .await
    }

    /// Replaces the code, restarts the expiry window and clears attempts
    pub async fn reissue<'e, E>(
        executor: E,
        email: &str,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, PendingVerification>(
            r#"
            UPDATE pending_verifications
            SET code = $2, expires_at = $3, attempts = 0
            WHERE email = $1
            RETURNING email, username, password_hash, code, created_at, expires_at, attempts
            "#,
        )
        .bind(email)
        .bind(code)
        .bind(expires_at)
        .fetch_optional(executor)
        .await
    }

    pub async fn delete_by_email<'e, E>(executor: E, email: &str) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query("DELETE FROM pending_verifications WHERE email = $1")
            .bind(email)
            .execute(executor)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Deletes the record only if it still carries `code` and is redeemable
    /// at `now`
    ///
    /// Returns false when a concurrent confirmation or resend got there
    /// first, or when failed attempts or the clock closed the code meanwhile.
    pub async fn consume<'e, E>(
        executor: E,
        email: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query(
            r#"
            DELETE FROM pending_verifications
            WHERE email = $1 AND code = $2 AND attempts < $3 AND expires_at >= $4
            "#,
        )
        .bind(email)
        .bind(code)
        .bind(MAX_ATTEMPTS)
        .bind(now)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Deletes every record whose window closed before `now`
    pub async fn purge_expired<'e, E>(executor: E, now: DateTime<Utc>) -> Result<u64, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query("DELETE FROM pending_verifications WHERE expires_at < $1")
            .bind(now)
            .execute(executor)
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(now: DateTime<Utc>) -> PendingVerification {
        NewPendingVerification::issued_at(
            "alice@nyu.edu".to_string(),
            "alice".to_string(),
            "hash".to_string(),
            "1234".to_string(),
            now,
        )
        .into_record()
    }

    #[test]
    fn test_expiry_is_ten_minutes_and_inclusive() {
        let now = Utc::now();
        let record = pending(now);

        assert_eq!(record.expires_at - record.created_at, Duration::minutes(10));
        assert!(!record.is_expired(record.expires_at));
        assert!(record.is_expired(record.expires_at + Duration::seconds(1)));
    }

    #[test]
    fn test_attempt_budget() {
        let mut record = pending(Utc::now());
        assert_eq!(record.remaining_attempts(), 5);
        assert!(!record.attempts_exhausted());

        record.attempts = 4;
        assert_eq!(record.remaining_attempts(), 1);
        assert!(!record.attempts_exhausted());

        record.attempts = 5;
        assert_eq!(record.remaining_attempts(), 0);
        assert!(record.attempts_exhausted());
    }

    #[test]
    fn test_remaining_after_never_underflows() {
        assert_eq!(remaining_after(7), 0);
    }

    #[test]
    fn test_matches_code() {
        let record = pending(Utc::now());
        assert!(record.matches_code("1234"));
        assert!(!record.matches_code("0000"));
        assert!(!record.matches_code("123"));
        assert!(!record.matches_code("12345"));
    }

    #[test]
    fn test_redeemable_until_expiry_or_budget_runs_out() {
        let now = Utc::now();
        let mut record = pending(now);
        assert!(record.is_redeemable(now));
        assert!(record.is_redeemable(record.expires_at));
        assert!(!record.is_redeemable(record.expires_at + Duration::seconds(1)));

        record.attempts = MAX_ATTEMPTS;
        assert!(!record.is_redeemable(now));
    }
}
