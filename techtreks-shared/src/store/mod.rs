/// Repository interfaces over the shared state
///
/// The auth flows never talk to the database directly. They depend on these
/// traits, one per entity, combined into [`Store`]:
///
/// - [`UserRepository`]: confirmed accounts (read-only from the outside;
///   users are only created through [`PendingVerificationRepository::promote_pending`])
/// - [`PendingVerificationRepository`]: staged registrations
/// - [`SessionRepository`]: server-side sessions
/// - [`MessageRepository`]: direct messages
/// - [`ProductRepository`]: marketplace listings
///
/// Every method may fail with [`StoreError::Conflict`] when a uniqueness
/// constraint rejects the write, or [`StoreError::Backend`] for anything else.
/// Methods documented as atomic either apply all their effects or none.
///
/// # Implementations
///
/// - [`postgres::PgStore`]: PostgreSQL via sqlx, one transaction per atomic method
/// - [`memory::MemoryStore`]: in-process maps behind a single async mutex

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    message::{Message, NewMessage},
    pending_verification::{NewPendingVerification, PendingVerification},
    product::{NewProduct, Product},
    session::{SessionGrant, SessionRecord},
    user::User,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Store-level failure
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write, or a guarded row changed
    /// underneath the operation
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Connection, query or serialization failure
    #[error("Store backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                let constraint = db_err.constraint().unwrap_or("unique").to_string();
                StoreError::Conflict(constraint)
            }
            other => StoreError::Backend(other.to_string()),
        }
    }
}

/// Outcome of counting one wrong verification code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailedAttempt {
    /// The guess was counted; carries the new total
    Recorded(i32),

    /// The record already held the maximum number of failures; nothing was counted
    Exhausted,

    /// No pending record for this email
    Missing,
}

/// Confirmed pending registration, ready to become a user
///
/// Carries the pending record exactly as it was read when the code matched,
/// plus the session to open for the new user.
#[derive(Debug, Clone)]
pub struct Promotion {
    pub pending: PendingVerification,

    /// Time of the confirming request; the code must still be open then
    pub confirmed_at: DateTime<Utc>,

    /// Session issued to the new user
    pub session: SessionGrant,

    /// Digest of the session the request arrived with, closed in the same step
    pub replaces_session: Option<String>,
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>>;

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>>;

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
}

#[async_trait]
pub trait PendingVerificationRepository: Send + Sync {
    async fn find_pending(&self, email: &str) -> StoreResult<Option<PendingVerification>>;

    /// Atomically deletes every pending record with the same email or
    /// username and inserts `pending`
    ///
    /// Concurrent calls for the same email or username are serialised, so the
    /// last writer's record is the one that survives.
    async fn replace_pending(
        &self,
        pending: NewPendingVerification,
    ) -> StoreResult<PendingVerification>;

    /// Counts a wrong code, unless the attempt budget is already used up
    ///
    /// The check and the increment are one atomic step, so concurrent wrong
    /// guesses can never record more than `MAX_ATTEMPTS` failures.
    async fn record_failed_attempt(&self, email: &str) -> StoreResult<FailedAttempt>;

    /// Sets a new code and expiry and clears the attempt counter
    async fn reissue_pending(
        &self,
        email: &str,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<Option<PendingVerification>>;

    async fn delete_pending(&self, email: &str) -> StoreResult<bool>;

    /// Atomically turns a confirmed registration into a user with a session
    ///
    /// Deletes the pending row, inserts the user, closes the replaced session
    /// and opens the new one. The row is only consumed if it still carries
    /// the matched code, has fewer than `MAX_ATTEMPTS` failures and has not
    /// expired at `confirmed_at`. Fails with [`StoreError::Conflict`] if the
    /// row was consumed or changed concurrently or the username/email is
    /// already taken; nothing is written in that case.
    async fn promote_pending(&self, promotion: Promotion) -> StoreResult<User>;

    /// Deletes records whose code window closed before `now`
    async fn purge_expired_pending(&self, now: DateTime<Utc>) -> StoreResult<u64>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn find_session(&self, token_hash: &str) -> StoreResult<Option<SessionRecord>>;

    /// Atomically closes `replaces` (if any) and opens a session for `user_id`
    async fn start_session(
        &self,
        user_id: Uuid,
        grant: SessionGrant,
        replaces: Option<&str>,
    ) -> StoreResult<SessionRecord>;

    async fn delete_session(&self, token_hash: &str) -> StoreResult<bool>;

    /// Deletes sessions whose lifetime ended at or before `now`
    async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> StoreResult<u64>;
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn insert_message(&self, message: NewMessage) -> StoreResult<Message>;

    /// Messages between two users, oldest first
    async fn list_conversation(&self, user_a: Uuid, user_b: Uuid) -> StoreResult<Vec<Message>>;
}

#[async_trait]
pub trait ProductRepository: Send + Sync {
    async fn insert_product(&self, product: NewProduct) -> StoreResult<Product>;

    async fn find_product(&self, id: Uuid) -> StoreResult<Option<Product>>;

    /// Saves the editable fields of a listing still owned by `product.seller_id`
    ///
    /// `None` if the listing no longer exists.
    async fn update_product(&self, product: &Product) -> StoreResult<Option<Product>>;

    /// Deletes a listing owned by `seller_id`; false if there was none
    async fn delete_product(&self, id: Uuid, seller_id: Uuid) -> StoreResult<bool>;

    /// A seller's listings, newest first; `listed_only` keeps public active ones
    async fn list_products_by_seller(
        &self,
        seller_id: Uuid,
        listed_only: bool,
    ) -> StoreResult<Vec<Product>>;
}

/// Everything the application needs from persistence
#[async_trait]
pub trait Store:
    UserRepository
    + PendingVerificationRepository
    + SessionRepository
    + MessageRepository
    + ProductRepository
{
    /// Checks that the backend is reachable
    async fn ping(&self) -> StoreResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_database_errors_are_backend_errors() {
        let err = StoreError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, StoreError::Backend(_)));
    }

    #[test]
    fn test_error_display() {
        let err = StoreError::Conflict("users_email_key".to_string());
        assert_eq!(err.to_string(), "Conflict: users_email_key");
    }
}
