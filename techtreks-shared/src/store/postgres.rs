/// PostgreSQL implementation of [`Store`]
///
/// Single-statement operations run directly on the pool. Multi-step
/// operations open a transaction and either commit every effect or return
/// early, letting the dropped transaction roll back.
///
/// # Example
///
/// ```no_run
/// use techtreks_shared::db::pool::{create_pool, DatabaseConfig};
/// use techtreks_shared::store::{PgStore, Store};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig {
///     url: std::env::var("DATABASE_URL")?,
///     ..Default::default()
/// })
/// .await?;
///
/// let store = PgStore::new(pool);
/// store.ping().await?;
/// # Ok(())
/// # }
/// ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use super::{
    FailedAttempt, MessageRepository, PendingVerificationRepository, ProductRepository,
    Promotion, SessionRepository, Store, StoreError, StoreResult, UserRepository,
};
use crate::models::{
    message::{Message, NewMessage},
    pending_verification::{NewPendingVerification, PendingVerification},
    product::{NewProduct, Product},
    session::{SessionGrant, SessionRecord},
    user::{CreateUser, User},
};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl UserRepository for PgStore {
    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(User::find_by_id(&self.pool, id).await?)
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        Ok(User::find_by_username(&self.pool, username).await?)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(User::find_by_email(&self.pool, email).await?)
    }
}

#[async_trait]
impl PendingVerificationRepository for PgStore {
    async fn find_pending(&self, email: &str) -> StoreResult<Option<PendingVerification>> {
        Ok(PendingVerification::find_by_email(&self.pool, email).await?)
    }

    async fn replace_pending(
        &self,
        pending: NewPendingVerification,
    ) -> StoreResult<PendingVerification> {
        let mut tx = self.pool.begin().await?;

        PendingVerification::lock_registration(&mut tx, &pending.email, &pending.username)
            .await?;

        let replaced =
            PendingVerification::delete_conflicting(&mut *tx, &pending.email, &pending.username)
                .await?;
        if replaced > 0 {
            debug!(replaced, "Replaced earlier pending verifications");
        }

        let record = PendingVerification::insert(&mut *tx, pending).await?;
        tx.commit().await?;

        Ok(record)
    }

    async fn record_failed_attempt(&self, email: &str) -> StoreResult<FailedAttempt> {
        let mut tx = self.pool.begin().await?;

        // Concurrent guesses queue on the row lock and each sees the count
        // left by the one before it.
        let Some(pending) = PendingVerification::find_for_update(&mut tx, email).await? else {
            return Ok(FailedAttempt::Missing);
        };
        if pending.attempts_exhausted() {
            return Ok(FailedAttempt::Exhausted);
        }

        let outcome = match PendingVerification::increment_attempts(&mut *tx, email).await? {
            Some(attempts) => FailedAttempt::Recorded(attempts),
            None => FailedAttempt::Exhausted,
        };
        tx.commit().await?;

        Ok(outcome)
    }

    async fn reissue_pending(
        &self,
        email: &str,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<Option<PendingVerification>> {
        Ok(PendingVerification::reissue(&self.pool, email, code, expires_at).await?)
    }

    async fn delete_pending(&self, email: &str) -> StoreResult<bool> {
        Ok(PendingVerification::delete_by_email(&self.pool, email).await?)
    }

    async fn promote_pending(&self, promotion: Promotion) -> StoreResult<User> {
        let Promotion {
            pending,
            confirmed_at,
            session,
            replaces_session,
        } = promotion;

        let mut tx = self.pool.begin().await?;

        // The row lock taken by this DELETE makes a concurrent confirmation
        // or failed attempt wait, then re-evaluate the guards.
        if !PendingVerification::consume(&mut *tx, &pending.email, &pending.code, confirmed_at)
            .await?
        {
            return Err(StoreError::Conflict(
                "pending verification already consumed".to_string(),
            ));
        }

        let user = User::create(
            &mut *tx,
            CreateUser {
                username: pending.username,
                email: pending.email,
                password_hash: pending.password_hash,
            },
        )
        .await?;

        if let Some(previous) = replaces_session.as_deref() {
            SessionRecord::delete_by_token_hash(&mut *tx, previous).await?;
        }
        SessionRecord::insert(&mut *tx, &session.for_user(user.id)).await?;

        tx.commit().await?;
        Ok(user)
    }

    async fn purge_expired_pending(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        Ok(PendingVerification::purge_expired(&self.pool, now).await?)
    }
}

#[async_trait]
impl SessionRepository for PgStore {
    async fn find_session(&self, token_hash: &str) -> StoreResult<Option<SessionRecord>> {
        Ok(SessionRecord::find_by_token_hash(&self.pool, token_hash).await?)
    }

    async fn start_session(
        &self,
        user_id: Uuid,
        grant: SessionGrant,
        replaces: Option<&str>,
    ) -> StoreResult<SessionRecord> {
        let record = grant.for_user(user_id);
        let mut tx = self.pool.begin().await?;

        if let Some(previous) = replaces {
            SessionRecord::delete_by_token_hash(&mut *tx, previous).await?;
        }
        SessionRecord::insert(&mut *tx, &record).await?;

        tx.commit().await?;
        Ok(record)
    }

    async fn delete_session(&self, token_hash: &str) -> StoreResult<bool> {
        Ok(SessionRecord::delete_by_token_hash(&self.pool, token_hash).await?)
    }

    async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        Ok(SessionRecord::purge_expired(&self.pool, now).await?)
    }
}

#[async_trait]
impl MessageRepository for PgStore {
    async fn insert_message(&self, message: NewMessage) -> StoreResult<Message> {
        Ok(Message::insert(&self.pool, message).await?)
    }

    async fn list_conversation(&self, user_a: Uuid, user_b: Uuid) -> StoreResult<Vec<Message>> {
        Ok(Message::list_between(&self.pool, user_a, user_b).await?)
    }
}

#[async_trait]
impl ProductRepository for PgStore {
    async fn insert_product(&self, product: NewProduct) -> StoreResult<Product> {
        Ok(Product::insert(&self.pool, product).await?)
    }

    async fn find_product(&self, id: Uuid) -> StoreResult<Option<Product>> {
        Ok(Product::find_by_id(&self.pool, id).await?)
    }

    async fn update_product(&self, product: &Product) -> StoreResult<Option<Product>> {
        Ok(Product::update(&self.pool, product).await?)
    }

    async fn delete_product(&self, id: Uuid, seller_id: Uuid) -> StoreResult<bool> {
        Ok(Product::delete_owned(&self.pool, id, seller_id).await?)
    }

    async fn list_products_by_seller(
        &self,
        seller_id: Uuid,
        listed_only: bool,
    ) -> StoreResult<Vec<Product>> {
        Ok(Product::list_by_seller(&self.pool, seller_id, listed_only).await?)
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> StoreResult<()> {
        crate::db::pool::health_check(&self.pool).await?;
        Ok(())
    }
}
