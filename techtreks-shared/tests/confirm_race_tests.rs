/// Concurrent confirmations of one pending registration
///
/// `InFlightStore` holds the first round of `find_pending` calls at a barrier
/// until all requests have read the record, so each of them acts on the same
/// snapshot. The attempt cap must still hold.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Barrier;
use uuid::Uuid;

use techtreks_shared::auth::{
    context::RequestContext, registration::RegistrationService, validation::RegistrationPolicy,
    AuthError,
};
use techtreks_shared::email::RecordingDispatcher;
use techtreks_shared::models::{
    message::{Message, NewMessage},
    pending_verification::{NewPendingVerification, PendingVerification},
    product::{NewProduct, Product},
    session::{SessionGrant, SessionRecord},
    user::User,
};
use techtreks_shared::store::{
    FailedAttempt, MemoryStore, MessageRepository, PendingVerificationRepository,
    ProductRepository, Promotion, SessionRepository, Store, StoreResult, UserRepository,
};

const IN_FLIGHT: usize = 10;

struct InFlightStore {
    inner: MemoryStore,
    barrier: Barrier,
    reads: AtomicUsize,
}

#[async_trait]
impl UserRepository for InFlightStore {
    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        self.inner.find_user_by_id(id).await
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        self.inner.find_user_by_username(username).await
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        self.inner.find_user_by_email(email).await
    }
}

#[async_trait]
impl PendingVerificationRepository for InFlightStore {
    async fn find_pending(&self, email: &str) -> StoreResult<Option<PendingVerification>> {
        let snapshot = self.inner.find_pending(email).await;
        if self.reads.fetch_add(1, Ordering::SeqCst) < IN_FLIGHT {
            self.barrier.wait().await;
        }
        snapshot
    }

    async fn replace_pending(
        &self,
        pending: NewPendingVerification,
    ) -> StoreResult<PendingVerification> {
        self.inner.replace_pending(pending).await
    }

    async fn record_failed_attempt(&self, email: &str) -> StoreResult<FailedAttempt> {
        self.inner.record_failed_attempt(email).await
    }

    async fn reissue_pending(
        &self,
        email: &str,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<Option<PendingVerification>> {
        self.inner.reissue_pending(email, code, expires_at).await
    }

    async fn delete_pending(&self, email: &str) -> StoreResult<bool> {
        self.inner.delete_pending(email).await
    }

    async fn promote_pending(&self, promotion: Promotion) -> StoreResult<User> {
        self.inner.promote_pending(promotion).await
    }

    async fn purge_expired_pending(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        self.inner.purge_expired_pending(now).await
    }
}

#[async_trait]
impl SessionRepository for InFlightStore {
    async fn find_session(&self, token_hash: &str) -> StoreResult<Option<SessionRecord>> {
        self.inner.find_session(token_hash).await
    }

    async fn start_session(
        &self,
        user_id: Uuid,
        grant: SessionGrant,
        replaces: Option<&str>,
    ) -> StoreResult<SessionRecord> {
        self.inner.start_session(user_id, grant, replaces).await
    }

    async fn delete_session(&self, token_hash: &str) -> StoreResult<bool> {
        self.inner.delete_session(token_hash).await
    }

    async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        self.inner.purge_expired_sessions(now).await
    }
}

#[async_trait]
impl MessageRepository for InFlightStore {
    async fn insert_message(&self, message: NewMessage) -> StoreResult<Message> {
        self.inner.insert_message(message).await
    }

    async fn list_conversation(&self, user_a: Uuid, user_b: Uuid) -> StoreResult<Vec<Message>> {
        self.inner.list_conversation(user_a, user_b).await
    }
}

#[async_trait]
impl ProductRepository for InFlightStore {
    async fn insert_product(&self, product: NewProduct) -> StoreResult<Product> {
        self.inner.insert_product(product).await
    }

    async fn find_product(&self, id: Uuid) -> StoreResult<Option<Product>> {
        self.inner.find_product(id).await
    }

    async fn update_product(&self, product: &Product) -> StoreResult<Option<Product>> {
        self.inner.update_product(product).await
    }

    async fn delete_product(&self, id: Uuid, seller_id: Uuid) -> StoreResult<bool> {
        self.inner.delete_product(id, seller_id).await
    }

    async fn list_products_by_seller(
        &self,
        seller_id: Uuid,
        listed_only: bool,
    ) -> StoreResult<Vec<Product>> {
        self.inner.list_products_by_seller(seller_id, listed_only).await
    }
}

#[async_trait]
impl Store for InFlightStore {
    async fn ping(&self) -> StoreResult<()> {
        self.inner.ping().await
    }
}

const EMAIL: &str = "alice@nyu.edu";
const CODE: &str = "4321";

/// Stages a registration with a known code behind a gated store
async fn setup() -> (Arc<InFlightStore>, Arc<RegistrationService>) {
    let store = Arc::new(InFlightStore {
        inner: MemoryStore::new(),
        barrier: Barrier::new(IN_FLIGHT),
        reads: AtomicUsize::new(0),
    });
    store
        .inner
        .replace_pending(NewPendingVerification::issued_at(
            EMAIL.to_string(),
            "alice".to_string(),
            "hash".to_string(),
            CODE.to_string(),
            Utc::now(),
        ))
        .await
        .unwrap();

    let service = Arc::new(RegistrationService::new(
        store.clone(),
        Arc::new(RecordingDispatcher::new()),
        RegistrationPolicy::default(),
        Duration::seconds(3600),
    ));
    (store, service)
}

/// Submits every code at once and returns the results
async fn confirm_all(
    service: &Arc<RegistrationService>,
    codes: Vec<String>,
) -> Vec<Result<(), AuthError>> {
    let handles: Vec<_> = codes
        .into_iter()
        .map(|code| {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .confirm(&RequestContext::anonymous(), EMAIL, &code)
                    .await
                    .map(|_| ())
            })
        })
        .collect();

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }
    results
}

fn wrong_codes(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("{}", 1000 + i)).collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_simultaneous_wrong_codes_are_capped() {
    let (store, service) = setup().await;

    let results = confirm_all(&service, wrong_codes(IN_FLIGHT)).await;

    let invalid = results
        .iter()
        .filter(|r| matches!(r, Err(AuthError::InvalidCode { .. })))
        .count();
    let turned_away = results
        .iter()
        .filter(|r| matches!(r, Err(AuthError::TooManyAttempts | AuthError::NotFound(_))))
        .count();
    assert_eq!(invalid, 5, "only five wrong codes may be evaluated");
    assert_eq!(turned_away, IN_FLIGHT - 5);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(AuthError::TooManyAttempts))));

    // The record was purged once the budget ran out
    assert!(store.inner.find_pending(EMAIL).await.unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_right_code_is_refused_once_budget_is_spent_concurrently() {
    let (store, service) = setup().await;

    let mut codes = wrong_codes(IN_FLIGHT - 1);
    codes.push(CODE.to_string());
    let results = confirm_all(&service, codes).await;

    let confirmed = results.iter().filter(|r| r.is_ok()).count();
    let users = store.inner.user_count().await;
    assert_eq!(confirmed, users);

    // Either the right code won before five failures were counted, or it
    // was refused; never both a user and more than five failures.
    let invalid = results
        .iter()
        .filter(|r| matches!(r, Err(AuthError::InvalidCode { .. })))
        .count();
    assert!(invalid <= 5);
    if users == 1 {
        assert!(invalid < 5);
    }
}
