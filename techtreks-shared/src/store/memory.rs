/// In-process implementation of [`Store`]
///
/// All state lives behind one `tokio::sync::Mutex`, so every method is
/// trivially atomic. Uniqueness of usernames and emails is checked by hand
/// and reported with the same constraint names PostgreSQL uses, which keeps
/// the service layer's conflict handling identical across backends.
///
/// Backs the service and HTTP test suites. The server binary always runs on
/// [`super::PgStore`].

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
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
    user::User,
};

#[derive(Default)]
struct State {
    users: HashMap<Uuid, User>,
    pending: HashMap<String, PendingVerification>,
    sessions: HashMap<String, SessionRecord>,
    messages: Vec<Message>,
    products: HashMap<Uuid, Product>,
}

impl State {
    fn user_conflict(&self, username: &str, email: &str) -> Option<&'static str> {
        self.users.values().find_map(|user| {
            if user.username == username {
                Some("users_username_key")
            } else if user.email == email {
                Some("users_email_key")
            } else {
                None
            }
        })
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a confirmed user directly, bypassing verification
    pub async fn insert_user(&self, user: User) -> StoreResult<User> {
        let mut state = self.state.lock().await;
        if let Some(constraint) = state.user_conflict(&user.username, &user.email) {
            return Err(StoreError::Conflict(constraint.to_string()));
        }
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    /// Removes a user, leaving any of their sessions in place
    pub async fn remove_user(&self, id: Uuid) -> bool {
        let mut state = self.state.lock().await;
        state.messages.retain(|m| m.sender_id != id && m.recipient_id != id);
        state.products.retain(|_, p| p.seller_id != id);
        state.users.remove(&id).is_some()
    }

    pub async fn user_count(&self) -> usize {
        self.state.lock().await.users.len()
    }

    pub async fn pending_count(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    pub async fn session_count(&self) -> usize {
        self.state.lock().await.sessions.len()
    }

    /// Overwrites the stored pending record, e.g. to move its expiry
    pub async fn put_pending(&self, pending: PendingVerification) {
        let mut state = self.state.lock().await;
        state.pending.insert(pending.email.clone(), pending);
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.state.lock().await.users.get(&id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let state = self.state.lock().await;
        Ok(state.users.values().find(|u| u.username == username).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let state = self.state.lock().await;
        Ok(state.users.values().find(|u| u.email == email).cloned())
    }
}

#[async_trait]
impl PendingVerificationRepository for MemoryStore {
    async fn find_pending(&self, email: &str) -> StoreResult<Option<PendingVerification>> {
        Ok(self.state.lock().await.pending.get(email).cloned())
    }

    async fn replace_pending(
        &self,
        pending: NewPendingVerification,
    ) -> StoreResult<PendingVerification> {
        let mut state = self.state.lock().await;
        state
            .pending
            .retain(|email, p| *email != pending.email && p.username != pending.username);

        let record = pending.into_record();
        state.pending.insert(record.email.clone(), record.clone());
        Ok(record)
    }

    async fn record_failed_attempt(&self, email: &str) -> StoreResult<FailedAttempt> {
        let mut state = self.state.lock().await;
        Ok(match state.pending.get_mut(email) {
            None => FailedAttempt::Missing,
            Some(p) if p.attempts_exhausted() => FailedAttempt::Exhausted,
            Some(p) => {
                p.attempts += 1;
                FailedAttempt::Recorded(p.attempts)
            }
        })
    }

    async fn reissue_pending(
        &self,
        email: &str,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<Option<PendingVerification>> {
        let mut state = self.state.lock().await;
        Ok(state.pending.get_mut(email).map(|p| {
            p.code = code.to_string();
            p.expires_at = expires_at;
            p.attempts = 0;
            p.clone()
        }))
    }

    async fn delete_pending(&self, email: &str) -> StoreResult<bool> {
        Ok(self.state.lock().await.pending.remove(email).is_some())
    }

    async fn promote_pending(&self, promotion: Promotion) -> StoreResult<User> {
        let Promotion {
            pending,
            confirmed_at,
            session,
            replaces_session,
        } = promotion;

        let mut state = self.state.lock().await;

        let still_current = state
            .pending
            .get(&pending.email)
            .is_some_and(|p| p.code == pending.code && p.is_redeemable(confirmed_at));
        if !still_current {
            return Err(StoreError::Conflict(
                "pending verification already consumed".to_string(),
            ));
        }
        if let Some(constraint) = state.user_conflict(&pending.username, &pending.email) {
            return Err(StoreError::Conflict(constraint.to_string()));
        }

        state.pending.remove(&pending.email);

        let user = User {
            id: Uuid::new_v4(),
            username: pending.username,
            email: pending.email,
            password_hash: pending.password_hash,
            created_at: session.created_at,
        };
        state.users.insert(user.id, user.clone());

        if let Some(previous) = replaces_session.as_deref() {
            state.sessions.remove(previous);
        }
        let record = session.for_user(user.id);
        state.sessions.insert(record.token_hash.clone(), record);

        Ok(user)
    }

    async fn purge_expired_pending(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut state = self.state.lock().await;
        let before = state.pending.len();
        state.pending.retain(|_, p| p.expires_at >= now);
        Ok((before - state.pending.len()) as u64)
    }
}

#[async_trait]
impl SessionRepository for MemoryStore {
    async fn find_session(&self, token_hash: &str) -> StoreResult<Option<SessionRecord>> {
        Ok(self.state.lock().await.sessions.get(token_hash).cloned())
    }

    async fn start_session(
        &self,
        user_id: Uuid,
        grant: SessionGrant,
        replaces: Option<&str>,
    ) -> StoreResult<SessionRecord> {
        let mut state = self.state.lock().await;
        if let Some(previous) = replaces {
            state.sessions.remove(previous);
        }
        if state.sessions.contains_key(&grant.token_hash) {
            return Err(StoreError::Conflict("sessions_pkey".to_string()));
        }

        let record = grant.for_user(user_id);
        state
            .sessions
            .insert(record.token_hash.clone(), record.clone());
        Ok(record)
    }

    async fn delete_session(&self, token_hash: &str) -> StoreResult<bool> {
        Ok(self.state.lock().await.sessions.remove(token_hash).is_some())
    }

    async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut state = self.state.lock().await;
        let before = state.sessions.len();
        state.sessions.retain(|_, s| !s.is_expired(now));
        Ok((before - state.sessions.len()) as u64)
    }
}

#[async_trait]
impl MessageRepository for MemoryStore {
    async fn insert_message(&self, message: NewMessage) -> StoreResult<Message> {
        let mut state = self.state.lock().await;
        for id in [message.sender_id, message.recipient_id] {
            if !state.users.contains_key(&id) {
                return Err(StoreError::Backend(format!("unknown user {}", id)));
            }
        }

        let stored = Message {
            id: Uuid::new_v4(),
            sender_id: message.sender_id,
            recipient_id: message.recipient_id,
            body: message.body,
            created_at: message.created_at,
        };
        state.messages.push(stored.clone());
        Ok(stored)
    }

    async fn list_conversation(&self, user_a: Uuid, user_b: Uuid) -> StoreResult<Vec<Message>> {
        let state = self.state.lock().await;
        // Insertion order breaks ties between equal timestamps
        let mut conversation: Vec<Message> = state
            .messages
            .iter()
            .filter(|m| m.is_between(user_a, user_b))
            .cloned()
            .collect();
        conversation.sort_by_key(|m| m.created_at);
        Ok(conversation)
    }
}

#[async_trait]
impl ProductRepository for MemoryStore {
    async fn insert_product(&self, product: NewProduct) -> StoreResult<Product> {
        let mut state = self.state.lock().await;
        if !state.users.contains_key(&product.seller_id) {
            return Err(StoreError::Backend(format!("unknown user {}", product.seller_id)));
        }

        let record = product.into_record();
        state.products.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_product(&self, id: Uuid) -> StoreResult<Option<Product>> {
        Ok(self.state.lock().await.products.get(&id).cloned())
    }

    async fn update_product(&self, product: &Product) -> StoreResult<Option<Product>> {
        let mut state = self.state.lock().await;
        Ok(match state.products.get_mut(&product.id) {
            Some(stored) if stored.seller_id == product.seller_id => {
                *stored = Product {
                    id: stored.id,
                    seller_id: stored.seller_id,
                    created_at: stored.created_at,
                    ..product.clone()
                };
                Some(stored.clone())
            }
            _ => None,
        })
    }

    async fn delete_product(&self, id: Uuid, seller_id: Uuid) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        let owned = state
            .products
            .get(&id)
            .is_some_and(|p| p.seller_id == seller_id);
        if owned {
            state.products.remove(&id);
        }
        Ok(owned)
    }

    async fn list_products_by_seller(
        &self,
        seller_id: Uuid,
        listed_only: bool,
    ) -> StoreResult<Vec<Product>> {
        let state = self.state.lock().await;
        let mut products: Vec<Product> = state
            .products
            .values()
            .filter(|p| p.seller_id == seller_id && (!listed_only || p.is_listed()))
            .cloned()
            .collect();
        products.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(products)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
