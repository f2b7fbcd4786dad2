/// Direct messages between verified users
///
/// The sender of a message is always the logged-in user; there is no way to
/// send on someone else's behalf. Conversations can only be read by their
/// two participants because the caller is always one side of the query.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::auth::error::{AuthError, AuthResult};
use crate::models::{
    message::{Message, NewMessage, MAX_BODY_CHARS},
    user::{PublicUser, User},
};
use crate::store::Store;

pub struct MessageService {
    store: Arc<dyn Store>,
}

impl MessageService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Stores a message from `sender` to `recipient_id`
    pub async fn send(
        &self,
        sender: &PublicUser,
        recipient_id: Uuid,
        body: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<Message> {
        let body = body.trim();
        let chars = body.chars().count();
        if chars == 0 || chars > MAX_BODY_CHARS {
            return Err(AuthError::Validation(format!(
                "message body must be 1-{} characters",
                MAX_BODY_CHARS
            )));
        }

        if self.store.find_user_by_id(recipient_id).await?.is_none() {
            return Err(recipient_not_found());
        }

        let message = self
            .store
            .insert_message(NewMessage {
                sender_id: sender.id,
                recipient_id,
                body: body.to_string(),
                created_at: now,
            })
            .await?;

        debug!(message_id = %message.id, sender_id = %sender.id, recipient_id = %recipient_id, "Message sent");
        Ok(message)
    }

    /// Every message between `me` and `with`, oldest first
    ///
    /// `with` is either a user id or a username.
    pub async fn conversation(&self, me: &PublicUser, with: &str) -> AuthResult<Vec<Message>> {
        let other = self.resolve(with).await?;
        Ok(self.store.list_conversation(me.id, other.id).await?)
    }

    async fn resolve(&self, with: &str) -> AuthResult<User> {
        let with = with.trim();
        if with.is_empty() {
            return Err(AuthError::Validation("with is required".to_string()));
        }

        let user = match Uuid::parse_str(with) {
            Ok(id) => self.store.find_user_by_id(id).await?,
            Err(_) => self.store.find_user_by_username(with).await?,
        };
        user.ok_or_else(recipient_not_found)
    }
}

fn recipient_not_found() -> AuthError {
    AuthError::NotFound("user not found".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::Duration;

    async fn user(store: &MemoryStore, name: &str) -> PublicUser {
        store
            .insert_user(User {
                id: Uuid::new_v4(),
                username: name.to_string(),
                email: format!("{}@nyu.edu", name),
                password_hash: "hash".to_string(),
                created_at: Utc::now(),
            })
            .await
            .unwrap()
            .to_public()
    }

    #[tokio::test]
    async fn test_send_and_read_conversation() {
        let store = Arc::new(MemoryStore::new());
        let alice = user(&store, "alice").await;
        let bob = user(&store, "bob").await;
        let service = MessageService::new(store.clone());
        let now = Utc::now();

        let sent = service.send(&alice, bob.id, "  hi bob  ", now).await.unwrap();
        assert_eq!(sent.body, "hi bob");
        assert_eq!(sent.sender_id, alice.id);

        service
            .send(&bob, alice.id, "hi alice", now + Duration::seconds(1))
            .await
            .unwrap();

        let by_name = service.conversation(&alice, "bob").await.unwrap();
        let by_id = service.conversation(&bob, &alice.id.to_string()).await.unwrap();
        assert_eq!(by_name, by_id);
        assert_eq!(by_name.len(), 2);
        assert_eq!(by_name[0].body, "hi bob");
    }

    #[tokio::test]
    async fn test_body_limits() {
        let store = Arc::new(MemoryStore::new());
        let alice = user(&store, "alice").await;
        let bob = user(&store, "bob").await;
        let service = MessageService::new(store);

        let empty = service.send(&alice, bob.id, "   ", Utc::now()).await;
        assert!(matches!(empty, Err(AuthError::Validation(_))));

        let long = "x".repeat(MAX_BODY_CHARS + 1);
        let too_long = service.send(&alice, bob.id, &long, Utc::now()).await;
        assert!(matches!(too_long, Err(AuthError::Validation(_))));

        let max = "x".repeat(MAX_BODY_CHARS);
        assert!(service.send(&alice, bob.id, &max, Utc::now()).await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_recipient() {
        let store = Arc::new(MemoryStore::new());
        let alice = user(&store, "alice").await;
        let service = MessageService::new(store);

        let result = service.send(&alice, Uuid::new_v4(), "hello", Utc::now()).await;
        assert!(matches!(result, Err(AuthError::NotFound(_))));

        let result = service.conversation(&alice, "nobody").await;
        assert!(matches!(result, Err(AuthError::NotFound(_))));
    }
}
