/// Session login, logout and identity resolution
///
/// Sessions live in the store keyed by the SHA-256 of the cookie token and
/// expire at an absolute time fixed at login. Logging in always rotates the
/// session, so a token planted before login is never promoted.

use std::sync::Arc;

use chrono::Duration;
use serde::Serialize;
use tracing::{debug, error, info};

use super::{
    context::{IssuedSession, RequestContext, SessionCommand},
    error::{AuthError, AuthResult},
    password::{verify_dummy, verify_password},
    session_token::generate_session_token,
    validation::normalize_email,
};
use crate::models::{session::SessionGrant, user::PublicUser};
use crate::store::Store;

/// Answer to an availability check; only the asked-about fields are set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Availability {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username_available: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_available: Option<bool>,
}

pub struct SessionAuthenticator {
    store: Arc<dyn Store>,
    session_ttl: Duration,
}

impl SessionAuthenticator {
    pub fn new(store: Arc<dyn Store>, session_ttl: Duration) -> Self {
        Self { store, session_ttl }
    }

    /// Verifies credentials and opens a fresh session
    ///
    /// Unknown usernames and wrong passwords both yield
    /// [`AuthError::InvalidCredentials`] after the same amount of hashing work.
    pub async fn login(
        &self,
        ctx: &RequestContext,
        username: &str,
        password: &str,
    ) -> AuthResult<SessionCommand> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(AuthError::MissingFields("missing credentials".to_string()));
        }

        let Some(user) = self.store.find_user_by_username(username).await? else {
            verify_dummy(password);
            debug!(username = %username, "Login for unknown username");
            return Err(AuthError::InvalidCredentials);
        };

        if !verify_password(password, &user.password_hash)? {
            debug!(user_id = %user.id, "Login with wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        let (token, token_hash) = generate_session_token();
        let grant = SessionGrant::new(token_hash, ctx.now, self.session_ttl);
        let record = self
            .store
            .start_session(user.id, grant, ctx.session_token_hash().as_deref())
            .await?;

        info!(user_id = %user.id, username = %user.username, "User logged in");

        Ok(SessionCommand::Set(IssuedSession {
            token,
            expires_at: record.expires_at,
        }))
    }

    /// Ends the caller's session
    ///
    /// Always succeeds and always clears the cookie; a store failure is only
    /// logged.
    pub async fn logout(&self, ctx: &RequestContext) -> SessionCommand {
        if let Some(token_hash) = ctx.session_token_hash() {
            match self.store.delete_session(&token_hash).await {
                Ok(true) => info!("User logged out"),
                Ok(false) => debug!("Logout for unknown session"),
                Err(e) => error!(error = %e, "Failed to delete session on logout"),
            }
        }

        SessionCommand::Clear
    }

    /// Resolves the logged-in user, if any
    ///
    /// Missing, expired and orphaned sessions all read as `None`.
    pub async fn current_user(&self, ctx: &RequestContext) -> AuthResult<Option<PublicUser>> {
        let Some(token_hash) = ctx.session_token_hash() else {
            return Ok(None);
        };

        let Some(session) = self.store.find_session(&token_hash).await? else {
            return Ok(None);
        };
        if session.is_expired(ctx.now) {
            return Ok(None);
        }

        let user = self.store.find_user_by_id(session.user_id).await?;
        Ok(user.map(|u| u.to_public()))
    }

    /// Like [`Self::current_user`] but failing with
    /// [`AuthError::Unauthenticated`] when nobody is logged in
    pub async fn require_user(&self, ctx: &RequestContext) -> AuthResult<PublicUser> {
        self.current_user(ctx)
            .await?
            .ok_or(AuthError::Unauthenticated)
    }

    /// Reports whether a username and/or email are still free
    ///
    /// Blank inputs are treated as not asked.
    pub async fn check_availability(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> AuthResult<Availability> {
        let mut availability = Availability::default();

        if let Some(username) = username.map(str::trim).filter(|u| !u.is_empty()) {
            let taken = self.store.find_user_by_username(username).await?.is_some();
            availability.username_available = Some(!taken);
        }

        if let Some(email) = email.map(normalize_email).filter(|e| !e.is_empty()) {
            let taken = self.store.find_user_by_email(&email).await?.is_some();
            availability.email_available = Some(!taken);
        }

        Ok(availability)
    }
}
