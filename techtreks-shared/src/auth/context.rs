/// Per-request inputs and session outcomes
///
/// The HTTP layer builds a [`RequestContext`] from the incoming cookie and
/// the clock, and turns the [`SessionCommand`] an operation returns back into
/// a `Set-Cookie` header. The services never see HTTP types.

use chrono::{DateTime, Utc};

use super::session_token::{hash_session_token, validate_session_token_format};

/// What an operation knows about the request that triggered it
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Raw session token from the cookie, if one was sent
    pub session_token: Option<String>,

    /// Time the request is evaluated at
    pub now: DateTime<Utc>,
}

impl RequestContext {
    pub fn new(session_token: Option<String>, now: DateTime<Utc>) -> Self {
        Self { session_token, now }
    }

    /// Context without a session, evaluated at the current time
    pub fn anonymous() -> Self {
        Self::new(None, Utc::now())
    }

    /// Store key of the caller's session
    ///
    /// `None` when no token was sent or it is malformed.
    pub fn session_token_hash(&self) -> Option<String> {
        self.session_token
            .as_deref()
            .filter(|token| validate_session_token_format(token))
            .map(hash_session_token)
    }
}

/// A freshly opened session, to be handed to the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedSession {
    /// Plaintext token for the cookie
    pub token: String,

    pub expires_at: DateTime<Utc>,
}

impl IssuedSession {
    /// Whole seconds left until expiry, never negative
    pub fn max_age_secs(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds().max(0)
    }
}

/// How the client's session cookie must change after an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    Keep,
    Set(IssuedSession),
    Clear,
}
