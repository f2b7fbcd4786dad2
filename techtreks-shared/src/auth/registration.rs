/// Email-verified registration
///
/// Signing up is two requests. [`RegistrationService::start`] validates the
/// details, stages them as a pending verification and emails a 4-digit code.
/// [`RegistrationService::confirm`] checks the code and, if it matches,
/// turns the pending record into a user and logs them in.
///
/// ```text
/// NONE ──start──> PENDING ──confirm(ok)──> VERIFIED (user + session)
///                    │
///                    ├──confirm after expiry──────> EXPIRED (purged)
///                    ├──confirm with attempts >= 5──> FAILED (purged)
///                    └──resend──> PENDING (new code, attempts reset)
/// ```

use std::sync::Arc;

use chrono::Duration;
use tracing::{info, warn};

use super::{
    code::generate_verification_code,
    context::{IssuedSession, RequestContext, SessionCommand},
    error::{AuthError, AuthResult},
    password::hash_password,
    session_token::generate_session_token,
    validation::{normalize_email, RegistrationInput, RegistrationPolicy},
};
use crate::email::EmailDispatcher;
use crate::models::{
    pending_verification::{code_expiry, remaining_after, NewPendingVerification},
    session::SessionGrant,
    user::PublicUser,
};
use crate::store::{FailedAttempt, Promotion, Store, StoreError};

/// Result of a successful [`RegistrationService::start`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationStarted {
    /// Normalised address the code was sent to
    pub email: String,
}

/// Result of a successful [`RegistrationService::confirm`]
#[derive(Debug, Clone)]
pub struct RegistrationConfirmed {
    pub user: PublicUser,
    pub session: SessionCommand,
}

pub struct RegistrationService {
    store: Arc<dyn Store>,
    mailer: Arc<dyn EmailDispatcher>,
    policy: RegistrationPolicy,
    session_ttl: Duration,
}

impl RegistrationService {
    pub fn new(
        store: Arc<dyn Store>,
        mailer: Arc<dyn EmailDispatcher>,
        policy: RegistrationPolicy,
        session_ttl: Duration,
    ) -> Self {
        Self {
            store,
            mailer,
            policy,
            session_ttl,
        }
    }

    /// Stages a registration and emails its code
    ///
    /// Any earlier pending registration for the same email or username is
    /// replaced. If the email cannot be sent the pending record is kept and
    /// [`AuthError::Delivery`] is returned; the user can ask for a resend.
    pub async fn start(
        &self,
        ctx: &RequestContext,
        username: &str,
        email: &str,
        password: &str,
    ) -> AuthResult<RegistrationStarted> {
        let input = RegistrationInput::normalize(username, email, password);
        self.policy.validate(&input).map_err(AuthError::Validation)?;

        if self.store.find_user_by_username(&input.username).await?.is_some() {
            return Err(AuthError::Conflict("username already taken".to_string()));
        }
        if self.store.find_user_by_email(&input.email).await?.is_some() {
            return Err(AuthError::Conflict("email already registered".to_string()));
        }

        let password_hash = hash_password(&input.password)?;
        let code = generate_verification_code();

        let pending = self
            .store
            .replace_pending(NewPendingVerification::issued_at(
                input.email,
                input.username,
                password_hash,
                code.clone(),
                ctx.now,
            ))
            .await?;

        info!(
            username = %pending.username,
            email = %pending.email,
            "Registration initiated"
        );

        self.dispatch(&pending.email, &code).await?;

        Ok(RegistrationStarted {
            email: pending.email,
        })
    }

    /// Checks a code and, on a match, creates the user and opens a session
    ///
    /// A pending record that is expired, or whose attempts are already used
    /// up, is purged whatever code is submitted.
    pub async fn confirm(
        &self,
        ctx: &RequestContext,
        email: &str,
        code: &str,
    ) -> AuthResult<RegistrationConfirmed> {
        let email = normalize_email(email);
        let code = code.trim();
        if email.is_empty() || code.is_empty() {
            return Err(AuthError::Validation("email and code are required".to_string()));
        }

        let pending = self.store.find_pending(&email).await?.ok_or_else(no_pending)?;

        if pending.is_expired(ctx.now) {
            self.store.delete_pending(&email).await?;
            info!(email = %email, "Verification code expired");
            return Err(AuthError::Expired);
        }

        if pending.attempts_exhausted() {
            return Err(self.lock_out(&email).await);
        }

        if !pending.matches_code(code) {
            return match self.store.record_failed_attempt(&email).await? {
                FailedAttempt::Recorded(attempts) => {
                    warn!(email = %email, attempts, "Invalid verification code");
                    Err(AuthError::InvalidCode {
                        remaining_attempts: remaining_after(attempts),
                    })
                }
                FailedAttempt::Exhausted => Err(self.lock_out(&email).await),
                FailedAttempt::Missing => Err(no_pending()),
            };
        }

        let (token, token_hash) = generate_session_token();
        let grant = SessionGrant::new(token_hash, ctx.now, self.session_ttl);
        let expires_at = grant.expires_at;

        let promoted = self
            .store
            .promote_pending(Promotion {
                pending,
                confirmed_at: ctx.now,
                session: grant,
                replaces_session: ctx.session_token_hash(),
            })
            .await;
        let user = match promoted {
            Ok(user) => user,
            Err(err @ StoreError::Conflict(_)) => {
                return Err(self.explain_rejected_promotion(ctx, &email, err).await)
            }
            Err(err) => return Err(err.into()),
        };

        info!(user_id = %user.id, username = %user.username, "User created");

        Ok(RegistrationConfirmed {
            user: user.to_public(),
            session: SessionCommand::Set(IssuedSession { token, expires_at }),
        })
    }

    /// Issues a new code for a pending registration
    ///
    /// The new code, the fresh 10-minute window and the attempt reset are
    /// committed before sending, so they hold even when delivery fails.
    pub async fn resend(&self, ctx: &RequestContext, email: &str) -> AuthResult<()> {
        let email = normalize_email(email);
        if email.is_empty() {
            return Err(AuthError::Validation("email is required".to_string()));
        }

        let code = generate_verification_code();
        let pending = self
            .store
            .reissue_pending(&email, &code, code_expiry(ctx.now))
            .await?
            .ok_or_else(no_pending)?;

        info!(email = %pending.email, "Verification code reissued");

        self.dispatch(&pending.email, &code).await
    }

    /// Purges a record whose attempt budget is used up
    async fn lock_out(&self, email: &str) -> AuthError {
        if let Err(err) = self.store.delete_pending(email).await {
            return err.into();
        }
        warn!(email = %email, "Too many failed verification attempts");
        AuthError::TooManyAttempts
    }

    /// Maps a promotion the store refused to the reason it was refused
    ///
    /// Wrong guesses or the clock may have closed the code between the read
    /// and the write; those surface as the matching error and purge the
    /// record. Anything else stays a conflict.
    async fn explain_rejected_promotion(
        &self,
        ctx: &RequestContext,
        email: &str,
        conflict: StoreError,
    ) -> AuthError {
        match self.store.find_pending(email).await {
            Ok(Some(p)) if p.attempts_exhausted() => self.lock_out(email).await,
            Ok(Some(p)) if p.is_expired(ctx.now) => match self.store.delete_pending(email).await {
                Ok(_) => AuthError::Expired,
                Err(err) => err.into(),
            },
            Ok(_) => conflict.into(),
            Err(err) => err.into(),
        }
    }

    async fn dispatch(&self, email: &str, code: &str) -> AuthResult<()> {
        self.mailer
            .send_verification_code(email, code)
            .await
            .map_err(|e| {
                warn!(email = %email, error = %e, "Failed to send verification email");
                AuthError::Delivery(e.to_string())
            })
    }
}

fn no_pending() -> AuthError {
    AuthError::NotFound("no pending verification for this email".to_string())
}
