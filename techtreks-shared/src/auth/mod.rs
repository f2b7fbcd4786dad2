/// Authentication for TechTreks
///
/// # Modules
///
/// - [`password`]: Argon2id hashing and password strength rules
/// - [`validation`]: registration input normalisation and rules
/// - [`code`]: 4-digit verification codes
/// - [`session_token`]: opaque session tokens and their digests
/// - [`context`]: per-request context and session cookie commands
/// - [`registration`]: the email-verified signup flow
/// - [`session`]: login, logout and current-user resolution
/// - [`error`]: the domain error taxonomy shared by all flows
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use chrono::Duration;
/// use techtreks_shared::auth::{
///     context::RequestContext, registration::RegistrationService,
///     validation::RegistrationPolicy,
/// };
/// use techtreks_shared::email::LogDispatcher;
/// use techtreks_shared::store::MemoryStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let service = RegistrationService::new(
///     Arc::new(MemoryStore::new()),
///     Arc::new(LogDispatcher),
///     RegistrationPolicy::default(),
///     Duration::seconds(3600),
/// );
///
/// let ctx = RequestContext::anonymous();
/// service.start(&ctx, "alice", "alice@nyu.edu", "Secret123!").await?;
/// # Ok(())
/// # }
/// ```

pub mod code;
pub mod context;
pub mod error;
pub mod password;
pub mod registration;
pub mod session;
pub mod session_token;
pub mod validation;

pub use context::{IssuedSession, RequestContext, SessionCommand};
pub use error::{AuthError, AuthResult};
