/// Domain errors of the auth and messaging flows
///
/// Each variant maps to exactly one HTTP status in `techtreks-api`. Lower
/// layer failures (store, hasher) arrive as [`AuthError::Internal`] unless
/// they carry domain meaning, such as a uniqueness conflict.

use super::password::PasswordError;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Input broke a validation rule; carries the first violation
    #[error("{0}")]
    Validation(String),

    /// Login without username or password
    #[error("{0}")]
    MissingFields(String),

    /// Username or email already belongs to someone else
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    /// The code window closed; the pending record has been purged
    #[error("verification code expired")]
    Expired,

    /// The attempt budget was used up; the pending record has been purged
    #[error("too many failed attempts, please register again")]
    TooManyAttempts,

    #[error("invalid code")]
    InvalidCode { remaining_attempts: u32 },

    /// The email dispatcher failed; state changes made before the send are kept
    #[error("failed to send verification email")]
    Delivery(String),

    /// Unknown username or wrong password, deliberately indistinguishable
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The operation needs a logged-in user
    #[error("authentication required")]
    Unauthenticated,

    /// Logged in, but acting on something owned by another user
    #[error("{0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type AuthResult<T> = Result<T, AuthError>;

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(_) => {
                AuthError::Conflict("username or email already taken".to_string())
            }
            StoreError::Backend(msg) => AuthError::Internal(msg),
        }
    }
}

impl From<PasswordError> for AuthError {
    fn from(err: PasswordError) -> Self {
        AuthError::Internal(err.to_string())
    }
}
