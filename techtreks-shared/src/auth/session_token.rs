/// Session token generation and hashing
///
/// The session cookie carries an opaque random token. Only its SHA-256
/// digest is stored, so a leaked `sessions` table cannot be replayed.
///
/// # Token Format
///
/// 43 base62 characters (`[A-Za-z0-9]`), about 256 bits of entropy.
///
/// # Example
///
/// ```
/// use techtreks_shared::auth::session_token::{
///     generate_session_token, hash_session_token, validate_session_token_format,
/// };
///
/// let (token, hash) = generate_session_token();
/// assert!(validate_session_token_format(&token));
/// assert_eq!(hash, hash_session_token(&token));
/// assert_eq!(hash.len(), 64);
/// ```

use rand::Rng;
use sha2::{Digest, Sha256};

/// Length of a session token in characters
pub const SESSION_TOKEN_LENGTH: usize = 43;

const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Generates a new session token
///
/// Returns `(plaintext_token, sha256_hex)`. The plaintext goes into the
/// cookie, the digest into the store.
pub fn generate_session_token() -> (String, String) {
    let mut rng = rand::thread_rng();
    let token: String = (0..SESSION_TOKEN_LENGTH)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect();
    let hash = hash_session_token(&token);

    (token, hash)
}

/// Lower-case hex SHA-256 of a token
pub fn hash_session_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Checks length and alphabet
///
/// Tokens failing this check are treated as absent without touching the
/// store.
pub fn validate_session_token_format(token: &str) -> bool {
    token.len() == SESSION_TOKEN_LENGTH && token.bytes().all(|b| b.is_ascii_alphanumeric())
}
