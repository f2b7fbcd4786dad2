/// Registration input normalisation and validation
///
/// Input is normalised first (username trimmed, email trimmed and
/// lower-cased, password untouched) and then checked rule by rule. Only the
/// first violated rule is reported, in this order:
///
/// 1. username, email and password all present
/// 2. username is 3-30 characters
/// 3. username only uses `[A-Za-z0-9_.-]`
/// 4. email contains `@` and is at most 254 characters
/// 5. email belongs to one of the allowed institutional domains
/// 6. password strength (see [`validate_password_strength`])

use super::password::validate_password_strength;

pub const USERNAME_MIN_CHARS: usize = 3;
pub const USERNAME_MAX_CHARS: usize = 30;
pub const EMAIL_MAX_CHARS: usize = 254;

/// Domain accepted when none is configured explicitly
pub const DEFAULT_EMAIL_DOMAIN: &str = "nyu.edu";

/// Registration fields after trimming and case-folding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationInput {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl RegistrationInput {
    pub fn normalize(username: &str, email: &str, password: &str) -> Self {
        Self {
            username: username.trim().to_string(),
            email: normalize_email(email),
            password: password.to_string(),
        }
    }
}

/// Trims and lower-cases an email address
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Which addresses may register
#[derive(Debug, Clone)]
pub struct RegistrationPolicy {
    /// Lower-case domains without the `@`; empty accepts any domain
    pub allowed_email_domains: Vec<String>,
}

impl Default for RegistrationPolicy {
    fn default() -> Self {
        Self {
            allowed_email_domains: vec![DEFAULT_EMAIL_DOMAIN.to_string()],
        }
    }
}

impl RegistrationPolicy {
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed_email_domains = domains
            .into_iter()
            .map(|d| d.as_ref().trim().trim_start_matches('@').to_lowercase())
            .filter(|d| !d.is_empty())
            .collect();

        Self {
            allowed_email_domains,
        }
    }

    /// Policy accepting every domain
    pub fn any_domain() -> Self {
        Self {
            allowed_email_domains: Vec::new(),
        }
    }

    /// Whether a normalised email belongs to an allowed domain
    pub fn is_allowed_email(&self, email: &str) -> bool {
        self.allowed_email_domains.is_empty()
            || self
                .allowed_email_domains
                .iter()
                .any(|domain| email.ends_with(&format!("@{}", domain)))
    }

    fn domain_message(&self) -> String {
        if self.allowed_email_domains.len() == 1
            && self.allowed_email_domains[0] == DEFAULT_EMAIL_DOMAIN
        {
            return "only NYU email addresses are allowed (@nyu.edu)".to_string();
        }

        let domains: Vec<String> = self
            .allowed_email_domains
            .iter()
            .map(|d| format!("@{}", d))
            .collect();
        format!(
            "only institutional email addresses are allowed ({})",
            domains.join(", ")
        )
    }

    /// Returns the first violated rule, if any
    pub fn validate(&self, input: &RegistrationInput) -> Result<(), String> {
        if input.username.is_empty() || input.email.is_empty() || input.password.is_empty() {
            return Err("username, email and password are required".to_string());
        }

        let username_chars = input.username.chars().count();
        if !(USERNAME_MIN_CHARS..=USERNAME_MAX_CHARS).contains(&username_chars) {
            return Err("username must be 3-30 characters".to_string());
        }

        if !input
            .username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        {
            return Err("username contains invalid characters".to_string());
        }

        if !input.email.contains('@') || input.email.chars().count() > EMAIL_MAX_CHARS {
            return Err("invalid email".to_string());
        }

        if !self.is_allowed_email(&input.email) {
            return Err(self.domain_message());
        }

        validate_password_strength(&input.password)
    }
}
