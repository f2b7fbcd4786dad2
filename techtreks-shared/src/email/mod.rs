/// Verification email delivery
///
/// The registration flow only needs one thing from email: get a code to an
/// address, or say that it could not. [`EmailDispatcher`] is that seam.
///
/// # Implementations
///
/// - [`brevo::BrevoDispatcher`]: Brevo transactional email API over HTTPS
/// - [`log::LogDispatcher`]: logs instead of sending, for local development
/// - [`recording::RecordingDispatcher`]: keeps sent codes in memory, for tests

pub mod brevo;
pub mod log;
pub mod recording;

use async_trait::async_trait;

pub use brevo::{BrevoConfig, BrevoDispatcher};
pub use log::LogDispatcher;
pub use recording::RecordingDispatcher;

pub const VERIFICATION_SUBJECT: &str = "TechTreks - Verify Your Email";

#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    /// The dispatcher could not be constructed
    #[error("Email configuration error: {0}")]
    Config(String),

    /// The provider could not be reached or timed out
    #[error("Email transport error: {0}")]
    Transport(String),

    /// The provider answered with a non-success status
    #[error("Email provider rejected message (status={status}): {body}")]
    Rejected { status: u16, body: String },
}

#[async_trait]
pub trait EmailDispatcher: Send + Sync {
    /// Delivers a verification code to `to`
    async fn send_verification_code(&self, to: &str, code: &str) -> Result<(), EmailError>;
}

/// Plain-text body of the verification email
pub fn verification_text(code: &str) -> String {
    format!(
        "Welcome to TechTreks!\n\n\
         Your verification code is: {}\n\n\
         This code expires in 10 minutes. If you did not sign up, ignore this email.\n",
        code
    )
}

/// HTML body of the verification email
pub fn verification_html(code: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<body style="font-family: Arial, sans-serif; background: #f4f4f7; padding: 24px;">
  <div style="max-width: 480px; margin: 0 auto; background: #ffffff; border-radius: 8px; padding: 32px;">
    <h1 style="color: #6b21a8; margin-top: 0;">Welcome to TechTreks!</h1>
    <p>Use this code to verify your email address:</p>
    <p style="font-size: 32px; font-weight: bold; letter-spacing: 8px; color: #6b21a8;">{}</p>
    <p>This code expires in 10 minutes.</p>
    <p style="color: #6b7280; font-size: 12px;">If you did not sign up for TechTreks, you can ignore this email.</p>
  </div>
</body>
</html>"#,
        code
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bodies_carry_code_and_expiry() {
        let text = verification_text("4821");
        assert!(text.contains("4821"));
        assert!(text.contains("10 minutes"));

        let html = verification_html("4821");
        assert!(html.contains(">4821<"));
        assert!(html.contains("10 minutes"));
    }
}
