/// Brevo transactional email dispatcher
///
/// Posts to `https://api.brevo.com/v3/smtp/email` with the account key in the
/// `api-key` header. Any 2xx counts as delivered; everything else becomes
/// [`EmailError::Rejected`] with the provider's body for the logs.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use super::{verification_html, verification_text, EmailDispatcher, EmailError, VERIFICATION_SUBJECT};

pub const BREVO_SEND_URL: &str = "https://api.brevo.com/v3/smtp/email";

#[derive(Debug, Clone)]
pub struct BrevoConfig {
    pub api_key: String,
    pub sender_email: String,
    pub sender_name: Option<String>,

    /// Upper bound on one send, connect included
    pub timeout: Duration,

    /// Overridable for tests against a local server
    pub endpoint: String,
}

impl BrevoConfig {
    pub fn new(api_key: impl Into<String>, sender_email: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            sender_email: sender_email.into(),
            sender_name: None,
            timeout: Duration::from_secs(10),
            endpoint: BREVO_SEND_URL.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BrevoEmailAddress<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BrevoSendEmailBody<'a> {
    sender: BrevoEmailAddress<'a>,
    to: Vec<BrevoEmailAddress<'a>>,
    subject: &'a str,
    html_content: String,
    text_content: String,
}

pub struct BrevoDispatcher {
    client: reqwest::Client,
    config: BrevoConfig,
}

impl BrevoDispatcher {
    pub fn new(config: BrevoConfig) -> Result<Self, EmailError> {
        if config.api_key.trim().is_empty() {
            return Err(EmailError::Config("BREVO_API_KEY is required".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("techtreks/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| EmailError::Config(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn body<'a>(&'a self, to: &'a str, code: &str) -> BrevoSendEmailBody<'a> {
        BrevoSendEmailBody {
            sender: BrevoEmailAddress {
                email: &self.config.sender_email,
                name: self.config.sender_name.as_deref(),
            },
            to: vec![BrevoEmailAddress { email: to, name: None }],
            subject: VERIFICATION_SUBJECT,
            html_content: verification_html(code),
            text_content: verification_text(code),
        }
    }
}

#[async_trait]
impl EmailDispatcher for BrevoDispatcher {
    async fn send_verification_code(&self, to: &str, code: &str) -> Result<(), EmailError> {
        let response = self
            .client
            .post(&self.config.endpoint)
            .header("api-key", &self.config.api_key)
            .header("Accept", "application/json")
            .json(&self.body(to, code))
            .send()
            .await
            .map_err(|e| EmailError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            debug!(to = %to, "Verification email accepted by Brevo");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        warn!(to = %to, status = status.as_u16(), "Brevo rejected verification email");
        Err(EmailError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}
