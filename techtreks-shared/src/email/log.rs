/// Local development dispatcher
///
/// Never sends anything. The recipient is logged at info; the code itself
/// only at debug, so it stays out of production logs.

use async_trait::async_trait;
use tracing::{debug, info};

use super::{EmailDispatcher, EmailError};

#[derive(Debug, Clone, Default)]
pub struct LogDispatcher;

#[async_trait]
impl EmailDispatcher for LogDispatcher {
    async fn send_verification_code(&self, to: &str, code: &str) -> Result<(), EmailError> {
        info!(to = %to, "Verification email not sent (no email provider configured)");
        debug!(to = %to, code = %code, "Verification code");
        Ok(())
    }
}
