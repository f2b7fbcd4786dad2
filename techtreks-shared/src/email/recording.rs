/// In-memory dispatcher that remembers every code it was asked to send
///
/// Can be switched into a failing mode to exercise delivery errors.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Mutex,
};

use async_trait::async_trait;

use super::{EmailDispatcher, EmailError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentCode {
    pub to: String,
    pub code: String,
}

#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    sent: Mutex<Vec<SentCode>>,
    failing: AtomicBool,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every send fails and nothing is recorded
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentCode> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Most recent code sent to `to`
    pub fn last_code_for(&self, to: &str) -> Option<String> {
        self.sent()
            .into_iter()
            .rev()
            .find(|s| s.to == to)
            .map(|s| s.code)
    }
}

#[async_trait]
impl EmailDispatcher for RecordingDispatcher {
    async fn send_verification_code(&self, to: &str, code: &str) -> Result<(), EmailError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(EmailError::Transport("dispatcher set to fail".to_string()));
        }

        let mut sent = self
            .sent
            .lock()
            .map_err(|_| EmailError::Transport("recording lock poisoned".to_string()))?;
        sent.push(SentCode {
            to: to.to_string(),
            code: code.to_string(),
        });
        Ok(())
    }
}
