//! Delivery ports: outgoing mail, signed callbacks, and message templates.

use async_trait::async_trait;

use crate::domain::communication::MailMessage;

/// Failure surfaced by a delivery port.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The transport could not be reached; retrying may succeed.
    #[error("delivery transport failed: {0}")]
    Transport(String),
    /// The receiver refused the payload; retrying will not help.
    #[error("delivery rejected: {0}")]
    Rejected(String),
}

impl DispatchError {
    pub fn transport(what: impl Into<String>) -> Self {
        Self::Transport(what.into())
    }

    pub fn rejected(what: impl Into<String>) -> Self {
        Self::Rejected(what.into())
    }

    /// True when the worker should retry with backoff.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Sends rendered reminder messages.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &MailMessage) -> Result<(), DispatchError>;
}

/// Delivers a signed callback notification to one intervention endpoint as
/// an `application/x-www-form-urlencoded` POST with a `signed_request` field.
#[async_trait]
pub trait CallbackTransport: Send + Sync {
    async fn deliver(&self, url: &str, signed_request: &str) -> Result<(), DispatchError>;
}

/// Renders a named template into a mail message for one locale.
pub trait MessageTemplates: Send + Sync {
    fn render(
        &self,
        template: &str,
        locale: &str,
        vars: &serde_json::Value,
    ) -> Result<MailMessage, DispatchError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn only_transport_failures_retry() {
        assert!(DispatchError::transport("connection refused").is_retryable());
        assert!(!DispatchError::rejected("410 gone").is_retryable());
    }
}
