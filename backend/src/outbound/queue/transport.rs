//! HTTP delivery of signed callback notifications.

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::ports::{CallbackTransport, DispatchError};

/// Delivers `signed_request` form posts over HTTPS with a short timeout.
pub struct HttpCallbackTransport {
    client: reqwest::Client,
}

impl HttpCallbackTransport {
    /// # Errors
    /// Returns [`DispatchError::Transport`] when the HTTP client cannot be
    /// constructed.
    pub fn new() -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|err| DispatchError::transport(err.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl CallbackTransport for HttpCallbackTransport {
    async fn deliver(&self, url: &str, signed_request: &str) -> Result<(), DispatchError> {
        let response = self
            .client
            .post(url)
            .form(&[("signed_request", signed_request)])
            .send()
            .await
            .map_err(|err| DispatchError::transport(err.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        // Client errors mean the receiver refused the payload; retrying the
        // same request cannot help. Everything else may be transient.
        if status.is_client_error() {
            return Err(DispatchError::rejected(format!(
                "callback endpoint returned {status}"
            )));
        }
        Err(DispatchError::transport(format!(
            "callback endpoint returned {status}"
        )))
    }
}
