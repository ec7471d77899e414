use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use propdesk_api::TokenResponse;

use crate::session::{RefreshError, TokenRefresher};

/// Refreshes the bearer token through `POST <refresh endpoint>`.
///
/// Sends the current token as `Authorization: Bearer` and accepts either
/// `{ token }` or `{ accessToken }` back. This call goes straight to the
/// network: it never passes through the session middleware.
pub struct HttpRefresher {
    client: reqwest::Client,
    url: String,
}

impl HttpRefresher {
    /// Create a refresher with its own client bounded by `timeout`.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, url))
    }

    /// Create from an existing `reqwest::Client`.
    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl TokenRefresher for HttpRefresher {
    async fn refresh(&self, current: &str) -> Result<String, RefreshError> {
        let resp = self
            .client
            .post(&self.url)
            .bearer_auth(current)
            .send()
            .await
            .map_err(refresh_error)?;

        let status = resp.status();
        if !status.is_success() {
            debug!(%status, url = %self.url, "refresh endpoint rejected token");
            return Err(RefreshError::Status(status.as_u16()));
        }

        let body: TokenResponse = resp.json().await.map_err(refresh_error)?;
        body.into_token().ok_or(RefreshError::MissingToken)
    }
}

fn refresh_error(err: reqwest::Error) -> RefreshError {
    if err.is_timeout() {
        RefreshError::Timeout
    } else {
        RefreshError::Network(err.to_string())
    }
}
