//! HTTP implementation of [`PageFetcher`].

use std::time::Duration;

use super::{ObserverLayout, PageFetcher};
use crate::domain::RawPage;
use crate::error::ObserverError;

const USER_AGENT: &str = concat!("pool-observer/", env!("CARGO_PKG_VERSION"));

/// Downloads observer pages over HTTP and extracts them with
/// [`ObserverLayout`].
///
/// Every call builds its own `reqwest::Client`, so no connection or cookie
/// state is shared between cycles or pools.
#[derive(Debug, Clone)]
pub struct HttpPageFetcher {
    timeout: Duration,
    layout: ObserverLayout,
}

impl HttpPageFetcher {
    /// Creates a fetcher whose requests time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`ObserverError::Internal`] if the layout selectors fail to
    /// compile.
    pub fn new(timeout: Duration) -> Result<Self, ObserverError> {
        Ok(Self {
            timeout,
            layout: ObserverLayout::new()?,
        })
    }

    fn transport_error(&self, url: &str, err: &reqwest::Error) -> ObserverError {
        if err.is_timeout() {
            ObserverError::FetchTimeout {
                url: url.to_string(),
                timeout_secs: self.timeout.as_secs(),
            }
        } else {
            ObserverError::Network(format!("{url}: {err}"))
        }
    }
}

impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &str) -> Result<RawPage, ObserverError> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ObserverError::Network(format!("http client: {e}")))?;

        let response = client
            .get(url)
            .send()
            .await
            .map_err(|e| self.transport_error(url, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ObserverError::Network(format!("{url}: HTTP {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| self.transport_error(url, &e))?;
        tracing::debug!(url, bytes = body.len(), "observer page downloaded");

        Ok(self.layout.parse(&body))
    }
}
