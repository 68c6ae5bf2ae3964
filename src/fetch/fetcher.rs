use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use reqwest::header::ACCEPT;
use tracing::debug;

use crate::utils::async_task::task_with_timeout_and_exponential_backoff;
use crate::ConfigKey;
use crate::Error;
use crate::FetchConfig;
use crate::FetchError;
use crate::Payload;
use crate::Result;

/// Retrieves the features document for one key.
///
/// Implementations own timeouts and retries; the coordinator calling them
/// does neither.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait FeatureFetcher: Send + Sync + 'static {
    async fn fetch(
        &self,
        key: &ConfigKey,
    ) -> Result<Payload>;
}

/// Fetches `{api_host}{features_path}/{client_key}` over HTTP.
///
/// Transient failures (transport errors, timeouts, 408/429/5xx) are retried
/// with capped exponential backoff per `FetchConfig::retry`; any other status
/// or an undecodable body fails immediately.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    config: FetchConfig,
}

impl HttpFetcher {
    pub fn new(config: FetchConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    pub fn with_client(
        client: reqwest::Client,
        config: FetchConfig,
    ) -> Self {
        Self { client, config }
    }

    async fn fetch_once(
        &self,
        url: &str,
    ) -> Result<Payload> {
        debug!(url, "fetching features");
        let response = self
            .client
            .get(url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|source| FetchError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            }
            .into());
        }

        let body = response.bytes().await.map_err(|source| FetchError::Request {
            url: url.to_string(),
            source,
        })?;
        Ok(Payload::from_slice(&body)?)
    }
}

#[async_trait]
impl FeatureFetcher for HttpFetcher {
    async fn fetch(
        &self,
        key: &ConfigKey,
    ) -> Result<Payload> {
        let url = key.endpoint(&self.config.features_path);
        task_with_timeout_and_exponential_backoff(|| self.fetch_once(&url), self.config.retry, Error::is_retryable).await
    }
}
