//! Upstream news API adapters.
//!
//! Each adapter owns one provider's request shape and response schema and maps
//! the response into [`NormalizedArticle`]s. Adapters report failures as
//! [`SourceError`]; the aggregator decides what to do with them.

pub mod eventregistry;
pub mod newsapi;
pub mod nytimes;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::article::{ApiSource, NormalizeOptions, NormalizedArticle};
use crate::config::{Config, Secrets};

pub use eventregistry::EventRegistrySource;
pub use newsapi::NewsApiSource;
pub use nytimes::NyTimesSource;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request failed: {0}")]
    Request(reqwest::Error),
    #[error("upstream returned status {0}")]
    Status(StatusCode),
    #[error("malformed response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("upstream rejected the request: {0}")]
    Rejected(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        // The request URL carries the API key as a query parameter
        SourceError::Request(err.without_url())
    }
}

/// One upstream news provider.
#[async_trait]
pub trait ArticleSource: Send + Sync {
    fn api_source(&self) -> ApiSource;

    /// Issue one request and map the response. No retries.
    async fn fetch(&self) -> Result<Vec<NormalizedArticle>, SourceError>;
}

/// Shared HTTP client for upstream calls.
pub fn build_client(timeout_secs: u64) -> anyhow::Result<Client> {
    let client = Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent("NewsDashboard/1.0 (News Aggregator)")
        .build()?;
    Ok(client)
}

/// The three adapters in declaration order.
pub fn default_sources(config: &Config, secrets: &Secrets, client: Client) -> Vec<Arc<dyn ArticleSource>> {
    let options = NormalizeOptions {
        page_size: config.page_size,
        default_image: config.default_image.clone(),
    };

    vec![
        Arc::new(NewsApiSource::new(
            client.clone(),
            config.sources.newsapi.clone(),
            secrets.news_api_key.clone(),
            options.clone(),
        )),
        Arc::new(EventRegistrySource::new(
            client.clone(),
            config.sources.eventregistry.clone(),
            secrets.event_registry_api_key.clone(),
            options.clone(),
        )),
        Arc::new(NyTimesSource::new(
            client,
            config.sources.nytimes.clone(),
            secrets.nytimes_api_key.clone(),
            options,
        )),
    ]
}

/// Send `request`, require a 2xx status and decode the body as `T`.
pub(crate) async fn get_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, SourceError> {
    let response = request.send().await?;

    let status = response.status();
    if !status.is_success() {
        return Err(SourceError::Status(status));
    }

    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}
