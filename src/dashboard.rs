//! Dashboard data: loading the aggregated list through `/news` and deriving
//! the filtered view shown to the user.

use futures::future::try_join_all;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::{debug, error};

use crate::article::{ApiSource, NormalizedArticle};

/// Source selector. `All` is the "no filter" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceFilter {
    #[default]
    All,
    Only(ApiSource),
}

impl SourceFilter {
    /// Lenient parse of a `?source=` value; anything unrecognised means `All`.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("") => SourceFilter::All,
            Some(value) if value.eq_ignore_ascii_case("all") => SourceFilter::All,
            Some(value) => match value.parse() {
                Ok(source) => SourceFilter::Only(source),
                Err(e) => {
                    debug!(error = %e, "Ignoring unknown source filter");
                    SourceFilter::All
                }
            },
        }
    }

    pub fn matches(&self, article: &NormalizedArticle) -> bool {
        match self {
            SourceFilter::All => true,
            SourceFilter::Only(source) => article.api_source == *source,
        }
    }

    /// Value to put back into a query string.
    pub fn query_value(&self) -> &'static str {
        match self {
            SourceFilter::All => "all",
            SourceFilter::Only(source) => source.query_id(),
        }
    }
}

/// Records matching both the source filter and the search term, in list order.
///
/// The search is a case-insensitive substring match on title or description;
/// a blank term matches everything.
pub fn view<'a>(
    articles: &'a [NormalizedArticle],
    filter: &SourceFilter,
    search: &str,
) -> Vec<&'a NormalizedArticle> {
    let needle = search.trim().to_lowercase();

    articles
        .iter()
        .filter(|article| filter.matches(article))
        .filter(|article| {
            needle.is_empty()
                || article.title.to_lowercase().contains(&needle)
                || article.description.to_lowercase().contains(&needle)
        })
        .collect()
}

/// Distinct adapters present in `articles`, first-seen order.
pub fn available_sources(articles: &[NormalizedArticle]) -> Vec<ApiSource> {
    let mut seen = Vec::new();
    for article in articles {
        if !seen.contains(&article.api_source) {
            seen.push(article.api_source);
        }
    }
    seen
}

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("request for {api_source} news failed: {error}")]
    Request {
        api_source: ApiSource,
        error: reqwest::Error,
    },
    #[error("{api_source} news returned status {status}")]
    Status { api_source: ApiSource, status: StatusCode },
    #[error("{api_source} news returned a malformed body: {error}")]
    Decode {
        api_source: ApiSource,
        error: serde_json::Error,
    },
}

/// Client for the `/news` endpoint, used by the dashboard.
#[derive(Clone)]
pub struct NewsClient {
    client: Client,
    endpoint: String,
}

impl NewsClient {
    pub fn new(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    /// One call per adapter, concurrently. Any failure fails the whole load.
    ///
    /// The result is the per-source lists concatenated in declaration order.
    pub async fn load_all(&self) -> Result<Vec<NormalizedArticle>, DashboardError> {
        let batches = try_join_all(ApiSource::ALL.into_iter().map(|source| self.load(source)))
            .await
            .map_err(|e| {
                error!(error = %e, "Dashboard load failed");
                e
            })?;

        Ok(batches.into_iter().flatten().collect())
    }

    async fn load(&self, api_source: ApiSource) -> Result<Vec<NormalizedArticle>, DashboardError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("source", api_source.query_id())])
            .send()
            .await
            .map_err(|error| DashboardError::Request { api_source, error })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DashboardError::Status { api_source, status });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|error| DashboardError::Request { api_source, error })?;
        let mut articles: Vec<NormalizedArticle> = serde_json::from_slice(&bytes)
            .map_err(|error| DashboardError::Decode { api_source, error })?;

        for article in &mut articles {
            article.api_source = api_source;
        }

        Ok(articles)
    }
}
