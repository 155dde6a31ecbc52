use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{info, warn};

use super::{get_json, ArticleSource, SourceError};
use crate::article::{first_present, ApiSource, NormalizeOptions, NormalizedArticle, RawFields};
use crate::config::NewsApiConfig;

/// `GET /v2/top-headlines` response.
#[derive(Debug, Deserialize)]
pub struct NewsApiResponse {
    pub status: Option<String>,
    pub message: Option<String>,
    #[serde(default)]
    pub articles: Option<Vec<NewsApiArticle>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsApiArticle {
    pub title: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub url: Option<String>,
    pub url_to_image: Option<String>,
    pub published_at: Option<String>,
    pub source: Option<NewsApiPublisher>,
}

#[derive(Debug, Default, Deserialize)]
pub struct NewsApiPublisher {
    pub name: Option<String>,
}

pub fn normalize(response: NewsApiResponse, options: &NormalizeOptions) -> Vec<NormalizedArticle> {
    response
        .articles
        .unwrap_or_default()
        .into_iter()
        .take(options.page_size)
        .filter_map(|article| {
            let raw = RawFields {
                title: article.title,
                description: first_present([article.description, article.content]),
                url: article.url,
                image_url: article.url_to_image,
                published: article.published_at,
                source_label: article.source.and_then(|s| s.name),
            };
            let title = raw.title.clone();
            let built = options.build(ApiSource::NewsApi, raw);
            if built.is_none() {
                warn!(source = "NewsAPI", title = ?title, "Skipping article with no link");
            }
            built
        })
        .collect()
}

pub struct NewsApiSource {
    client: Client,
    config: NewsApiConfig,
    api_key: Option<String>,
    options: NormalizeOptions,
}

impl NewsApiSource {
    pub fn new(
        client: Client,
        config: NewsApiConfig,
        api_key: Option<String>,
        options: NormalizeOptions,
    ) -> Self {
        Self {
            client,
            config,
            api_key,
            options,
        }
    }

    fn query(&self) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();
        if let Some(country) = &self.config.country {
            query.push(("country", country.clone()));
        }
        if let Some(category) = &self.config.category {
            query.push(("category", category.clone()));
        }
        if let Some(language) = &self.config.language {
            query.push(("language", language.clone()));
        }
        query.push(("pageSize", self.options.page_size.to_string()));
        query.push(("apiKey", self.api_key.clone().unwrap_or_default()));
        query
    }
}

#[async_trait]
impl ArticleSource for NewsApiSource {
    fn api_source(&self) -> ApiSource {
        ApiSource::NewsApi
    }

    async fn fetch(&self) -> Result<Vec<NormalizedArticle>, SourceError> {
        info!("Fetching NewsAPI top headlines");

        let request = self.client.get(&self.config.base_url).query(&self.query());
        let response: NewsApiResponse = get_json(request).await?;

        if response.status.as_deref() == Some("error") {
            return Err(SourceError::Rejected(
                response.message.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }

        Ok(normalize(response, &self.options))
    }
}
