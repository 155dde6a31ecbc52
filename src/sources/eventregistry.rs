use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{info, warn};

use super::{get_json, ArticleSource, SourceError};
use crate::article::{first_present, ApiSource, NormalizeOptions, NormalizedArticle, RawFields};
use crate::config::EventRegistryConfig;

/// `article/getArticles` response. Results sit one level down, under `articles.results`.
#[derive(Debug, Deserialize)]
pub struct EventRegistryResponse {
    pub articles: Option<EventRegistryPage>,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EventRegistryPage {
    #[serde(default)]
    pub results: Option<Vec<EventRegistryArticle>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRegistryArticle {
    pub title: Option<String>,
    pub body: Option<String>,
    pub summary: Option<String>,
    pub url: Option<String>,
    pub image: Option<String>,
    pub date_time: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub source: Option<EventRegistryPublisher>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EventRegistryPublisher {
    pub title: Option<String>,
}

impl EventRegistryArticle {
    /// `dateTime` when present, otherwise `date` joined with `time`.
    fn published(&self) -> Option<String> {
        if self.date_time.is_some() {
            return self.date_time.clone();
        }
        match (&self.date, &self.time) {
            (Some(date), Some(time)) => Some(format!("{}T{}", date, time)),
            (Some(date), None) => Some(date.clone()),
            _ => None,
        }
    }
}

pub fn normalize(response: EventRegistryResponse, options: &NormalizeOptions) -> Vec<NormalizedArticle> {
    response
        .articles
        .and_then(|page| page.results)
        .unwrap_or_default()
        .into_iter()
        .take(options.page_size)
        .filter_map(|article| {
            let published = article.published();
            let raw = RawFields {
                title: article.title,
                description: first_present([article.body, article.summary]),
                url: article.url,
                image_url: article.image,
                published,
                source_label: article.source.and_then(|s| s.title),
            };
            let title = raw.title.clone();
            let built = options.build(ApiSource::EventRegistry, raw);
            if built.is_none() {
                warn!(source = "EventRegistry", title = ?title, "Skipping article with no link");
            }
            built
        })
        .collect()
}

pub struct EventRegistrySource {
    client: Client,
    config: EventRegistryConfig,
    api_key: Option<String>,
    options: NormalizeOptions,
}

impl EventRegistrySource {
    pub fn new(
        client: Client,
        config: EventRegistryConfig,
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
        vec![
            ("apiKey", self.api_key.clone().unwrap_or_default()),
            ("lang", self.config.lang.clone()),
            ("sortBy", "date".to_string()),
            ("articlesPage", "1".to_string()),
            ("articlesCount", self.options.page_size.to_string()),
        ]
    }
}

#[async_trait]
impl ArticleSource for EventRegistrySource {
    fn api_source(&self) -> ApiSource {
        ApiSource::EventRegistry
    }

    async fn fetch(&self) -> Result<Vec<NormalizedArticle>, SourceError> {
        info!("Fetching EventRegistry articles");

        let request = self.client.get(&self.config.base_url).query(&self.query());
        let response: EventRegistryResponse = get_json(request).await?;

        if let Some(error) = response.error {
            return Err(SourceError::Rejected(error));
        }

        Ok(normalize(response, &self.options))
    }
}
