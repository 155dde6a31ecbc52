use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Deserializer};
use tracing::{info, warn};

use super::{get_json, ArticleSource, SourceError};
use crate::article::{ApiSource, NormalizeOptions, NormalizedArticle, RawFields};
use crate::config::NyTimesConfig;

/// Top Stories `{section}.json` response. The API always returns the whole section.
#[derive(Debug, Deserialize)]
pub struct NyTimesResponse {
    pub status: Option<String>,
    #[serde(default)]
    pub results: Option<Vec<NyTimesStory>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct NyTimesStory {
    pub title: Option<String>,
    #[serde(rename = "abstract")]
    pub summary: Option<String>,
    pub url: Option<String>,
    #[serde(default, deserialize_with = "media_list")]
    pub multimedia: Option<Vec<NyTimesMedia>>,
    pub published_date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct NyTimesMedia {
    pub url: Option<String>,
}

/// `multimedia` is an array, `null`, or occasionally `""` when a story has no media.
fn media_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<NyTimesMedia>>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Media {
        List(Vec<NyTimesMedia>),
        Other(serde::de::IgnoredAny),
    }

    Ok(match Option::<Media>::deserialize(deserializer)? {
        Some(Media::List(items)) => Some(items),
        Some(Media::Other(_)) | None => None,
    })
}

pub fn normalize(response: NyTimesResponse, options: &NormalizeOptions) -> Vec<NormalizedArticle> {
    response
        .results
        .unwrap_or_default()
        .into_iter()
        .take(options.page_size)
        .filter_map(|story| {
            let image_url = story
                .multimedia
                .and_then(|media| media.into_iter().next())
                .and_then(|media| media.url);
            let raw = RawFields {
                title: story.title,
                description: story.summary,
                url: story.url,
                image_url,
                published: story.published_date,
                // Top Stories carry no publisher field; everything is the Times
                source_label: None,
            };
            let title = raw.title.clone();
            let built = options.build(ApiSource::NyTimes, raw);
            if built.is_none() {
                warn!(source = "NYTimes", title = ?title, "Skipping story with no link");
            }
            built
        })
        .collect()
}

pub struct NyTimesSource {
    client: Client,
    config: NyTimesConfig,
    api_key: Option<String>,
    options: NormalizeOptions,
}

impl NyTimesSource {
    pub fn new(
        client: Client,
        config: NyTimesConfig,
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

    fn endpoint(&self) -> String {
        format!(
            "{}/{}.json",
            self.config.base_url.trim_end_matches('/'),
            self.config.section
        )
    }
}

#[async_trait]
impl ArticleSource for NyTimesSource {
    fn api_source(&self) -> ApiSource {
        ApiSource::NyTimes
    }

    async fn fetch(&self) -> Result<Vec<NormalizedArticle>, SourceError> {
        info!(section = %self.config.section, "Fetching NYTimes top stories");

        let request = self
            .client
            .get(self.endpoint())
            .query(&[("api-key", self.api_key.clone().unwrap_or_default())]);
        let response: NyTimesResponse = get_json(request).await?;

        Ok(normalize(response, &self.options))
    }
}
