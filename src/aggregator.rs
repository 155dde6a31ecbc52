use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tracing::{error, info};

use crate::article::{ApiSource, NormalizedArticle};
use crate::sources::ArticleSource;

/// Fans out to every configured adapter and merges the results by recency.
pub struct Aggregator {
    sources: Vec<Arc<dyn ArticleSource>>,
}

impl Aggregator {
    pub fn new(sources: Vec<Arc<dyn ArticleSource>>) -> Self {
        Self { sources }
    }

    pub fn api_sources(&self) -> Vec<ApiSource> {
        self.sources.iter().map(|s| s.api_source()).collect()
    }

    /// Every adapter, merged and sorted newest first. Never fails; a failing
    /// adapter contributes nothing.
    pub async fn aggregate(&self) -> Vec<NormalizedArticle> {
        self.collect(self.sources.iter()).await
    }

    /// Same pipeline restricted to the adapter(s) tagged `api_source`.
    pub async fn aggregate_only(&self, api_source: ApiSource) -> Vec<NormalizedArticle> {
        self.collect(self.sources.iter().filter(|s| s.api_source() == api_source))
            .await
    }

    async fn collect<'a, I>(&self, sources: I) -> Vec<NormalizedArticle>
    where
        I: Iterator<Item = &'a Arc<dyn ArticleSource>>,
    {
        let started = Instant::now();

        let futures = sources.map(|source| async move {
            let api_source = source.api_source();
            match source.fetch().await {
                Ok(mut articles) => {
                    for article in &mut articles {
                        article.api_source = api_source;
                    }
                    info!(source = %api_source, count = articles.len(), "Source fetched");
                    articles
                }
                Err(e) => {
                    error!(source = %api_source, error = %e, "Source failed, contributing no articles");
                    Vec::new()
                }
            }
        });

        // Results come back in declaration order regardless of completion order
        let batches = join_all(futures).await;
        let mut articles: Vec<NormalizedArticle> = batches.into_iter().flatten().collect();
        sort_by_recency(&mut articles);

        info!(
            count = articles.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Aggregation complete"
        );

        articles
    }
}

/// Newest first. Records without a timestamp sort last; ties keep their order.
pub fn sort_by_recency(articles: &mut [NormalizedArticle]) {
    // `None < Some(_)`, so comparing b to a puts missing dates at the end
    articles.sort_by(|a, b| b.published_at.cmp(&a.published_at));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::article::parse_timestamp;
    use crate::sources::SourceError;
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use std::time::Duration;

    struct StaticSource {
        api_source: ApiSource,
        articles: Vec<NormalizedArticle>,
        delay: Duration,
    }

    #[async_trait]
    impl ArticleSource for StaticSource {
        fn api_source(&self) -> ApiSource {
            self.api_source
        }

        async fn fetch(&self) -> Result<Vec<NormalizedArticle>, SourceError> {
            tokio::time::sleep(self.delay).await;
            Ok(self.articles.clone())
        }
    }

    struct FailingSource(ApiSource);

    #[async_trait]
    impl ArticleSource for FailingSource {
        fn api_source(&self) -> ApiSource {
            self.0
        }

        async fn fetch(&self) -> Result<Vec<NormalizedArticle>, SourceError> {
            Err(SourceError::Status(StatusCode::INTERNAL_SERVER_ERROR))
        }
    }

    fn article(title: &str, published: &str, api_source: ApiSource) -> NormalizedArticle {
        NormalizedArticle {
            title: title.to_string(),
            description: String::new(),
            url: format!("https://example.com/{}", title),
            image_url: "/static/default-news.svg".to_string(),
            published_at: parse_timestamp(published),
            source_label: api_source.fallback_label().to_string(),
            api_source,
        }
    }

    fn fixed(api_source: ApiSource, articles: Vec<NormalizedArticle>) -> Arc<dyn ArticleSource> {
        Arc::new(StaticSource {
            api_source,
            articles,
            delay: Duration::ZERO,
        })
    }

    fn titles(articles: &[NormalizedArticle]) -> Vec<&str> {
        articles.iter().map(|a| a.title.as_str()).collect()
    }

    mod aggregate_tests {
        use super::*;

        #[tokio::test]
        async fn test_one_source_failing_keeps_the_rest() {
            let aggregator = Aggregator::new(vec![
                fixed(
                    ApiSource::NewsApi,
                    vec![article("X", "2024-01-02T00:00:00Z", ApiSource::NewsApi)],
                ),
                fixed(
                    ApiSource::EventRegistry,
                    vec![article("Y", "2024-01-03T00:00:00Z", ApiSource::EventRegistry)],
                ),
                Arc::new(FailingSource(ApiSource::NyTimes)),
            ]);

            let articles = aggregator.aggregate().await;
            assert_eq!(titles(&articles), vec!["Y", "X"]);
        }

        #[tokio::test]
        async fn test_all_sources_failing_is_empty_not_error() {
            let aggregator = Aggregator::new(vec![
                Arc::new(FailingSource(ApiSource::NewsApi)),
                Arc::new(FailingSource(ApiSource::EventRegistry)),
                Arc::new(FailingSource(ApiSource::NyTimes)),
            ]);

            assert!(aggregator.aggregate().await.is_empty());
        }

        #[tokio::test]
        async fn test_slow_source_does_not_reorder_ties() {
            // The first source finishes last; tie order still follows declaration order
            let aggregator = Aggregator::new(vec![
                Arc::new(StaticSource {
                    api_source: ApiSource::NewsApi,
                    articles: vec![article("first", "2024-01-02T00:00:00Z", ApiSource::NewsApi)],
                    delay: Duration::from_millis(50),
                }),
                fixed(
                    ApiSource::EventRegistry,
                    vec![article("second", "2024-01-02T00:00:00Z", ApiSource::EventRegistry)],
                ),
            ]);

            let articles = aggregator.aggregate().await;
            assert_eq!(titles(&articles), vec!["first", "second"]);
        }

        #[tokio::test]
        async fn test_records_are_tagged_with_their_adapter() {
            // Adapter hands back a record carrying the wrong tag
            let aggregator = Aggregator::new(vec![fixed(
                ApiSource::NyTimes,
                vec![article("mislabelled", "2024-01-02T00:00:00Z", ApiSource::NewsApi)],
            )]);

            let articles = aggregator.aggregate().await;
            assert_eq!(articles[0].api_source, ApiSource::NyTimes);
        }

        #[tokio::test]
        async fn test_aggregate_only_restricts_sources() {
            let aggregator = Aggregator::new(vec![
                fixed(
                    ApiSource::NewsApi,
                    vec![article("news", "2024-01-02T00:00:00Z", ApiSource::NewsApi)],
                ),
                fixed(
                    ApiSource::NyTimes,
                    vec![
                        article("older", "2024-01-01T00:00:00Z", ApiSource::NyTimes),
                        article("newer", "2024-01-05T00:00:00Z", ApiSource::NyTimes),
                    ],
                ),
            ]);

            let articles = aggregator.aggregate_only(ApiSource::NyTimes).await;
            assert_eq!(titles(&articles), vec!["newer", "older"]);

            assert!(aggregator.aggregate_only(ApiSource::EventRegistry).await.is_empty());
        }

        #[test]
        fn test_api_sources() {
            let aggregator = Aggregator::new(vec![
                fixed(ApiSource::NewsApi, vec![]),
                Arc::new(FailingSource(ApiSource::NyTimes)),
            ]);
            assert_eq!(
                aggregator.api_sources(),
                vec![ApiSource::NewsApi, ApiSource::NyTimes]
            );
        }
    }

    mod sort_tests {
        use super::*;

        #[test]
        fn test_descending_by_timestamp() {
            let mut articles = vec![
                article("mid", "2024-01-02T00:00:00Z", ApiSource::NewsApi),
                article("new", "2024-01-03T00:00:00Z", ApiSource::NewsApi),
                article("old", "2024-01-01T00:00:00Z", ApiSource::NewsApi),
            ];
            sort_by_recency(&mut articles);
            assert_eq!(titles(&articles), vec!["new", "mid", "old"]);
        }

        #[test]
        fn test_missing_timestamps_sort_last_in_original_order() {
            let mut articles = vec![
                article("undated-a", "", ApiSource::NewsApi),
                article("dated", "2020-01-01T00:00:00Z", ApiSource::NewsApi),
                article("undated-b", "garbage", ApiSource::NyTimes),
                article("epoch", "1970-01-01T00:00:00Z", ApiSource::EventRegistry),
            ];
            sort_by_recency(&mut articles);
            assert_eq!(
                titles(&articles),
                vec!["dated", "epoch", "undated-a", "undated-b"]
            );
        }

        #[test]
        fn test_equal_timestamps_keep_order() {
            let mut articles = vec![
                article("a", "2024-01-02T00:00:00Z", ApiSource::NewsApi),
                article("b", "2024-01-02T00:00:00Z", ApiSource::EventRegistry),
                article("c", "2024-01-02T00:00:00+00:00", ApiSource::NyTimes),
            ];
            sort_by_recency(&mut articles);
            assert_eq!(titles(&articles), vec!["a", "b", "c"]);
        }
    }
}
