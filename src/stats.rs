use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::article::{ApiSource, NormalizedArticle};

/// Summary of one dashboard load, logged and partly shown as stat cards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedStats {
    pub total: usize,
    pub by_source: Vec<(ApiSource, usize)>,
    /// Share of records with a real (non-default) image, in percent
    pub image_percentage: f64,
    /// Hours since publication over records that have a timestamp
    pub age_hours: Option<AgeDistribution>,
    /// Serialized size of the list in KiB
    pub data_size_kb: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgeDistribution {
    pub average: f64,
    pub min: f64,
    pub max: f64,
}

impl FeedStats {
    pub fn from_articles(articles: &[NormalizedArticle], default_image: &str, now: DateTime<Utc>) -> Self {
        let by_source = ApiSource::ALL
            .into_iter()
            .map(|source| {
                let count = articles.iter().filter(|a| a.api_source == source).count();
                (source, count)
            })
            .filter(|(_, count)| *count > 0)
            .collect();

        let with_image = articles
            .iter()
            .filter(|a| !a.image_url.is_empty() && a.image_url != default_image)
            .count();
        let image_percentage = if articles.is_empty() {
            0.0
        } else {
            round2(with_image as f64 / articles.len() as f64 * 100.0)
        };

        let ages: Vec<f64> = articles
            .iter()
            .filter_map(|a| a.published_at)
            .map(|published| (now - published).num_seconds() as f64 / 3600.0)
            .collect();
        let age_hours = if ages.is_empty() {
            None
        } else {
            let sum: f64 = ages.iter().sum();
            Some(AgeDistribution {
                average: round2(sum / ages.len() as f64),
                min: round2(ages.iter().copied().fold(f64::INFINITY, f64::min)),
                max: round2(ages.iter().copied().fold(f64::NEG_INFINITY, f64::max)),
            })
        };

        let bytes = serde_json::to_vec(articles).map(|b| b.len()).unwrap_or(0);

        Self {
            total: articles.len(),
            by_source,
            image_percentage,
            age_hours,
            data_size_kb: round2(bytes as f64 / 1024.0),
        }
    }

    pub fn source_count(&self) -> usize {
        self.by_source.len()
    }

    pub fn log(&self, load_ms: u128) {
        let by_source: Vec<String> = self
            .by_source
            .iter()
            .map(|(source, count)| format!("{}={}", source, count))
            .collect();

        info!(
            load_ms = load_ms as u64,
            total = self.total,
            by_source = %by_source.join(","),
            image_percentage = self.image_percentage,
            age_avg_hours = ?self.age_hours.as_ref().map(|a| a.average),
            age_min_hours = ?self.age_hours.as_ref().map(|a| a.min),
            age_max_hours = ?self.age_hours.as_ref().map(|a| a.max),
            data_size_kb = self.data_size_kb,
            "Dashboard feed loaded"
        );
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
