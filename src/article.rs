use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Title used when an upstream record carries none.
pub const UNTITLED: &str = "Untitled";

/// Which of the upstream adapters produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ApiSource {
    #[serde(rename = "NewsAPI")]
    NewsApi,
    #[serde(rename = "EventRegistry")]
    EventRegistry,
    #[serde(rename = "NYTimes")]
    NyTimes,
}

impl ApiSource {
    /// Declaration order. Merges and dashboard fan-out both follow it.
    pub const ALL: [ApiSource; 3] = [ApiSource::NewsApi, ApiSource::EventRegistry, ApiSource::NyTimes];

    pub fn label(self) -> &'static str {
        match self {
            ApiSource::NewsApi => "NewsAPI",
            ApiSource::EventRegistry => "EventRegistry",
            ApiSource::NyTimes => "NYTimes",
        }
    }

    /// Value used in `?source=` query strings.
    pub fn query_id(self) -> &'static str {
        match self {
            ApiSource::NewsApi => "newsapi",
            ApiSource::EventRegistry => "eventregistry",
            ApiSource::NyTimes => "nytimes",
        }
    }

    /// Publisher label used when the upstream record names none.
    pub fn fallback_label(self) -> &'static str {
        match self {
            ApiSource::NewsApi => "NewsAPI",
            ApiSource::EventRegistry => "Event Registry",
            ApiSource::NyTimes => "New York Times",
        }
    }
}

impl fmt::Display for ApiSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown news source '{0}'")]
pub struct UnknownSource(pub String);

impl FromStr for ApiSource {
    type Err = UnknownSource;

    /// Accepts either the query id (`nytimes`) or the label (`NYTimes`), case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        ApiSource::ALL
            .into_iter()
            .find(|source| {
                source.query_id().eq_ignore_ascii_case(wanted)
                    || source.label().eq_ignore_ascii_case(wanted)
            })
            .ok_or_else(|| UnknownSource(s.to_string()))
    }
}

/// Canonical article shape shared by every adapter, the `/news` endpoint and the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedArticle {
    pub title: String,
    pub description: String,
    pub url: String,
    pub image_url: String,
    #[serde(with = "iso_timestamp")]
    pub published_at: Option<DateTime<Utc>>,
    pub source_label: String,
    pub api_source: ApiSource,
}

impl NormalizedArticle {
    /// `publishedAt` as it appears on the wire: ISO-8601 or empty.
    pub fn published_at_iso(&self) -> String {
        self.published_at.map(format_timestamp).unwrap_or_default()
    }
}

/// Provider fields after schema-specific extraction, before fallbacks.
#[derive(Debug, Default, Clone)]
pub struct RawFields {
    pub title: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub image_url: Option<String>,
    pub published: Option<String>,
    pub source_label: Option<String>,
}

/// Knobs shared by every adapter's mapping step.
#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    pub page_size: usize,
    pub default_image: String,
}

impl NormalizeOptions {
    /// Apply the uniform fallback policy. Returns `None` for records without
    /// an `http`/`https` link.
    pub fn build(&self, api_source: ApiSource, raw: RawFields) -> Option<NormalizedArticle> {
        let url = web_link(raw.url?)?;

        let published_at = match non_empty(raw.published) {
            Some(value) => {
                let parsed = parse_timestamp(&value);
                if parsed.is_none() {
                    debug!(source = %api_source, value = %value, "Unparseable publication date");
                }
                parsed
            }
            None => None,
        };

        Some(NormalizedArticle {
            title: non_empty(raw.title).unwrap_or_else(|| UNTITLED.to_string()),
            description: non_empty(raw.description).unwrap_or_default(),
            url,
            image_url: non_empty(raw.image_url).unwrap_or_else(|| self.default_image.clone()),
            published_at,
            source_label: non_empty(raw.source_label)
                .unwrap_or_else(|| api_source.fallback_label().to_string()),
            api_source,
        })
    }
}

/// First candidate that holds something other than whitespace.
pub fn first_present<I>(candidates: I) -> Option<String>
where
    I: IntoIterator<Item = Option<String>>,
{
    candidates.into_iter().find_map(non_empty)
}

/// Keeps the value verbatim; whitespace only counts when deciding emptiness.
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// The trimmed link, if it parses as an absolute `http` or `https` URL.
fn web_link(raw: String) -> Option<String> {
    let trimmed = raw.trim();
    match Url::parse(trimmed) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Some(trimmed.to_string()),
        Ok(url) => {
            debug!(scheme = %url.scheme(), "Rejecting link with non-web scheme");
            None
        }
        Err(_) => None,
    }
}

/// Parse the date representations the upstream APIs use.
///
/// Accepts RFC 3339, RFC 2822, naive ISO date-times (taken as UTC), bare dates
/// and all-digit epoch values in seconds or milliseconds.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    if raw.bytes().all(|b| b.is_ascii_digit()) {
        let value: i64 = raw.parse().ok()?;
        // Anything past 1973 in milliseconds is far beyond any plausible seconds value
        return if value > 100_000_000_000 {
            DateTime::from_timestamp_millis(value)
        } else {
            DateTime::from_timestamp(value, 0)
        };
    }

    for format in [
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
    }

    DateTime::parse_from_rfc2822(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// ISO-8601 in UTC with millisecond precision, e.g. `2024-01-02T00:00:00.000Z`.
pub fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// `publishedAt` is always a string on the wire; missing dates are `""`.
mod iso_timestamp {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(dt) => serializer.serialize_str(&super::format_timestamp(*dt)),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().and_then(super::parse_timestamp))
    }
}
