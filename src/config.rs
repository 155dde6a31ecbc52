use serde::Deserialize;
use std::fmt;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Records requested from each upstream API
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Image path used when an upstream record has none
    #[serde(default = "default_image")]
    pub default_image: String,
    /// Outbound request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    /// Where the dashboard fetches aggregated articles from. Unset means
    /// this server's own `/news` on the `bind_address` port.
    #[serde(default)]
    pub news_endpoint: Option<String>,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

fn default_bind_address() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_page_size() -> usize {
    5
}

fn default_image() -> String {
    "/static/default-news.svg".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SourcesConfig {
    #[serde(default)]
    pub newsapi: NewsApiConfig,
    #[serde(default)]
    pub eventregistry: EventRegistryConfig,
    #[serde(default)]
    pub nytimes: NyTimesConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NewsApiConfig {
    pub base_url: String,
    pub country: Option<String>,
    pub category: Option<String>,
    pub language: Option<String>,
}

impl Default for NewsApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://newsapi.org/v2/top-headlines".to_string(),
            country: Some("us".to_string()),
            category: None,
            language: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EventRegistryConfig {
    pub base_url: String,
    pub lang: String,
}

impl Default for EventRegistryConfig {
    fn default() -> Self {
        Self {
            base_url: "https://eventregistry.org/api/v1/article/getArticles".to_string(),
            lang: "eng".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NyTimesConfig {
    pub base_url: String,
    pub section: String,
}

impl Default for NyTimesConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.nytimes.com/svc/topstories/v2".to_string(),
            section: "world".to_string(),
        }
    }
}

/// OAuth provider endpoints. Defaults point at Google.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AuthConfig {
    pub authorize_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    pub redirect_url: String,
    pub scopes: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            authorize_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            userinfo_url: "https://openidconnect.googleapis.com/v1/userinfo".to_string(),
            redirect_url: "http://localhost:3000/auth/callback".to_string(),
            scopes: "openid email profile".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            page_size: default_page_size(),
            default_image: default_image(),
            request_timeout: default_request_timeout(),
            news_endpoint: None,
            sources: SourcesConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Parse config from a TOML string (useful for testing)
    pub fn from_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to built-in defaults.
    /// The configured `news_endpoint`, or loopback on the port we listen on.
    pub fn news_endpoint_url(&self) -> String {
        if let Some(endpoint) = self.news_endpoint.as_deref().filter(|e| !e.trim().is_empty()) {
            return endpoint.to_string();
        }

        let port = self
            .bind_address
            .rsplit_once(':')
            .and_then(|(_, port)| port.parse::<u16>().ok())
            .unwrap_or(3000);
        format!("http://127.0.0.1:{}/news", port)
    }

    pub fn load_or_default<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}

/// Credentials read from the environment (and `.env` when present).
#[derive(Clone, Default)]
pub struct Secrets {
    pub news_api_key: Option<String>,
    pub event_registry_api_key: Option<String>,
    pub nytimes_api_key: Option<String>,
    pub oauth_client_id: Option<String>,
    pub oauth_client_secret: Option<String>,
}

impl Secrets {
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        Self {
            news_api_key: env_var("NEWS_API_KEY"),
            event_registry_api_key: env_var("EVENT_REGISTRY_API_KEY"),
            nytimes_api_key: env_var("NYTIMES_API_KEY"),
            oauth_client_id: env_var("OAUTH_CLIENT_ID"),
            oauth_client_secret: env_var("OAUTH_CLIENT_SECRET"),
        }
    }

    /// Names of the upstream API keys that are not set.
    pub fn missing_api_keys(&self) -> Vec<&'static str> {
        [
            ("NEWS_API_KEY", &self.news_api_key),
            ("EVENT_REGISTRY_API_KEY", &self.event_registry_api_key),
            ("NYTIMES_API_KEY", &self.nytimes_api_key),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_none())
        .map(|(name, _)| name)
        .collect()
    }

    /// Client id and secret, only when both are configured.
    pub fn oauth_credentials(&self) -> Option<(String, String)> {
        match (&self.oauth_client_id, &self.oauth_client_secret) {
            (Some(id), Some(secret)) => Some((id.clone(), secret.clone())),
            _ => None,
        }
    }
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn redact(value: &Option<String>) -> &'static str {
            if value.is_some() {
                "<set>"
            } else {
                "<unset>"
            }
        }

        f.debug_struct("Secrets")
            .field("news_api_key", &redact(&self.news_api_key))
            .field("event_registry_api_key", &redact(&self.event_registry_api_key))
            .field("nytimes_api_key", &redact(&self.nytimes_api_key))
            .field("oauth_client_id", &redact(&self.oauth_client_id))
            .field("oauth_client_secret", &redact(&self.oauth_client_secret))
            .finish()
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}
