use std::sync::Arc;
use std::time::Instant;

use askama::Template;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    middleware,
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Extension, Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use serde::Deserialize;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{info, warn};

use crate::aggregator::Aggregator;
use crate::article::{ApiSource, NormalizedArticle};
use crate::auth::{self, AuthUser, OAuthClient, Session, SessionStore};
use crate::config::{Config, Secrets};
use crate::dashboard::{available_sources, view, NewsClient, SourceFilter};
use crate::sources::{build_client, default_sources};
use crate::stats::FeedStats;

pub struct AppState {
    pub config: Config,
    pub aggregator: Aggregator,
    pub news_client: NewsClient,
    pub sessions: SessionStore,
    /// `None` leaves the dashboard open to everyone
    pub oauth: Option<OAuthClient>,
}

impl AppState {
    pub fn new(config: Config, secrets: &Secrets) -> anyhow::Result<Self> {
        let client = build_client(config.request_timeout)?;

        let aggregator = Aggregator::new(default_sources(&config, secrets, client.clone()));
        let news_client = NewsClient::new(client.clone(), config.news_endpoint_url());
        let oauth = match secrets.oauth_credentials() {
            Some((client_id, client_secret)) => Some(OAuthClient::new(
                client,
                config.auth.clone(),
                client_id,
                client_secret,
            )?),
            None => None,
        };

        Ok(Self {
            config,
            aggregator,
            news_client,
            sessions: SessionStore::new(),
            oauth,
        })
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let gated = Router::new()
        .route("/dashboard", get(dashboard))
        .route("/dashboard/articles", get(dashboard_articles))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_session));

    Router::new()
        .route("/", get(index))
        .route("/news", get(news))
        .route("/login", get(login))
        .route("/auth/login", get(auth_login))
        .route("/auth/callback", get(auth_callback))
        .route("/logout", get(logout))
        .route("/health", get(health))
        .merge(gated)
        .nest_service("/static", ServeDir::new("static"))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// Template structs
#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginTemplate {
    pub auth_enabled: bool,
}

#[derive(Template)]
#[template(path = "dashboard.html")]
pub struct DashboardTemplate {
    pub user_name: String,
    pub signed_in: bool,
    pub source: String,
    pub search: String,
}

#[derive(Template)]
#[template(path = "articles.html")]
pub struct ArticlesTemplate {
    pub total: usize,
    pub source_count: usize,
    pub last_updated: String,
    pub heading: String,
    pub source: String,
    pub search: String,
    pub filters_active: bool,
    pub buttons: Vec<SourceButton>,
    pub cards: Vec<ArticleCard>,
    pub default_image: String,
}

#[derive(Template)]
#[template(path = "load_error.html")]
pub struct LoadErrorTemplate {
    pub message: String,
}

pub struct SourceButton {
    pub label: String,
    pub value: String,
    pub active: bool,
}

pub struct ArticleCard {
    pub title: String,
    pub description: String,
    pub url: String,
    pub image_url: String,
    pub published: String,
    pub published_iso: String,
    pub source_label: String,
    pub api_source: String,
}

impl From<&NormalizedArticle> for ArticleCard {
    fn from(article: &NormalizedArticle) -> Self {
        Self {
            title: article.title.clone(),
            description: article.description.clone(),
            url: article.url.clone(),
            image_url: article.image_url.clone(),
            published: article
                .published_at
                .map(|dt| dt.format("%b %-d, %Y").to_string())
                .unwrap_or_else(|| "Date not available".to_string()),
            published_iso: article.published_at_iso(),
            source_label: article.source_label.clone(),
            api_source: article.api_source.label().to_string(),
        }
    }
}

// Wrapper for HTML responses
struct HtmlTemplate<T>(T);

impl<T: Template> IntoResponse for HtmlTemplate<T> {
    fn into_response(self) -> Response {
        match self.0.render() {
            Ok(html) => Html(html).into_response(),
            Err(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to render template: {}", err),
            )
                .into_response(),
        }
    }
}

// Custom error type
pub struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Error: {}", self.0),
        )
            .into_response()
    }
}

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(err: E) -> Self {
        AppError(err.into())
    }
}

// Route handlers
pub async fn index() -> Redirect {
    Redirect::to("/dashboard")
}

#[derive(Debug, Default, Deserialize)]
pub struct NewsQuery {
    pub source: Option<String>,
}

/// Aggregated articles as JSON, newest first.
pub async fn news(State(state): State<Arc<AppState>>, Query(query): Query<NewsQuery>) -> Response {
    let requested = query
        .source
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("all"));

    let articles = match requested {
        None => state.aggregator.aggregate().await,
        Some(raw) => match raw.parse::<ApiSource>() {
            Ok(source) => state.aggregator.aggregate_only(source).await,
            Err(e) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({ "error": e.to_string() })),
                )
                    .into_response()
            }
        },
    };

    Json(articles).into_response()
}

pub async fn login(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    if state.oauth.is_some() {
        if let Some(token) = auth::session_token(&jar) {
            if state.sessions.get_session(&token).await.is_some() {
                return Redirect::to("/dashboard").into_response();
            }
        }
    }

    HtmlTemplate(LoginTemplate {
        auth_enabled: state.oauth.is_some(),
    })
    .into_response()
}

/// Start the provider's sign-in flow.
pub async fn auth_login(State(state): State<Arc<AppState>>) -> Redirect {
    match &state.oauth {
        Some(oauth) => {
            let csrf_state = state.sessions.issue_state().await;
            Redirect::to(oauth.authorize_url(&csrf_state).as_str())
        }
        None => Redirect::to("/dashboard"),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

pub async fn auth_callback(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(query): Query<CallbackQuery>,
) -> Result<Response, AppError> {
    let Some(oauth) = &state.oauth else {
        return Ok(Redirect::to("/dashboard").into_response());
    };

    if let Some(error) = &query.error {
        warn!(error = %error, "Identity provider declined sign-in");
        return Ok(Redirect::to("/login").into_response());
    }

    let state_ok = match &query.state {
        Some(csrf_state) => state.sessions.consume_state(csrf_state).await,
        None => false,
    };
    let (true, Some(code)) = (state_ok, query.code.as_deref()) else {
        warn!("Rejected sign-in callback with missing or unknown state");
        return Ok(Redirect::to("/login").into_response());
    };

    let user = oauth.authenticate(code).await?;
    info!(user = %user.name, "User signed in");

    let token = state
        .sessions
        .create_session(Session {
            user,
            created_at: Utc::now(),
        })
        .await;

    Ok((jar.add(auth::session_cookie(token)), Redirect::to("/dashboard")).into_response())
}

pub async fn logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    if let Some(token) = auth::session_token(&jar) {
        state.sessions.delete_session(&token).await;
    }

    (jar.remove(auth::removal_cookie()), Redirect::to("/login")).into_response()
}

#[derive(Debug, Default, Deserialize)]
pub struct DashboardQuery {
    pub source: Option<String>,
    #[serde(default)]
    pub q: String,
}

pub async fn dashboard(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<DashboardQuery>,
) -> impl IntoResponse {
    let filter = SourceFilter::parse(query.source.as_deref());

    HtmlTemplate(DashboardTemplate {
        user_name: user.name,
        signed_in: state.oauth.is_some(),
        source: filter.query_value().to_string(),
        search: query.q,
    })
}

/// Feed fragment loaded by the dashboard shell.
pub async fn dashboard_articles(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DashboardQuery>,
) -> Response {
    let started = Instant::now();

    let articles = match state.news_client.load_all().await {
        Ok(articles) => articles,
        // htmx only swaps 2xx responses, so the error panel goes out as 200
        Err(_) => {
            return HtmlTemplate(LoadErrorTemplate {
                message: "Failed to load news. Please try again later.".to_string(),
            })
            .into_response()
        }
    };

    let stats = FeedStats::from_articles(&articles, &state.config.default_image, Utc::now());
    stats.log(started.elapsed().as_millis());

    let filter = SourceFilter::parse(query.source.as_deref());
    let search = query.q.trim().to_string();
    let cards: Vec<ArticleCard> = view(&articles, &filter, &search)
        .into_iter()
        .map(ArticleCard::from)
        .collect();

    let mut buttons = vec![SourceButton {
        label: "All".to_string(),
        value: SourceFilter::All.query_value().to_string(),
        active: filter == SourceFilter::All,
    }];
    buttons.extend(available_sources(&articles).into_iter().map(|source| SourceButton {
        label: source.label().to_string(),
        value: source.query_id().to_string(),
        active: filter == SourceFilter::Only(source),
    }));

    let heading = match filter {
        SourceFilter::All => "All News".to_string(),
        SourceFilter::Only(source) => format!("{} News", source),
    };

    HtmlTemplate(ArticlesTemplate {
        total: stats.total,
        source_count: stats.source_count(),
        last_updated: Utc::now().format("%H:%M UTC").to_string(),
        heading,
        source: filter.query_value().to_string(),
        filters_active: filter != SourceFilter::All || !search.is_empty(),
        search,
        buttons,
        cards,
        default_image: state.config.default_image.clone(),
    })
    .into_response()
}

pub async fn health() -> impl IntoResponse {
    Html("OK")
}
