//! OAuth login gate for the dashboard.
//!
//! The identity provider does the authentication. This module only runs the
//! authorization-code exchange, keeps an in-memory session per signed-in
//! browser, and redirects everyone else to `/login`.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::routes::AppState;

pub const SESSION_COOKIE: &str = "news_session";

const SESSION_HOURS: i64 = 24;
const STATE_MINUTES: i64 = 10;
/// Outstanding login states kept at once; the oldest is evicted past this.
const MAX_PENDING_STATES: usize = 1024;

/// Signed-in user, available to gated handlers as a request extension.
#[derive(Clone, Debug, PartialEq)]
pub struct AuthUser {
    pub name: String,
    pub email: Option<String>,
}

impl AuthUser {
    pub fn guest() -> Self {
        Self {
            name: "Guest".to_string(),
            email: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Session {
    pub user: AuthUser,
    pub created_at: DateTime<Utc>,
}

/// In-memory sessions and pending login states.
///
/// Sessions expire after 24 hours, login states after 10 minutes.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    pending_states: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            pending_states: RwLock::new(HashMap::new()),
        }
    }

    /// Create a new session and return its token
    pub async fn create_session(&self, session: Session) -> String {
        let token = Uuid::new_v4().to_string();
        self.sessions.write().await.insert(token.clone(), session);
        token
    }

    pub async fn get_session(&self, token: &str) -> Option<Session> {
        let sessions = self.sessions.read().await;
        let session = sessions.get(token)?;

        if Utc::now().signed_duration_since(session.created_at) >= Duration::hours(SESSION_HOURS) {
            return None;
        }

        Some(session.clone())
    }

    pub async fn delete_session(&self, token: &str) {
        self.sessions.write().await.remove(token);
    }

    /// New CSRF `state` for an authorization request.
    ///
    /// Stale states are pruned on every insert and the map never holds more
    /// than `MAX_PENDING_STATES` entries.
    pub async fn issue_state(&self) -> String {
        let state = Uuid::new_v4().to_string();
        let now = Utc::now();

        let mut pending = self.pending_states.write().await;
        pending.retain(|_, issued| now.signed_duration_since(*issued) < Duration::minutes(STATE_MINUTES));
        while pending.len() >= MAX_PENDING_STATES {
            let oldest = pending
                .iter()
                .min_by_key(|(_, issued)| **issued)
                .map(|(key, _)| key.clone());
            match oldest {
                Some(key) => {
                    pending.remove(&key);
                }
                None => break,
            }
        }
        pending.insert(state.clone(), now);

        state
    }

    /// True once per issued, unexpired state.
    pub async fn consume_state(&self, state: &str) -> bool {
        match self.pending_states.write().await.remove(state) {
            Some(issued) => Utc::now().signed_duration_since(issued) < Duration::minutes(STATE_MINUTES),
            None => false,
        }
    }

    /// Drop expired sessions and stale login states
    pub async fn cleanup_expired(&self) {
        let now = Utc::now();
        self.sessions
            .write()
            .await
            .retain(|_, s| now.signed_duration_since(s.created_at) < Duration::hours(SESSION_HOURS));
        self.pending_states
            .write()
            .await
            .retain(|_, issued| now.signed_duration_since(*issued) < Duration::minutes(STATE_MINUTES));
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Background task that periodically drops expired sessions.
pub async fn start_session_cleanup(state: Arc<AppState>, interval_minutes: u64) {
    let interval = std::time::Duration::from_secs(interval_minutes * 60);

    loop {
        tokio::time::sleep(interval).await;
        state.sessions.cleanup_expired().await;
        debug!("Expired sessions cleaned up");
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid provider url '{0}'")]
    InvalidUrl(String),
    #[error("identity provider request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("identity provider returned status {0}")]
    Status(StatusCode),
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    name: Option<String>,
    given_name: Option<String>,
    email: Option<String>,
}

/// Authorization-code flow against the configured provider.
pub struct OAuthClient {
    http: Client,
    config: AuthConfig,
    authorize_url: Url,
    client_id: String,
    client_secret: String,
}

impl OAuthClient {
    pub fn new(http: Client, config: AuthConfig, client_id: String, client_secret: String) -> Result<Self, AuthError> {
        let authorize_url = Url::parse(&config.authorize_url)
            .map_err(|_| AuthError::InvalidUrl(config.authorize_url.clone()))?;

        Ok(Self {
            http,
            config,
            authorize_url,
            client_id,
            client_secret,
        })
    }

    /// Where to send the browser to sign in.
    pub fn authorize_url(&self, state: &str) -> Url {
        let mut url = self.authorize_url.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.config.redirect_url)
            .append_pair("scope", &self.config.scopes)
            .append_pair("state", state);
        url
    }

    /// Trade an authorization code for the signed-in user's profile.
    pub async fn authenticate(&self, code: &str) -> Result<AuthUser, AuthError> {
        let response = self
            .http
            .post(&self.config.token_url)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.config.redirect_url.as_str()),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(AuthError::Status(response.status()));
        }
        let token: TokenResponse = response.json().await?;

        let response = self
            .http
            .get(&self.config.userinfo_url)
            .bearer_auth(&token.access_token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(AuthError::Status(response.status()));
        }
        let info: UserInfo = response.json().await?;

        let name = info
            .name
            .or(info.given_name)
            .or_else(|| info.email.clone())
            .unwrap_or_else(|| "Reader".to_string());

        Ok(AuthUser {
            name,
            email: info.email,
        })
    }
}

/// Value of the session cookie, if the request carries one.
pub fn session_token(jar: &CookieJar) -> Option<String> {
    jar.get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
}

pub fn session_cookie(token: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

/// Pass to `CookieJar::remove` to expire the session cookie.
pub fn removal_cookie() -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE).path("/").build()
}

/// Gate for dashboard routes.
///
/// With no OAuth client configured every visitor passes as [`AuthUser::guest`].
/// Otherwise a live session is required and everyone else goes to `/login`.
pub async fn require_session(State(state): State<Arc<AppState>>, mut request: Request, next: Next) -> Response {
    let user = if state.oauth.is_none() {
        Some(AuthUser::guest())
    } else {
        match session_token(&CookieJar::from_headers(request.headers())) {
            Some(token) => state.sessions.get_session(&token).await.map(|s| s.user),
            None => None,
        }
    };

    match user {
        Some(user) => {
            debug!(user = %user.name, path = %request.uri().path(), "Authenticated request");
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        None => {
            debug!(path = %request.uri().path(), "No session, redirecting to login");
            Redirect::to("/login").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn session(hours_ago: i64) -> Session {
        Session {
            user: AuthUser {
                name: "Ada".to_string(),
                email: Some("ada@example.com".to_string()),
            },
            created_at: Utc::now() - Duration::hours(hours_ago),
        }
    }

    mod session_store_tests {
        use super::*;

        #[tokio::test]
        async fn test_session_round_trip() {
            let store = SessionStore::new();
            let token = store.create_session(session(0)).await;
            assert!(!token.is_empty());

            let retrieved = store.get_session(&token).await.unwrap();
            assert_eq!(retrieved.user.name, "Ada");

            store.delete_session(&token).await;
            assert!(store.get_session(&token).await.is_none());
        }

        #[tokio::test]
        async fn test_session_expiration() {
            let store = SessionStore::new();
            let token = store.create_session(session(25)).await;
            assert!(store.get_session(&token).await.is_none(), "Expired session should return None");
        }

        #[tokio::test]
        async fn test_unknown_token() {
            let store = SessionStore::new();
            assert!(store.get_session("nope").await.is_none());
        }

        #[tokio::test]
        async fn test_state_is_single_use() {
            let store = SessionStore::new();
            let state = store.issue_state().await;

            assert!(store.consume_state(&state).await);
            assert!(!store.consume_state(&state).await);
            assert!(!store.consume_state("forged").await);
        }

        #[tokio::test]
        async fn test_issue_state_prunes_stale_entries() {
            let store = SessionStore::new();
            store
                .pending_states
                .write()
                .await
                .insert("stale".to_string(), Utc::now() - Duration::minutes(STATE_MINUTES + 1));

            let fresh = store.issue_state().await;

            let pending = store.pending_states.read().await;
            assert!(!pending.contains_key("stale"));
            assert!(pending.contains_key(&fresh));
        }

        #[tokio::test]
        async fn test_pending_states_are_capped() {
            let store = SessionStore::new();
            store
                .pending_states
                .write()
                .await
                .insert("oldest".to_string(), Utc::now() - Duration::minutes(1));

            for _ in 0..MAX_PENDING_STATES + 10 {
                store.issue_state().await;
            }

            let pending = store.pending_states.read().await;
            assert_eq!(pending.len(), MAX_PENDING_STATES);
            assert!(!pending.contains_key("oldest"));
        }

        #[tokio::test]
        async fn test_cleanup_expired() {
            let store = SessionStore::new();
            let fresh = store.create_session(session(1)).await;
            let stale = store.create_session(session(30)).await;

            store.cleanup_expired().await;

            assert!(store.get_session(&fresh).await.is_some());
            assert!(!store.sessions.read().await.contains_key(&stale));
        }
    }

    mod cookie_tests {
        use super::*;
        use axum::http::{header, HeaderMap, HeaderValue};

        fn jar(cookie_header: &'static str) -> CookieJar {
            let mut headers = HeaderMap::new();
            headers.insert(header::COOKIE, HeaderValue::from_static(cookie_header));
            CookieJar::from_headers(&headers)
        }

        #[test]
        fn test_session_token_found_among_other_cookies() {
            let jar = jar("theme=dark; news_session=abc-123; lang=en");
            assert_eq!(session_token(&jar), Some("abc-123".to_string()));
        }

        #[test]
        fn test_session_token_missing_or_empty() {
            assert_eq!(session_token(&CookieJar::new()), None);
            assert_eq!(session_token(&jar("news_session=")), None);
        }

        #[test]
        fn test_session_cookie_attributes() {
            let cookie = session_cookie("tok".to_string());
            assert_eq!(cookie.name(), SESSION_COOKIE);
            assert_eq!(cookie.value(), "tok");
            assert_eq!(cookie.path(), Some("/"));
            assert_eq!(cookie.http_only(), Some(true));
            assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        }

        #[test]
        fn test_removal_expires_the_cookie() {
            let jar = jar("news_session=abc-123").remove(removal_cookie());
            let response = (jar, "bye").into_response();

            let set_cookie = response
                .headers()
                .get(header::SET_COOKIE)
                .unwrap()
                .to_str()
                .unwrap();
            assert!(set_cookie.starts_with("news_session=;"));
            assert!(set_cookie.contains("Max-Age=0"));
            assert!(set_cookie.contains("Path=/"));
        }
    }

    mod oauth_tests {
        use super::*;
        use crate::sources::build_client;
        use wiremock::matchers::{body_string_contains, header as header_eq, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        fn client(server_uri: &str) -> OAuthClient {
            let config = AuthConfig {
                authorize_url: format!("{}/authorize", server_uri),
                token_url: format!("{}/token", server_uri),
                userinfo_url: format!("{}/userinfo", server_uri),
                redirect_url: "http://localhost:3000/auth/callback".to_string(),
                scopes: "openid email profile".to_string(),
            };
            OAuthClient::new(build_client(5).unwrap(), config, "client-1".to_string(), "s3cret".to_string())
                .unwrap()
        }

        #[test]
        fn test_invalid_authorize_url_rejected() {
            let config = AuthConfig {
                authorize_url: "not a url".to_string(),
                ..Default::default()
            };
            let result = OAuthClient::new(build_client(5).unwrap(), config, "id".into(), "secret".into());
            assert!(matches!(result, Err(AuthError::InvalidUrl(_))));
        }

        #[test]
        fn test_authorize_url_parameters() {
            let url = client("https://accounts.example.com").authorize_url("state-xyz");
            let pairs: HashMap<String, String> = url.query_pairs().into_owned().collect();

            assert_eq!(url.path(), "/authorize");
            assert_eq!(pairs["response_type"], "code");
            assert_eq!(pairs["client_id"], "client-1");
            assert_eq!(pairs["redirect_uri"], "http://localhost:3000/auth/callback");
            assert_eq!(pairs["scope"], "openid email profile");
            assert_eq!(pairs["state"], "state-xyz");
        }

        #[tokio::test]
        async fn test_authenticate_exchanges_code_and_reads_profile() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/token"))
                .and(body_string_contains("code=the-code"))
                .and(body_string_contains("grant_type=authorization_code"))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_string(r#"{"access_token": "at-1", "token_type": "Bearer"}"#),
                )
                .expect(1)
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path("/userinfo"))
                .and(header_eq("authorization", "Bearer at-1"))
                .respond_with(ResponseTemplate::new(200).set_body_string(
                    r#"{"sub": "1", "name": "Ada Lovelace", "email": "ada@example.com"}"#,
                ))
                .expect(1)
                .mount(&server)
                .await;

            let user = client(&server.uri()).authenticate("the-code").await.unwrap();
            assert_eq!(user.name, "Ada Lovelace");
            assert_eq!(user.email.as_deref(), Some("ada@example.com"));
        }

        #[tokio::test]
        async fn test_authenticate_rejected_code() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/token"))
                .respond_with(ResponseTemplate::new(400).set_body_string(r#"{"error": "invalid_grant"}"#))
                .mount(&server)
                .await;

            let result = client(&server.uri()).authenticate("bad").await;
            assert!(matches!(result, Err(AuthError::Status(StatusCode::BAD_REQUEST))));
        }
    }
}
