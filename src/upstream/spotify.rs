//! Spotify Web API client
//!
//! Uses the refresh-token grant to obtain short-lived access tokens and then
//! polls `/v1/me/player/currently-playing`. Responsibilities:
//! - cache the access token and renew it shortly before it expires
//! - drop the cached token and retry once when the API answers 401
//! - normalize `204 No Content` (nothing playing) into an idle state

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::state::UpstreamState;
use crate::upstream::NowPlayingSource;
use crate::utils::error::UpstreamError;

pub const DEFAULT_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
pub const DEFAULT_API_URL: &str = "https://api.spotify.com/v1/me/player/currently-playing";

/// Tokens are renewed this long before Spotify says they expire.
const EXPIRY_MARGIN_SECS: i64 = 30;

#[derive(Debug, Clone)]
pub struct SpotifyCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone)]
pub(crate) struct AccessToken {
    pub(crate) value: String,
    pub(crate) expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub(crate) fn new(value: String, expires_in_secs: i64, now: DateTime<Utc>) -> Self {
        Self {
            value,
            expires_at: now + chrono::Duration::seconds(expires_in_secs - EXPIRY_MARGIN_SECS),
        }
    }

    pub(crate) fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

#[derive(Debug)]
pub struct SpotifyClient {
    http: reqwest::Client,
    credentials: SpotifyCredentials,
    token_url: String,
    api_url: String,
    token: Mutex<Option<AccessToken>>,
}

impl SpotifyClient {
    pub fn new(credentials: SpotifyCredentials, timeout: Duration) -> Result<Self, UpstreamError> {
        Self::with_endpoints(credentials, timeout, DEFAULT_TOKEN_URL, DEFAULT_API_URL)
    }

    /// Same as [`SpotifyClient::new`] against custom endpoints.
    pub fn with_endpoints(
        credentials: SpotifyCredentials,
        timeout: Duration,
        token_url: impl Into<String>,
        api_url: impl Into<String>,
    ) -> Result<Self, UpstreamError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            credentials,
            token_url: token_url.into(),
            api_url: api_url.into(),
            token: Mutex::new(None),
        })
    }

    async fn access_token(&self) -> Result<String, UpstreamError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(Utc::now())) {
            return Ok(token.value.clone());
        }

        let token = self.refresh_access_token().await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    async fn invalidate_token(&self) {
        self.token.lock().await.take();
    }

    async fn refresh_access_token(&self) -> Result<AccessToken, UpstreamError> {
        debug!("refreshing spotify access token");

        let response = self
            .http
            .post(&self.token_url)
            .basic_auth(
                &self.credentials.client_id,
                Some(&self.credentials.client_secret),
            )
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", self.credentials.refresh_token.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Auth(format!("token endpoint returned {status}: {body}")));
        }

        let body: TokenResponse = serde_json::from_slice(&response.bytes().await?)?;
        Ok(AccessToken::new(body.access_token, body.expires_in, Utc::now()))
    }

    async fn request_currently_playing(
        &self,
        token: &str,
    ) -> Result<reqwest::Response, UpstreamError> {
        Ok(self.http.get(&self.api_url).bearer_auth(token).send().await?)
    }
}

#[async_trait]
impl NowPlayingSource for SpotifyClient {
    async fn fetch(&self) -> Result<UpstreamState, UpstreamError> {
        let token = self.access_token().await?;
        let mut response = self.request_currently_playing(&token).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            debug!("access token rejected, renewing");
            self.invalidate_token().await;
            let token = self.access_token().await?;
            response = self.request_currently_playing(&token).await?;
        }

        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(UpstreamState::idle());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
