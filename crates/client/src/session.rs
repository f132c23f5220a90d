//! Auth session that trades a refresh token for short-lived access tokens.
//!
//! The cached access token is re-validated before every use and
//! refreshed when it is within [`REFRESH_MARGIN`] of expiry.

use std::sync::Mutex as StdMutex;
use std::time::Duration;

use async_trait::async_trait;
use radar_core::error::RemoteError;
use radar_core::ports::{AccessToken, SessionProvider};
use radar_core::types::UserId;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Refresh this long before the server-side expiry.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Session backed by the auth endpoint of the backend.
pub struct RefreshingSession {
    client: reqwest::Client,
    token_url: String,
    anon_key: String,
    state: Mutex<SessionState>,
    user_id: StdMutex<Option<UserId>>,
}

struct SessionState {
    refresh_token: String,
    cached: Option<CachedToken>,
}

struct CachedToken {
    token: AccessToken,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: u64,
    #[serde(default)]
    user: Option<TokenUser>,
}

#[derive(Debug, Deserialize)]
struct TokenUser {
    id: UserId,
}

impl RefreshingSession {
    pub fn new(
        client: reqwest::Client,
        api_url: &str,
        anon_key: String,
        refresh_token: String,
        user_id: Option<UserId>,
    ) -> Self {
        Self {
            client,
            token_url: format!(
                "{}/auth/v1/token?grant_type=refresh_token",
                api_url.trim_end_matches('/')
            ),
            anon_key,
            state: Mutex::new(SessionState {
                refresh_token,
                cached: None,
            }),
            user_id: StdMutex::new(user_id),
        }
    }

    /// Exchange the current refresh token. Refresh tokens rotate, so the
    /// new one replaces the old.
    async fn refresh(&self, state: &mut SessionState) -> Result<AccessToken, RemoteError> {
        let response = self
            .client
            .post(&self.token_url)
            .header("apikey", &self.anon_key)
            .json(&serde_json::json!({ "refresh_token": state.refresh_token }))
            .send()
            .await
            .map_err(|e| RemoteError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_client_error() {
            tracing::warn!(status = status.as_u16(), "Refresh token rejected");
            return Err(RemoteError::SessionExpired);
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(RemoteError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))?;

        if let Some(user) = &body.user {
            *self.user_id.lock().unwrap_or_else(|e| e.into_inner()) = Some(user.id);
        }

        let token = AccessToken::new(body.access_token);
        state.refresh_token = body.refresh_token;
        state.cached = Some(CachedToken {
            token: token.clone(),
            expires_at: expiry_from(Instant::now(), body.expires_in),
        });

        tracing::debug!(expires_in = body.expires_in, "Access token refreshed");
        Ok(token)
    }
}

/// Local deadline after which a token must be refreshed before use.
fn expiry_from(now: Instant, expires_in_secs: u64) -> Instant {
    let lifetime = Duration::from_secs(expires_in_secs);
    now + lifetime.saturating_sub(REFRESH_MARGIN)
}

#[async_trait]
impl SessionProvider for RefreshingSession {
    async fn access_token(&self) -> Result<AccessToken, RemoteError> {
        let mut state = self.state.lock().await;
        if let Some(cached) = &state.cached {
            if Instant::now() < cached.expires_at {
                return Ok(cached.token.clone());
            }
        }
        self.refresh(&mut state).await
    }

    async fn force_refresh(&self) -> Result<AccessToken, RemoteError> {
        let mut state = self.state.lock().await;
        state.cached = None;
        self.refresh(&mut state).await
    }

    fn user_id(&self) -> Option<UserId> {
        *self.user_id.lock().unwrap_or_else(|e| e.into_inner())
    }
}
