use std::time::Duration;

use radar_core::env::{self, ConfigError};

/// Connection settings for the scan backend.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL, e.g. `https://abc.supabase.co`.
    pub api_url: String,
    /// Public API key sent with every request.
    pub anon_key: String,
    /// Long-lived refresh token for the acting user.
    pub refresh_token: String,
    /// Realtime WebSocket URL.
    pub realtime_url: String,
    pub http_timeout: Duration,
    /// Interval between realtime heartbeats.
    pub heartbeat_interval: Duration,
}

impl ClientConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var                   | Default                          |
    /// |---------------------------|----------------------------------|
    /// | `RADAR_API_URL`           | required                         |
    /// | `RADAR_ANON_KEY`          | required                         |
    /// | `RADAR_REFRESH_TOKEN`     | required                         |
    /// | `RADAR_REALTIME_URL`      | derived from `RADAR_API_URL`     |
    /// | `RADAR_HTTP_TIMEOUT_SECS` | `60`                             |
    /// | `RADAR_HEARTBEAT_SECS`    | `25`                             |
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_url = env::required("RADAR_API_URL")?
            .trim_end_matches('/')
            .to_string();
        let anon_key = env::required("RADAR_ANON_KEY")?;
        let refresh_token = env::required("RADAR_REFRESH_TOKEN")?;
        let realtime_url = match env::optional::<String>("RADAR_REALTIME_URL")? {
            Some(url) => url,
            None => realtime_url_for(&api_url, &anon_key),
        };

        Ok(Self {
            api_url,
            anon_key,
            refresh_token,
            realtime_url,
            http_timeout: Duration::from_secs(env::var_or("RADAR_HTTP_TIMEOUT_SECS", 60)?),
            heartbeat_interval: Duration::from_secs(env::var_or("RADAR_HEARTBEAT_SECS", 25)?),
        })
    }
}

/// Realtime endpoint served next to the HTTP API.
pub fn realtime_url_for(api_url: &str, anon_key: &str) -> String {
    let ws_base = if let Some(rest) = api_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = api_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        api_url.to_string()
    };
    format!(
        "{}/realtime/v1/websocket?apikey={anon_key}&vsn=1.0.0",
        ws_base.trim_end_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn realtime_url_swaps_scheme() {
        assert_eq!(
            realtime_url_for("https://abc.supabase.co", "key"),
            "wss://abc.supabase.co/realtime/v1/websocket?apikey=key&vsn=1.0.0"
        );
        assert_eq!(
            realtime_url_for("http://localhost:54321/", "k"),
            "ws://localhost:54321/realtime/v1/websocket?apikey=k&vsn=1.0.0"
        );
    }
}
