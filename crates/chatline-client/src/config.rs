use reqwest::Client;

use crate::error::ChatError;

pub const DEFAULT_API_URL: &str = "http://localhost:5000/api";

/// Client configuration.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Base URL of the backend's `/api` routes, without a trailing slash.
    pub api_url: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
        }
    }
}

impl ClientConfig {
    pub fn new(api_url: impl Into<String>) -> Self {
        let api_url: String = api_url.into();
        Self {
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    /// HTTP client shared by the transport and the store. No request timeout
    /// is set, so a long reply is never cut off client-side.
    pub fn http_client(&self) -> Result<Client, ChatError> {
        Client::builder()
            .user_agent(concat!("chatline/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ChatError::Transport(e.to_string()))
    }
}
