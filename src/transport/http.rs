//! HTTP request channel.
//!
//! One GET round trip per status query, against `{base}/{action}`. The
//! access token is installed as a default `Authorization` header when the
//! channel is built, so every request carries it.

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};

use super::RequestChannel;
use crate::error::{BotgateError, Result};

/// HTTP channel to the gateway's request surface.
pub struct HttpChannel {
    base_url: String,
    client: reqwest::Client,
}

impl HttpChannel {
    /// Build a channel rooted at `base_url` with a fixed bearer credential.
    pub fn new(base_url: &str, token: &str) -> Result<Self> {
        let bearer = HeaderValue::from_str(&format!("Token {token}"))
            .map_err(|_| BotgateError::InvalidToken)?;
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, bearer);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait::async_trait]
impl RequestChannel for HttpChannel {
    async fn request(&self, action: &str) -> Result<String> {
        let url = format!("{}/{}", self.base_url, action);
        let response = self.client.get(&url).send().await?;
        Ok(response.text().await?)
    }
}
