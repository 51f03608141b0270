//! External suggestion client: a retrying wrapper around a generative-text
//! HTTP endpoint.
//!
//! The wrapper sits inside a best-effort background job, so it never fails
//! past its boundary: every terminal error degrades to a fixed fallback
//! string. Retry policy: up to `max_attempts` calls, exponential backoff
//! (`base_delay * 2^attempt`) on HTTP 429/5xx, immediate fallback on 403
//! (credential error) and on any other failure. A missing API key skips the
//! network entirely.

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::config::Config;
use crate::suggest::model::GenerateResponse;

pub mod model;

pub const FALLBACK_UNAVAILABLE: &str = "Marketing AI service is unavailable.";
pub const FALLBACK_NO_KEY: &str = "Marketing AI service is unavailable: API Key missing.";

#[derive(Debug, Error)]
pub enum SuggestError {
    #[error("credentials rejected (HTTP 403)")]
    Forbidden,
    #[error("rate limited (HTTP 429)")]
    RateLimited,
    #[error("server error (HTTP {0})")]
    Server(u16),
    #[error("unexpected status (HTTP {0})")]
    Status(u16),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid endpoint URL")]
    BadUrl,
}

impl SuggestError {
    fn is_retryable(&self) -> bool {
        matches!(self, SuggestError::RateLimited | SuggestError::Server(_))
    }
}

/// Text generation as the rest of the crate sees it: infallible.
#[async_trait]
pub trait SuggestionService: Send + Sync {
    async fn generate(&self, system_prompt: &str, user_query: &str) -> String;
}

/// One raw request/response exchange with the endpoint. Split out from the
/// retry loop so tests can script responses without a network.
#[async_trait]
pub trait GenerateTransport: Send + Sync {
    async fn attempt(&self, body: &Value) -> Result<Value, SuggestError>;
}

/// Real transport: POSTs to `v1beta/models/<model>:generateContent`.
pub struct GenerativeApi {
    http: Client,
    base_url: Url,
    api_key: String,
    model: String,
}

impl fmt::Debug for GenerativeApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerativeApi")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl GenerativeApi {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Result<Self> {
        let base_url = Url::parse(base_url).context("invalid suggestion base URL")?;
        let http = Client::builder()
            .user_agent("backhouse/0.1")
            .no_proxy()
            .build()
            .expect("reqwest client");
        Ok(Self {
            http,
            base_url,
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }

    fn endpoint(&self) -> Result<Url, SuggestError> {
        let mut url = self
            .base_url
            .join(&format!("v1beta/models/{}:generateContent", self.model))
            .map_err(|_| SuggestError::BadUrl)?;
        url.query_pairs_mut().append_pair("key", &self.api_key);
        Ok(url)
    }
}

#[async_trait]
impl GenerateTransport for GenerativeApi {
    async fn attempt(&self, body: &Value) -> Result<Value, SuggestError> {
        let res = self
            .http
            .post(self.endpoint()?)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        let status = res.status();
        if status == StatusCode::FORBIDDEN {
            return Err(SuggestError::Forbidden);
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            let body = res.text().await.unwrap_or_default();
            warn!("rate limited by suggestion endpoint: {}", body);
            return Err(SuggestError::RateLimited);
        }
        if status.is_server_error() {
            return Err(SuggestError::Server(status.as_u16()));
        }
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            warn!("suggestion endpoint error - Status: {}, Body: {}", status, body);
            return Err(SuggestError::Status(status.as_u16()));
        }
        Ok(res.json::<Value>().await?)
    }
}

/// Retry/backoff state machine over a transport.
pub struct Suggester {
    transport: Option<Box<dyn GenerateTransport>>,
    max_attempts: u32,
    base_delay: Duration,
}

impl Suggester {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let key = cfg.suggest.api_key.trim();
        let transport: Option<Box<dyn GenerateTransport>> = if key.is_empty() {
            None
        } else {
            Some(Box::new(GenerativeApi::new(
                &cfg.suggest.base_url,
                key,
                &cfg.suggest.model,
            )?))
        };
        Ok(Self {
            transport,
            max_attempts: cfg.suggest.max_attempts,
            base_delay: Duration::from_millis(cfg.suggest.base_delay_ms),
        })
    }

    /// Build over an arbitrary transport (tests script these).
    pub fn with_transport(
        transport: Box<dyn GenerateTransport>,
        max_attempts: u32,
        base_delay: Duration,
    ) -> Self {
        Self {
            transport: Some(transport),
            max_attempts,
            base_delay,
        }
    }

    /// A suggester with no credentials configured: always falls back.
    pub fn without_credentials() -> Self {
        Self {
            transport: None,
            max_attempts: 1,
            base_delay: Duration::from_millis(1),
        }
    }
}

#[async_trait]
impl SuggestionService for Suggester {
    async fn generate(&self, system_prompt: &str, user_query: &str) -> String {
        let Some(transport) = self.transport.as_ref() else {
            warn!("suggestion API key is not configured");
            return FALLBACK_NO_KEY.to_string();
        };

        let body = build_generate_request(system_prompt, user_query);
        for attempt in 0..self.max_attempts {
            match transport.attempt(&body).await {
                Ok(value) => match extract_text(&value) {
                    Some(text) => return text,
                    None => {
                        warn!("suggestion response carried no generated text");
                        return FALLBACK_UNAVAILABLE.to_string();
                    }
                },
                Err(err) if err.is_retryable() && attempt + 1 < self.max_attempts => {
                    let delay = self.base_delay * 2u32.pow(attempt);
                    warn!(
                        ?err,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "suggestion attempt failed; backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    warn!(?err, attempt, "suggestion request failed");
                    return FALLBACK_UNAVAILABLE.to_string();
                }
            }
        }
        FALLBACK_UNAVAILABLE.to_string()
    }
}

/// Request body for the generative endpoint.
pub fn build_generate_request(system_prompt: &str, user_query: &str) -> Value {
    json!({
        "contents": [{ "parts": [{ "text": user_query }] }],
        "systemInstruction": { "parts": [{ "text": system_prompt }] },
    })
}

/// Pull the generated text out of a response body. `None` when the nested
/// path is absent or empty, which callers treat as a failed call.
pub fn extract_text(value: &Value) -> Option<String> {
    let resp: GenerateResponse = serde_json::from_value(value.clone()).ok()?;
    resp.candidates
        .into_iter()
        .next()?
        .content
        .parts
        .into_iter()
        .next()?
        .text
        .filter(|t| !t.is_empty())
}
