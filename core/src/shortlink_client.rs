/// Short-link client: ask our service for an alias, fall back to the legacy
/// provider directly, and finally to the untouched long URL.
use crate::config::Config;
use crate::error::{LetterError, Result};
use crate::shortlink::{Shortener, TinyUrlShortener};
use serde::Deserialize;
use tracing::{debug, warn};

/// Which tier produced the link the user ends up sharing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShortenOutcome {
    Service(String),
    Legacy(String),
    /// Every tier failed; share the long URL itself
    LongUrl(String),
}

impl ShortenOutcome {
    pub fn url(&self) -> &str {
        match self {
            ShortenOutcome::Service(u) | ShortenOutcome::Legacy(u) | ShortenOutcome::LongUrl(u) => u,
        }
    }

    pub fn is_shortened(&self) -> bool {
        !matches!(self, ShortenOutcome::LongUrl(_))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShortenResponse {
    short_url: Option<String>,
    error: Option<String>,
}

pub struct ShortLinkClient {
    http: reqwest::Client,
    service_url: String,
    legacy: Option<Box<dyn Shortener>>,
}

impl ShortLinkClient {
    pub fn new(service_url: &str, legacy: Option<Box<dyn Shortener>>, timeout: std::time::Duration) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            service_url: service_url.trim_end_matches('/').to_string(),
            legacy,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.shorten_service_url,
            Some(Box::new(TinyUrlShortener::new(
                config.tinyurl_endpoint.clone(),
                config.request_timeout,
            ))),
            config.request_timeout,
        )
    }

    /// `GET /shorten?url=` against the service.
    pub async fn request_short_url(&self, long_url: &str) -> Result<String> {
        let response = self
            .http
            .get(format!("{}/shorten", self.service_url))
            .query(&[("url", long_url)])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LetterError::Timeout(format!("short-link service at {}", self.service_url))
                } else {
                    LetterError::Http(e)
                }
            })?;

        let status = response.status();
        let body: ShortenResponse = response.json().await?;
        match (status.is_success(), body.short_url, body.error) {
            (true, Some(short), _) if !short.is_empty() => Ok(short),
            (_, _, Some(err)) => Err(LetterError::Upstream(format!("HTTP {}: {}", status, err))),
            _ => Err(LetterError::Upstream(format!("HTTP {} without a short URL", status))),
        }
    }

    /// Never fails: the worst case is sharing the long URL as-is.
    pub async fn shorten(&self, long_url: &str) -> ShortenOutcome {
        match self.request_short_url(long_url).await {
            Ok(short) => {
                debug!("Short-link service returned {}", short);
                return ShortenOutcome::Service(short);
            }
            Err(e) => warn!("Short-link service unavailable: {}", e),
        }

        if let Some(legacy) = &self.legacy {
            match legacy.shorten(long_url).await {
                Ok(short) => return ShortenOutcome::Legacy(short),
                Err(e) => warn!("Legacy shortener {} failed: {}", legacy.name(), e),
            }
        }

        ShortenOutcome::LongUrl(long_url.to_string())
    }
}
