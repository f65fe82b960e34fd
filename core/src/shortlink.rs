/// Short-link allocation: primary sled datastore, then external providers
///
/// Tiers are tried in order; each swallows its own failure and the chain
/// moves on. Only when every tier fails does the caller see an error.
use crate::config::Config;
use crate::error::{LetterError, Result};
use crate::hosting::BoxFuture;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const CODE_LEN: usize = 6;
const CODE_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
const MAX_ALLOCATION_ATTEMPTS: usize = 8;

/// Stored record for one short code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShortLinkRecord {
    pub code: String,
    pub long_url: String,
    pub created_at: String, // RFC3339
}

/// Short-code datastore backed by sled
#[derive(Clone)]
pub struct ShortLinkStore {
    db: sled::Db,
}

impl ShortLinkStore {
    pub fn new(data_dir: &Path) -> Result<Self> {
        let db_path = data_dir.join("shortlinks.db");
        debug!("Opening short-link store at {:?}", db_path);

        let db = sled::open(&db_path)
            .map_err(|e| LetterError::Storage(format!("Failed to open short-link store: {}", e)))?;

        info!("Short-link store initialized at {:?}", db_path);
        Ok(Self { db })
    }

    /// Store `long_url` under a fresh random code.
    pub fn allocate(&self, long_url: &str) -> Result<String> {
        for _ in 0..MAX_ALLOCATION_ATTEMPTS {
            let code = random_code();
            let record = ShortLinkRecord {
                code: code.clone(),
                long_url: long_url.to_string(),
                created_at: chrono::Utc::now().to_rfc3339(),
            };
            let value = serde_json::to_vec(&record).map_err(LetterError::Serialization)?;

            let swapped = self
                .db
                .compare_and_swap(code.as_bytes(), None as Option<&[u8]>, Some(value))
                .map_err(|e| LetterError::Storage(format!("Failed to store short link: {}", e)))?;

            match swapped {
                Ok(()) => {
                    self.db
                        .flush()
                        .map_err(|e| LetterError::Storage(format!("Failed to flush short links: {}", e)))?;
                    debug!("Allocated short code {}", code);
                    return Ok(code);
                }
                Err(_) => debug!("Short code {} already taken, retrying", code),
            }
        }
        Err(LetterError::Storage(
            "Could not allocate a free short code".to_string(),
        ))
    }

    pub fn resolve(&self, code: &str) -> Result<Option<String>> {
        match self
            .db
            .get(code.as_bytes())
            .map_err(|e| LetterError::Storage(format!("Failed to read short link: {}", e)))?
        {
            Some(value) => {
                let record = serde_json::from_slice::<ShortLinkRecord>(&value)
                    .map_err(LetterError::Serialization)?;
                Ok(Some(record.long_url))
            }
            None => Ok(None),
        }
    }

    pub fn count(&self) -> usize {
        self.db.len()
    }
}

fn random_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// One way of turning a long URL into a short one
pub trait Shortener: Send + Sync {
    fn name(&self) -> &'static str;

    fn shorten<'a>(&'a self, long_url: &'a str) -> BoxFuture<'a, Result<String>>;
}

/// Primary tier: our own datastore, links look like `<public>/l/<code>`
pub struct StoreShortener {
    store: ShortLinkStore,
    public_base_url: String,
}

impl StoreShortener {
    pub fn new(store: ShortLinkStore, public_base_url: &str) -> Self {
        Self {
            store,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl Shortener for StoreShortener {
    fn name(&self) -> &'static str {
        "datastore"
    }

    fn shorten<'a>(&'a self, long_url: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let store = self.store.clone();
            let url = long_url.to_string();
            let code = tokio::task::spawn_blocking(move || store.allocate(&url))
                .await
                .map_err(|e| LetterError::Storage(format!("Allocation task failed: {}", e)))??;
            Ok(format!("{}/l/{}", self.public_base_url, code))
        })
    }
}

fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_default()
}

/// Authenticated provider (bit.ly v4 API shape)
pub struct BitlyShortener {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

#[derive(Serialize)]
struct BitlyRequest<'a> {
    long_url: &'a str,
}

#[derive(Deserialize)]
struct BitlyResponse {
    link: String,
}

impl BitlyShortener {
    pub fn new(endpoint: String, token: Option<String>, timeout: Duration) -> Self {
        Self {
            client: http_client(timeout),
            endpoint,
            token,
        }
    }
}

impl Shortener for BitlyShortener {
    fn name(&self) -> &'static str {
        "bitly"
    }

    fn shorten<'a>(&'a self, long_url: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let token = self
                .token
                .as_deref()
                .ok_or_else(|| LetterError::Config("No bit.ly token configured".to_string()))?;

            let response = self
                .client
                .post(&self.endpoint)
                .bearer_auth(token)
                .json(&BitlyRequest { long_url })
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(LetterError::Upstream(format!(
                    "bit.ly answered HTTP {}",
                    response.status()
                )));
            }

            let body: BitlyResponse = response.json().await?;
            Ok(body.link)
        })
    }
}

/// Unauthenticated legacy provider (`GET ?url=`, plain-text body)
pub struct TinyUrlShortener {
    client: reqwest::Client,
    endpoint: String,
}

impl TinyUrlShortener {
    pub fn new(endpoint: String, timeout: Duration) -> Self {
        Self {
            client: http_client(timeout),
            endpoint,
        }
    }
}

impl Shortener for TinyUrlShortener {
    fn name(&self) -> &'static str {
        "tinyurl"
    }

    fn shorten<'a>(&'a self, long_url: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let response = self
                .client
                .get(&self.endpoint)
                .query(&[("url", long_url)])
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(LetterError::Upstream(format!(
                    "tinyurl answered HTTP {}",
                    response.status()
                )));
            }

            let body = response.text().await?;
            let short = body.trim();
            if !short.starts_with("http") {
                return Err(LetterError::Upstream(format!(
                    "tinyurl returned an unexpected body: {}",
                    short.chars().take(80).collect::<String>()
                )));
            }
            Ok(short.to_string())
        })
    }
}

/// Ordered fallback over shortening tiers
pub struct ShortenChain {
    tiers: Vec<Box<dyn Shortener>>,
}

impl ShortenChain {
    pub fn new(tiers: Vec<Box<dyn Shortener>>) -> Self {
        Self { tiers }
    }

    /// Datastore first, then the authenticated provider, then the legacy endpoint.
    pub fn from_config(config: &Config, store: ShortLinkStore) -> Self {
        Self::new(vec![
            Box::new(StoreShortener::new(store, &config.public_base_url)),
            Box::new(BitlyShortener::new(
                config.bitly_endpoint.clone(),
                config.bitly_token.clone(),
                config.request_timeout,
            )),
            Box::new(TinyUrlShortener::new(
                config.tinyurl_endpoint.clone(),
                config.request_timeout,
            )),
        ])
    }

    pub fn tier_names(&self) -> Vec<&'static str> {
        self.tiers.iter().map(|t| t.name()).collect()
    }

    pub async fn shorten(&self, long_url: &str) -> Result<String> {
        let mut last_error = None;
        for tier in &self.tiers {
            match tier.shorten(long_url).await {
                Ok(short) => {
                    debug!("Shortened via {}: {}", tier.name(), short);
                    return Ok(short);
                }
                Err(e) => {
                    warn!("Shortening tier {} failed: {}", tier.name(), e);
                    last_error = Some(format!("{}: {}", tier.name(), e));
                }
            }
        }
        let detail = last_error.unwrap_or_else(|| "no shortening tiers configured".to_string());
        error!("All shortening tiers failed ({})", detail);
        Err(LetterError::Upstream(format!("All shortening tiers failed ({})", detail)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_store_allocate_and_resolve() {
        let temp_dir = TempDir::new().unwrap();
        let store = ShortLinkStore::new(temp_dir.path()).unwrap();

        let code = store.allocate("https://post.example/?letter=abc").unwrap();
        assert_eq!(code.len(), CODE_LEN);
        assert!(code.bytes().all(|b| CODE_ALPHABET.contains(&b)));

        assert_eq!(
            store.resolve(&code).unwrap().as_deref(),
            Some("https://post.example/?letter=abc")
        );
        assert_eq!(store.resolve("zzzzzz").unwrap(), None);
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn test_codes_are_distinct() {
        let temp_dir = TempDir::new().unwrap();
        let store = ShortLinkStore::new(temp_dir.path()).unwrap();
        let a = store.allocate("https://a.example").unwrap();
        let b = store.allocate("https://b.example").unwrap();
        assert_ne!(a, b);
        assert_eq!(store.count(), 2);
    }

    #[tokio::test]
    async fn test_store_shortener_builds_public_link() {
        let temp_dir = TempDir::new().unwrap();
        let store = ShortLinkStore::new(temp_dir.path()).unwrap();
        let shortener = StoreShortener::new(store.clone(), "https://post.example/");

        let short = shortener.shorten("https://post.example/?letter=x").await.unwrap();
        let code = short.strip_prefix("https://post.example/l/").unwrap();
        assert_eq!(store.resolve(code).unwrap().as_deref(), Some("https://post.example/?letter=x"));
    }

    #[tokio::test]
    async fn test_bitly_without_token_fails_fast() {
        let bitly = BitlyShortener::new("http://127.0.0.1:9/".to_string(), None, Duration::from_millis(100));
        assert!(matches!(bitly.shorten("https://x.example").await, Err(LetterError::Config(_))));
    }

    #[tokio::test]
    async fn test_empty_chain_fails() {
        let chain = ShortenChain::new(Vec::new());
        assert!(matches!(chain.shorten("https://x.example").await, Err(LetterError::Upstream(_))));
    }
}
