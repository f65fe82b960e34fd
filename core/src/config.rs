/// Configuration management
use crate::error::{LetterError, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_PORT: u16 = 8787;

/// Service and client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Listening address of the short-link server
    pub listen_addr: SocketAddr,

    /// Directory holding the short-link and history databases (defaults to `.letterpost`)
    pub data_dir: PathBuf,

    /// Public origin used when minting short links, e.g. `https://post.example`
    pub public_base_url: String,

    /// Timeout for every outbound call (uploads, shortening providers)
    pub request_timeout: Duration,

    /// Authenticated shortening provider
    pub bitly_endpoint: String,
    pub bitly_token: Option<String>,

    /// Unauthenticated legacy shortening endpoint
    pub tinyurl_endpoint: String,

    /// Image host
    pub image_host_endpoint: String,
    pub image_host_key: Option<String>,

    /// Longest side of a compressed image, in pixels
    pub image_max_dimension: u32,

    /// JPEG quality (1-100) for compressed images
    pub image_jpeg_quality: u8,

    /// Short-link service the client talks to
    pub shorten_service_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            data_dir: PathBuf::from(".letterpost"),
            public_base_url: format!("http://localhost:{}", DEFAULT_PORT),
            request_timeout: Duration::from_secs(8),
            bitly_endpoint: "https://api-ssl.bitly.com/v4/shorten".to_string(),
            bitly_token: None,
            tinyurl_endpoint: "https://tinyurl.com/api-create.php".to_string(),
            image_host_endpoint: "https://api.imgbb.com/1/upload".to_string(),
            image_host_key: None,
            image_max_dimension: 800,
            image_jpeg_quality: 70,
            shorten_service_url: format!("http://localhost:{}", DEFAULT_PORT),
        }
    }
}

impl Config {
    /// Create config from command line arguments
    pub fn from_args(args: &[String]) -> Result<Self> {
        if args.len() < 2 {
            return Err(LetterError::Config(format!(
                "Usage: {} <port> [--data-dir <path>] [--public-url <url>] [--timeout-secs <n>]",
                args.first().map(String::as_str).unwrap_or("letterpost-server")
            )));
        }

        let port = args[1]
            .parse::<u16>()
            .map_err(|_| LetterError::Config("Port must be a valid number (0-65535)".to_string()))?;

        let mut config = Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], port)),
            public_base_url: format!("http://localhost:{}", port),
            shorten_service_url: format!("http://localhost:{}", port),
            ..Default::default()
        };

        let mut i = 2;
        while i < args.len() {
            match args[i].as_str() {
                "--data-dir" => {
                    let path = args.get(i + 1).ok_or_else(|| {
                        LetterError::Config("--data-dir requires a path argument".to_string())
                    })?;
                    config.data_dir = PathBuf::from(path);
                    i += 2;
                }
                "--public-url" => {
                    let url = args.get(i + 1).ok_or_else(|| {
                        LetterError::Config("--public-url requires a URL argument".to_string())
                    })?;
                    config.public_base_url = url.trim_end_matches('/').to_string();
                    i += 2;
                }
                "--timeout-secs" => {
                    let secs = args.get(i + 1).ok_or_else(|| {
                        LetterError::Config("--timeout-secs requires a number".to_string())
                    })?;
                    let secs = secs.parse::<u64>().map_err(|_| {
                        LetterError::Config("--timeout-secs must be a positive number".to_string())
                    })?;
                    config.request_timeout = Duration::from_secs(secs.max(1));
                    i += 2;
                }
                other => {
                    return Err(LetterError::Config(format!("Unknown argument: {}", other)));
                }
            }
        }

        config.apply_env();
        Ok(config)
    }

    /// Defaults plus environment overrides; used by the CLI, which has no port argument.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("LETTERPOST_PUBLIC_URL") {
            self.public_base_url = url.trim_end_matches('/').to_string();
        }
        if let Ok(token) = std::env::var("LETTERPOST_BITLY_TOKEN") {
            self.bitly_token = Some(token).filter(|t| !t.is_empty());
        }
        if let Ok(endpoint) = std::env::var("LETTERPOST_BITLY_ENDPOINT") {
            self.bitly_endpoint = endpoint;
        }
        if let Ok(endpoint) = std::env::var("LETTERPOST_TINYURL_ENDPOINT") {
            self.tinyurl_endpoint = endpoint;
        }
        if let Ok(key) = std::env::var("LETTERPOST_IMGBB_KEY") {
            self.image_host_key = Some(key).filter(|k| !k.is_empty());
        }
        if let Ok(url) = std::env::var("LETTERPOST_SHORTEN_SERVICE") {
            self.shorten_service_url = url.trim_end_matches('/').to_string();
        }
        if let Some(dir) = std::env::var_os("LETTERPOST_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
    }
}
