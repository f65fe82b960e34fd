/// Image hosting adapter: push compressed images to a third-party host
/// and hand back a URL that can travel inside a share link.
use crate::config::Config;
use base64::{engine::general_purpose, Engine as _};
use serde::Deserialize;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, warn};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// True when `source_ref` can be loaded by a recipient without embedding bytes:
/// a network URL or a root-relative static asset path. Inline `data:` images
/// are local previews and never count as hosted.
pub fn is_hosted(source_ref: &str) -> bool {
    source_ref.starts_with("http") || source_ref.starts_with('/')
}

/// Anything that can turn image bytes into a hosted URL.
///
/// `upload` never fails past this boundary: any problem resolves to `None`
/// and the caller keeps its local preview.
pub trait ImageHost: Send + Sync {
    fn upload<'a>(&'a self, data: &'a [u8], filename: &'a str) -> BoxFuture<'a, Option<String>>;
}

/// imgbb-compatible upload endpoint (`POST ?key=<key>` with a base64 `image` form field)
pub struct ImgbbHost {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct ImgbbResponse {
    #[serde(default)]
    success: bool,
    data: Option<ImgbbData>,
}

#[derive(Deserialize)]
struct ImgbbData {
    url: String,
}

impl ImgbbHost {
    pub fn new(endpoint: String, api_key: Option<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint,
            api_key,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.image_host_endpoint.clone(),
            config.image_host_key.clone(),
            config.request_timeout,
        )
    }

    async fn try_upload(&self, key: &str, data: &[u8], filename: &str) -> Option<String> {
        let encoded = general_purpose::STANDARD.encode(data);
        let name = filename
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .unwrap_or(filename);

        let response = match self
            .client
            .post(&self.endpoint)
            .query(&[("key", key)])
            .form(&[("image", encoded.as_str()), ("name", name)])
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!("Image upload of {} failed: {}", filename, e);
                return None;
            }
        };

        if !response.status().is_success() {
            warn!("Image host rejected {}: HTTP {}", filename, response.status());
            return None;
        }

        match response.json::<ImgbbResponse>().await {
            Ok(ImgbbResponse {
                success: true,
                data: Some(data),
            }) if is_hosted(&data.url) => {
                debug!("Uploaded {} -> {}", filename, data.url);
                Some(data.url)
            }
            Ok(_) => {
                warn!("Image host returned no usable URL for {}", filename);
                None
            }
            Err(e) => {
                warn!("Unreadable image host response for {}: {}", filename, e);
                None
            }
        }
    }
}

impl ImageHost for ImgbbHost {
    fn upload<'a>(&'a self, data: &'a [u8], filename: &'a str) -> BoxFuture<'a, Option<String>> {
        Box::pin(async move {
            let Some(key) = self.api_key.as_deref().filter(|k| !k.is_empty()) else {
                warn!("No image host key configured, keeping local preview for {}", filename);
                return None;
            };
            self.try_upload(key, data, filename).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_hosted() {
        assert!(is_hosted("https://i.ibb.co/abc/stamp.png"));
        assert!(is_hosted("http://localhost:8080/x.png"));
        assert!(is_hosted("/assets/stamps/classic.png"));
        assert!(!is_hosted("data:image/png;base64,iVBORw0KGgo="));
        assert!(!is_hosted(""));
        assert!(!is_hosted("stamp.png"));
        assert!(!is_hosted("blob:https://app/1234"));
    }

    #[tokio::test]
    async fn test_upload_without_key_keeps_preview() {
        let host = ImgbbHost::new(
            "http://127.0.0.1:9/upload".to_string(),
            None,
            Duration::from_millis(200),
        );
        assert_eq!(host.upload(b"png", "stamp.png").await, None);
    }

    #[tokio::test]
    async fn test_upload_network_failure_is_none() {
        let host = ImgbbHost::new(
            "http://127.0.0.1:9/upload".to_string(),
            Some("key".to_string()),
            Duration::from_millis(200),
        );
        assert_eq!(host.upload(b"png", "stamp.png").await, None);
    }
}
