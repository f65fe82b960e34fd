/// Short-link HTTP service
///
/// Endpoints:
///   GET /shorten?url=<urlencoded long URL>   -> 200 {"shortUrl": "..."} | 400 | 500 {"error": "..."}
///   GET /l/<code>                            -> 301 Location: <long URL> | 400 | 404 | 500
use crate::config::Config;
use crate::error::{LetterError, Result};
use crate::shortlink::{ShortLinkStore, ShortenChain};
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

type Resp = Response<Full<bytes::Bytes>>;

/// Short codes never change target once allocated.
const RESOLVE_CACHE_CONTROL: &str = "public, max-age=3600";

/// Shared state for every connection
pub struct ShortLinkService {
    pub chain: ShortenChain,
    pub store: ShortLinkStore,
}

impl ShortLinkService {
    pub fn new(chain: ShortenChain, store: ShortLinkStore) -> Self {
        Self { chain, store }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let store = ShortLinkStore::new(&config.data_dir)?;
        let chain = ShortenChain::from_config(config, store.clone());
        Ok(Self::new(chain, store))
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn cors_headers(builder: hyper::http::response::Builder) -> hyper::http::response::Builder {
    builder
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, OPTIONS")
        .header("Access-Control-Allow-Headers", "Content-Type")
}

fn empty_resp() -> Resp {
    Response::new(Full::new(bytes::Bytes::new()))
}

fn json_resp(status: StatusCode, value: serde_json::Value) -> Resp {
    cors_headers(Response::builder())
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(bytes::Bytes::from(
            serde_json::to_vec(&value).unwrap_or_default(),
        )))
        .unwrap_or_else(|_| empty_resp())
}

fn json_err(status: StatusCode, msg: &str) -> Resp {
    json_resp(status, serde_json::json!({ "error": msg }))
}

fn text_resp(status: StatusCode, msg: &str) -> Resp {
    Response::builder()
        .status(status)
        .header("Content-Type", "text/plain; charset=utf-8")
        .body(Full::new(bytes::Bytes::from(msg.to_string())))
        .unwrap_or_else(|_| empty_resp())
}

fn query_param(query: &str, key: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        if k != key {
            return None;
        }
        urlencoding::decode(v).ok().map(|s| s.into_owned())
    })
}

// ─── Entry points ────────────────────────────────────────────────────────────

pub async fn start_shortlink_server(config: &Config) -> Result<()> {
    let service = Arc::new(ShortLinkService::from_config(config)?);
    let listener = TcpListener::bind(config.listen_addr).await.map_err(LetterError::Io)?;
    info!("Short-link service started on http://{}", config.listen_addr);
    info!("   Shortening tiers: {}", service.chain.tier_names().join(" -> "));
    serve(listener, service).await
}

/// Accept loop over an already-bound listener (tests bind port 0).
pub async fn serve(listener: TcpListener, service: Arc<ShortLinkService>) -> Result<()> {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let io = TokioIo::new(stream);
                let service = service.clone();
                tokio::spawn(async move {
                    let svc = service_fn(move |req| {
                        let service = service.clone();
                        async move { Ok::<_, Infallible>(handle(req, service).await) }
                    });
                    if let Err(e) = http1::Builder::new().serve_connection(io, svc).await {
                        if !e.is_incomplete_message() {
                            error!("Connection error from {}: {:?}", peer, e);
                        }
                    }
                });
            }
            Err(e) => error!("Failed to accept connection: {}", e),
        }
    }
}

// ─── Router ──────────────────────────────────────────────────────────────────

async fn handle(req: Request<hyper::body::Incoming>, service: Arc<ShortLinkService>) -> Resp {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().unwrap_or("").to_string();

    if method == Method::OPTIONS {
        return cors_headers(Response::builder())
            .status(StatusCode::NO_CONTENT)
            .body(Full::new(bytes::Bytes::new()))
            .unwrap_or_else(|_| empty_resp());
    }

    match (method, path.as_str()) {
        (Method::GET, "/shorten") => shorten(&query, &service).await,
        (Method::GET, "/l") => text_resp(StatusCode::BAD_REQUEST, "Missing short code"),
        (Method::GET, p) if p.starts_with("/l/") => {
            let code = p.trim_start_matches("/l/").trim_end_matches('/').to_string();
            resolve(&code, &service).await
        }
        _ => json_err(StatusCode::NOT_FOUND, "not found"),
    }
}

async fn shorten(query: &str, service: &ShortLinkService) -> Resp {
    let long_url = match query_param(query, "url").filter(|u| !u.is_empty()) {
        Some(url) => url,
        None => return json_err(StatusCode::BAD_REQUEST, "Missing ?url parameter"),
    };

    match service.chain.shorten(&long_url).await {
        Ok(short_url) => json_resp(StatusCode::OK, serde_json::json!({ "shortUrl": short_url })),
        Err(e) => json_err(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

async fn resolve(code: &str, service: &ShortLinkService) -> Resp {
    if code.is_empty() {
        return text_resp(StatusCode::BAD_REQUEST, "Missing short code");
    }

    let store = service.store.clone();
    let lookup_code = code.to_string();
    let lookup = tokio::task::spawn_blocking(move || store.resolve(&lookup_code))
        .await
        .map_err(|e| LetterError::Storage(format!("Lookup task failed: {}", e)))
        .and_then(|r| r);

    match lookup {
        Ok(Some(long_url)) => {
            debug!("Resolved {} -> {}", code, long_url);
            Response::builder()
                .status(StatusCode::MOVED_PERMANENTLY)
                .header("Location", long_url)
                .header("Cache-Control", RESOLVE_CACHE_CONTROL)
                .body(Full::new(bytes::Bytes::new()))
                .unwrap_or_else(|_| {
                    text_resp(StatusCode::INTERNAL_SERVER_ERROR, "Stored URL is not a valid redirect")
                })
        }
        Ok(None) => text_resp(StatusCode::NOT_FOUND, "Short link not found"),
        Err(e) => {
            error!("Error resolving {}: {}", code, e);
            text_resp(StatusCode::INTERNAL_SERVER_ERROR, "Failed to resolve short link")
        }
    }
}
