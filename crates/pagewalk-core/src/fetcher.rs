//! Fetch clients.
//!
//! The engine only depends on the [`FetchClient`] trait. [`HttpFetcher`] is the
//! reqwest-backed implementation used by the CLI; it owns retry, backoff and
//! response caching. [`OfflineFetcher`] refuses every request and backs page
//! tests.

use crate::{CacheMode, Error, FetchOptions, Response, Result, UrlRequest};
use async_trait::async_trait;
use reqwest::{Client, Method};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info, warn};

/// Transport used to resolve [`Source::Url`](crate::Source::Url) sources.
#[async_trait]
pub trait FetchClient: Send + Sync {
    /// Fetch one request. `options` come straight from configuration.
    async fn fetch(&self, request: &UrlRequest, options: &FetchOptions) -> Result<Response>;
}

/// Responses kept by an [`HttpFetcher`] unless configured otherwise.
pub const DEFAULT_CACHE_CAPACITY: usize = 256;

/// HTTP client with retries and a bounded in-memory response cache.
pub struct HttpFetcher {
    client: Client,
    cache: Mutex<ResponseCache>,
}

/// URL-keyed responses, evicted oldest first once `capacity` is reached.
#[derive(Default)]
struct ResponseCache {
    capacity: usize,
    entries: HashMap<String, Response>,
    order: VecDeque<String>,
}

impl ResponseCache {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    fn insert(&mut self, key: String, response: Response) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.insert(key.clone(), response).is_some() {
            return;
        }
        self.order.push_back(key);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                debug!(url = %oldest, "cache eviction");
                self.entries.remove(&oldest);
            }
        }
    }
}

impl HttpFetcher {
    /// Creates a fetcher; `verify` and the default user agent are fixed here,
    /// timeouts and retries are read from the options of every request.
    pub fn new(options: &FetchOptions) -> Result<Self> {
        let user_agent = options
            .user_agent
            .clone()
            .unwrap_or_else(|| concat!("pagewalk/", env!("CARGO_PKG_VERSION")).to_string());
        let client = Client::builder()
            .timeout(options.timeout())
            .user_agent(user_agent)
            .danger_accept_invalid_certs(!options.verify)
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(Error::Network)?;
        Ok(Self {
            client,
            cache: Mutex::new(ResponseCache::with_capacity(DEFAULT_CACHE_CAPACITY)),
        })
    }

    /// Keep at most `capacity` responses; `0` disables caching.
    #[must_use]
    pub fn with_cache_capacity(self, capacity: usize) -> Self {
        Self {
            cache: Mutex::new(ResponseCache::with_capacity(capacity)),
            ..self
        }
    }

    /// Number of responses currently cached.
    pub fn cached_responses(&self) -> usize {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    fn cached(&self, key: &str) -> Option<Response> {
        let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.entries.get(key).cloned().map(|mut response| {
            response.from_cache = true;
            response
        })
    }

    fn store(&self, key: String, response: &Response) {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, response.clone());
    }

    async fn send_once(&self, request: &UrlRequest, options: &FetchOptions) -> Result<Response> {
        let method = Method::from_bytes(request.method.to_ascii_uppercase().as_bytes())
            .map_err(|e| Error::Config(format!("invalid HTTP method '{}': {e}", request.method)))?;

        let mut builder = self
            .client
            .request(method, &request.url)
            .timeout(options.timeout());
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(data) = &request.data {
            builder = builder.body(data.clone());
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Http {
                locator: request.url.clone(),
                status: status.as_u16(),
                message: status
                    .canonical_reason()
                    .unwrap_or("unexpected status")
                    .to_string(),
            });
        }

        let final_url = response.url().to_string();
        let content = response.bytes().await?.to_vec();
        info!(url = %request.url, bytes = content.len(), "fetched");

        Ok(Response {
            locator: request.url.clone(),
            url: Some(final_url),
            status: status.as_u16(),
            content,
            from_cache: false,
        })
    }
}

#[async_trait]
impl FetchClient for HttpFetcher {
    async fn fetch(&self, request: &UrlRequest, options: &FetchOptions) -> Result<Response> {
        // Only idempotent, body-less requests are cacheable.
        let cache_key = (request.method.eq_ignore_ascii_case("GET") && request.data.is_none())
            .then(|| request.url.clone());

        if options.cache_mode == CacheMode::Default {
            if let Some(hit) = cache_key.as_deref().and_then(|key| self.cached(key)) {
                debug!(url = %request.url, "cache hit");
                return Ok(hit);
            }
        }

        let mut delay = options.retry_wait();
        let mut attempt = 0;
        let response = loop {
            match self.send_once(request, options).await {
                Ok(response) => break response,
                Err(err) if err.is_recoverable() && attempt < options.retries => {
                    attempt += 1;
                    warn!(
                        url = %request.url,
                        attempt,
                        retries = options.retries,
                        error = %err,
                        "retrying after recoverable error"
                    );
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                },
                Err(err) => return Err(err),
            }
        };

        if options.cache_mode != CacheMode::Off {
            if let Some(key) = cache_key {
                self.store(key, &response);
            }
        }
        Ok(response)
    }
}

/// Fetch client that never touches the network.
///
/// Every request fails with [`Error::Offline`].
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineFetcher;

#[async_trait]
impl FetchClient for OfflineFetcher {
    async fn fetch(&self, request: &UrlRequest, _options: &FetchOptions) -> Result<Response> {
        Err(Error::Offline(request.url.clone()))
    }
}
