//! Source descriptors and lazily-fetched content.
//!
//! A [`Source`] says where a page's data lives: a URL request, a local file or
//! literal inline content. A [`SourceHandle`] pairs a source with a memoized
//! [`Response`] so the content is fetched at most once per page.

use crate::fetcher::FetchClient;
use crate::{Error, FetchOptions, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use tokio::sync::{OnceCell, Semaphore};
use tracing::{debug, info};

/// An HTTP request description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlRequest {
    /// Absolute URL.
    pub url: String,
    /// HTTP method, `GET` unless set.
    #[serde(default = "default_method")]
    pub method: String,
    /// Optional request body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    /// Extra request headers.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

fn default_method() -> String {
    "GET".to_string()
}

impl UrlRequest {
    /// A plain GET request.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: default_method(),
            data: None,
            headers: BTreeMap::new(),
        }
    }

    /// A POST request with a body.
    pub fn post(url: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: "POST".to_string(),
            data: Some(data.into()),
            headers: BTreeMap::new(),
        }
    }

    /// Add a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// Where a page's content comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Fetched through the [`FetchClient`].
    Url(UrlRequest),
    /// Read from the local filesystem.
    File(PathBuf),
    /// Literal content, no I/O at all.
    Inline(String),
}

impl Source {
    /// A GET request for `url`.
    pub fn url(url: impl Into<String>) -> Self {
        Self::Url(UrlRequest::get(url))
    }

    /// Local file at `path`.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    /// Literal content.
    pub fn inline(content: impl Into<String>) -> Self {
        Self::Inline(content.into())
    }

    /// Short locator used in logs, keys and error messages.
    #[must_use]
    pub fn locator(&self) -> String {
        match self {
            Self::Url(req) if req.method.eq_ignore_ascii_case("GET") => req.url.clone(),
            Self::Url(req) => format!("{} {}", req.method, req.url),
            Self::File(path) => format!("file://{}", path.display()),
            Self::Inline(content) => format!("inline:{}b", content.len()),
        }
    }

    /// JSON form of the source, used in page inputs and memoization keys.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Url(req) => {
                let mut request = Map::new();
                request.insert("url".into(), Value::from(req.url.as_str()));
                request.insert("method".into(), Value::from(req.method.as_str()));
                if let Some(data) = &req.data {
                    request.insert("data".into(), Value::from(data.as_str()));
                }
                if !req.headers.is_empty() {
                    let headers = req
                        .headers
                        .iter()
                        .map(|(name, value)| (name.clone(), Value::from(value.as_str())))
                        .collect();
                    request.insert("headers".into(), Value::Object(headers));
                }
                json!({ "url": request })
            },
            Self::File(path) => json!({ "file": path.to_string_lossy() }),
            Self::Inline(content) => json!({ "inline": content }),
        }
    }

    /// Base URL for resolving relative links, when the source has one.
    #[must_use]
    pub fn base_url(&self) -> Option<&str> {
        match self {
            Self::Url(req) => Some(&req.url),
            Self::File(_) | Self::Inline(_) => None,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.locator())
    }
}

/// Raw content obtained for a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Locator of the source that produced this response.
    pub locator: String,
    /// Final URL after redirects, for URL sources.
    pub url: Option<String>,
    /// HTTP status, 200 for file and inline sources.
    pub status: u16,
    /// Raw body.
    pub content: Vec<u8>,
    /// Whether the fetch client answered from its cache.
    pub from_cache: bool,
}

impl Response {
    /// Build a response for content that did not come over HTTP.
    pub fn local(locator: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            locator: locator.into(),
            url: None,
            status: 200,
            content: content.into(),
            from_cache: false,
        }
    }

    /// Body decoded as UTF-8.
    pub fn text(&self) -> Result<&str> {
        std::str::from_utf8(&self.content)
            .map_err(|e| Error::Parse(format!("{} is not valid UTF-8: {e}", self.locator)))
    }

    /// Body decoded as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.content)
            .map_err(|e| Error::Parse(format!("{} is not valid JSON: {e}", self.locator)))
    }

    /// Body parsed as an HTML document.
    ///
    /// The returned document is not `Send`; extract what you need before the
    /// next `.await`.
    pub fn html(&self) -> Result<scraper::Html> {
        Ok(scraper::Html::parse_document(self.text()?))
    }
}

/// A source plus its memoized content.
///
/// The first call to [`SourceHandle::content`] performs the fetch; every later
/// call returns the cached response.
#[derive(Debug)]
pub struct SourceHandle {
    source: Source,
    cached: OnceCell<Response>,
}

impl SourceHandle {
    /// Wrap a source. Nothing is fetched yet.
    pub const fn new(source: Source) -> Self {
        Self {
            source,
            cached: OnceCell::const_new(),
        }
    }

    /// The underlying descriptor.
    pub const fn source(&self) -> &Source {
        &self.source
    }

    /// Whether content has been fetched already.
    pub fn is_fetched(&self) -> bool {
        self.cached.initialized()
    }

    /// Fetch the content on first access, then return the cached response.
    ///
    /// URL fetches hold a permit from `connections` for their whole duration;
    /// the permit is released when the fetch completes, fails or is dropped.
    pub async fn content(
        &self,
        client: &dyn FetchClient,
        options: &FetchOptions,
        connections: &Semaphore,
    ) -> Result<&Response> {
        self.cached
            .get_or_try_init(|| self.load(client, options, connections))
            .await
    }

    async fn load(
        &self,
        client: &dyn FetchClient,
        options: &FetchOptions,
        connections: &Semaphore,
    ) -> Result<Response> {
        match &self.source {
            Source::Url(request) => {
                let _permit = connections
                    .acquire()
                    .await
                    .map_err(|_| Error::Config("connection pool has been closed".into()))?;
                info!(url = %request.url, method = %request.method, "fetching");
                let response = client.fetch(request, options).await?;
                if response.from_cache {
                    debug!(url = %request.url, "retrieved from cache");
                }
                Ok(response)
            },
            Source::File(path) => {
                debug!(path = %path.display(), "reading file source");
                let content = tokio::fs::read(path).await?;
                Ok(Response::local(self.source.locator(), content))
            },
            Source::Inline(content) => Ok(Response::local(
                self.source.locator(),
                content.as_bytes().to_vec(),
            )),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingClient {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl FetchClient for CountingClient {
        async fn fetch(&self, request: &UrlRequest, _options: &FetchOptions) -> Result<Response> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Response {
                locator: request.url.clone(),
                url: Some(request.url.clone()),
                status: 200,
                content: b"{\"ok\":true}".to_vec(),
                from_cache: false,
            })
        }
    }

    #[tokio::test]
    async fn test_url_source_fetched_once() -> Result<()> {
        let client = CountingClient::default();
        let pool = Semaphore::new(1);
        let handle = SourceHandle::new(Source::url("https://example.com/data.json"));
        assert!(!handle.is_fetched());

        let first = handle.content(&client, &FetchOptions::default(), &pool).await?;
        assert_eq!(first.json::<serde_json::Value>()?["ok"], true);
        handle.content(&client, &FetchOptions::default(), &pool).await?;

        assert!(handle.is_fetched());
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
        assert_eq!(pool.available_permits(), 1, "permit must be released");
        Ok(())
    }

    #[tokio::test]
    async fn test_inline_and_file_sources_skip_client() -> Result<()> {
        let client = CountingClient::default();
        let pool = Semaphore::new(1);

        let inline = SourceHandle::new(Source::inline("hello"));
        assert_eq!(
            inline.content(&client, &FetchOptions::default(), &pool).await?.text()?,
            "hello"
        );

        let dir = tempfile::tempdir()?;
        let path = dir.path().join("page.html");
        std::fs::write(&path, "<p>hi</p>")?;
        let file = SourceHandle::new(Source::file(&path));
        let response = file.content(&client, &FetchOptions::default(), &pool).await?;
        assert_eq!(response.text()?, "<p>hi</p>");
        assert!(response.locator.starts_with("file://"));

        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let client = CountingClient::default();
        let pool = Semaphore::new(1);
        let handle = SourceHandle::new(Source::file("/no/such/pagewalk/file"));
        let err = handle
            .content(&client, &FetchOptions::default(), &pool)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert!(!handle.is_fetched());
    }

    #[test]
    fn test_locator_forms() {
        assert_eq!(Source::url("https://a.test/x").locator(), "https://a.test/x");
        assert_eq!(
            Source::Url(UrlRequest::post("https://a.test/x", "q=1")).locator(),
            "POST https://a.test/x"
        );
        assert_eq!(Source::inline("abc").locator(), "inline:3b");
        assert_eq!(Source::url("https://a.test/").base_url(), Some("https://a.test/"));
        assert_eq!(Source::inline("abc").base_url(), None);
    }

    #[test]
    fn test_response_decoding_errors_are_parse_errors() {
        let bad_utf8 = Response::local("inline", vec![0xff, 0xfe]);
        assert!(matches!(bad_utf8.text(), Err(Error::Parse(_))));
        let bad_json = Response::local("inline", b"{nope".to_vec());
        assert!(matches!(
            bad_json.json::<serde_json::Value>(),
            Err(Error::Parse(_))
        ));
    }

    #[test]
    fn test_source_serde_shape() -> Result<()> {
        let source: Source = serde_json::from_str(r#"{"url":{"url":"https://a.test"}}"#)?;
        assert_eq!(source, Source::url("https://a.test"));
        let source: Source = serde_json::from_str(r#"{"inline":"<p/>"}"#)?;
        assert_eq!(source, Source::inline("<p/>"));
        Ok(())
    }

    #[test]
    fn test_value_form_keeps_request_details() -> Result<()> {
        let get = Source::url("https://a.test/search");
        let post = Source::Url(
            UrlRequest::post("https://a.test/search", "q=bees").header("Accept", "text/html"),
        );

        assert_eq!(get.to_value(), json!({"url": {"url": "https://a.test/search", "method": "GET"}}));
        assert_eq!(post.to_value()["url"]["data"], "q=bees");
        assert_eq!(post.to_value()["url"]["headers"]["Accept"], "text/html");
        assert_ne!(get.to_value(), post.to_value());

        let back: Source = serde_json::from_value(post.to_value())?;
        assert_eq!(back, post);
        assert_eq!(Source::inline("<p/>").to_value(), json!({"inline": "<p/>"}));
        Ok(())
    }
}
