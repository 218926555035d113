//! Error types and handling for pagewalk-core operations.
//!
//! This module provides the error type shared by every stage of a scrape:
//! fetching a source, resolving dependencies, parsing a page and binding
//! records. Errors are categorized for logging and carry recoverability hints
//! that the HTTP fetcher uses for its retry policy.
//!
//! ## Error Categories
//!
//! - **Skip**: a page or item deliberately omitted. Not a failure.
//! - **Transport**: `Http`, `Network`, `Io`, `Offline`
//! - **Content**: `Parse`, `Validation`, `Serialization`
//! - **Graph**: `CyclicDependency`, `InvalidDependency`, `PaginationCycle`, `MissingSource`
//! - **Configuration**: `Config`
//!
//! A dependency that failed once is recorded for the rest of the run; every
//! page depending on it receives the same failure as [`Error::Shared`].
//!
//! Failures raised while processing a page are wrapped in [`Error::Page`] so the
//! page type and input that triggered them are always available:
//!
//! ```rust
//! use pagewalk_core::Error;
//!
//! let err = Error::Page {
//!     kind: "listing",
//!     input: "{\"page\":2}".to_string(),
//!     source: Box::new(Error::Parse("no table".to_string())),
//! };
//! assert_eq!(err.category(), "parse");
//! assert!(matches!(err.root(), Error::Parse(_)));
//! ```

use std::sync::Arc;
use thiserror::Error;

/// The main error type for pagewalk-core operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A page or item was deliberately skipped.
    ///
    /// Raised from a parse step (see [`Error::skip`]) when known-bad data should
    /// contribute nothing. The scrape loop treats it as a terminal `Skipped`
    /// state, never as a failure.
    #[error("skipped: {0}")]
    Skip(String),

    /// The server answered with a non-success status.
    #[error("HTTP {status} for {locator}: {message}")]
    Http {
        /// URL that was requested.
        locator: String,
        /// Status code returned by the server.
        status: u16,
        /// Short description of the failure.
        message: String,
    },

    /// Network operation failed before a status was available.
    ///
    /// ## Recoverability
    ///
    /// Connection and timeout errors are recoverable, malformed requests are not.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// I/O operation failed, usually while reading a file source.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A network fetch was attempted where none is allowed.
    ///
    /// Page tests run against an offline client; a URL example source ends up here.
    #[error("Offline: refusing to fetch {0}")]
    Offline(String),

    /// Content is malformed for the format the page expects.
    #[error("Parse error: {0}")]
    Parse(String),

    /// A raw value was rejected by schema binding.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A page depends on itself, directly or transitively, on the same input.
    ///
    /// `chain` lists the page keys along the resolution path, ending with the
    /// repeated one.
    #[error("Cyclic dependency: {}", chain.join(" -> "))]
    CyclicDependency {
        /// Resolution path that closed the cycle.
        chain: Vec<String>,
    },

    /// A dependency resolved to something other than a single item.
    #[error("Dependency '{name}' is invalid: {reason}")]
    InvalidDependency {
        /// Name under which the dependency was declared.
        name: String,
        /// What the dependency produced instead.
        reason: String,
    },

    /// A pagination successor points back to a page already seen in its chain.
    #[error("Pagination cycle: {page} was already visited")]
    PaginationCycle {
        /// Key of the repeated page.
        page: String,
    },

    /// A page has no source and cannot derive one from its input.
    #[error("Missing source: {0}")]
    MissingSource(String),

    /// Configuration is invalid or inaccessible.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization or deserialization failed outside schema binding.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A failure shared by every page that depends on the same failed page.
    ///
    /// Dependency failures are memoized per run, so each dependent re-raises
    /// the one recorded error instead of fetching and parsing it again.
    #[error(transparent)]
    Shared(Arc<Error>),

    /// A failure raised while processing a specific page.
    ///
    /// Carries the page type and canonical input so failures deep inside a
    /// crawl can be diagnosed.
    #[error("{kind}({input}): {source}")]
    Page {
        /// Page type identity.
        kind: &'static str,
        /// Canonical JSON form of the page input.
        input: String,
        /// Underlying failure.
        #[source]
        source: Box<Error>,
    },
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl Error {
    /// Build a skip signal with a reason.
    ///
    /// ```rust
    /// use pagewalk_core::Error;
    ///
    /// let err = Error::skip("row without a name");
    /// assert!(err.is_skip());
    /// ```
    pub fn skip(reason: impl Into<String>) -> Self {
        Self::Skip(reason.into())
    }

    /// Innermost error, looking through [`Error::Page`] wrappers.
    #[must_use]
    pub fn root(&self) -> &Self {
        let mut current = self;
        loop {
            current = match current {
                Self::Page { source, .. } => &**source,
                Self::Shared(shared) => &**shared,
                other => return other,
            };
        }
    }

    /// Consume the error and return the innermost one.
    ///
    /// A [`Error::Shared`] failure still held elsewhere is returned as is;
    /// use [`Error::root`] to inspect it.
    #[must_use]
    pub fn into_root(self) -> Self {
        match self {
            Self::Page { source, .. } => source.into_root(),
            Self::Shared(shared) => match Arc::try_unwrap(shared) {
                Ok(inner) => inner.into_root(),
                Err(shared) => Self::Shared(shared),
            },
            other => other,
        }
    }

    /// Whether this error is a skip signal rather than a failure.
    #[must_use]
    pub fn is_skip(&self) -> bool {
        matches!(self.root(), Self::Skip(_))
    }

    /// Check if the error might be recoverable through retry logic.
    ///
    /// Returns `true` for transient transport failures (timeouts, refused
    /// connections, 5xx and 429 responses, interrupted I/O).
    ///
    /// ```rust
    /// use pagewalk_core::Error;
    ///
    /// let busy = Error::Http { locator: "https://x".into(), status: 503, message: "busy".into() };
    /// let gone = Error::Http { locator: "https://x".into(), status: 404, message: "gone".into() };
    /// assert!(busy.is_recoverable());
    /// assert!(!gone.is_recoverable());
    /// assert!(!Error::Parse("bad".into()).is_recoverable());
    /// ```
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self.root() {
            Self::Network(e) => e.is_timeout() || e.is_connect(),
            Self::Http { status, .. } => *status >= 500 || *status == 429,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }

    /// Get the error category as a string identifier, for logging.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::Skip(_) => "skip",
            Self::Http { .. } => "http",
            Self::Network(_) => "network",
            Self::Io(_) => "io",
            Self::Offline(_) => "offline",
            Self::Parse(_) => "parse",
            Self::Validation(_) => "validation",
            Self::CyclicDependency { .. } => "cyclic_dependency",
            Self::InvalidDependency { .. } => "invalid_dependency",
            Self::PaginationCycle { .. } => "pagination_cycle",
            Self::MissingSource(_) => "missing_source",
            Self::Config(_) => "config",
            Self::Serialization(_) => "serialization",
            Self::Page { source, .. } => source.category(),
            Self::Shared(shared) => shared.category(),
        }
    }
}

/// Convenience type alias for `std::result::Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use std::io;

    fn wrapped(inner: Error) -> Error {
        Error::Page {
            kind: "outer",
            input: "null".to_string(),
            source: Box::new(Error::Page {
                kind: "inner",
                input: "\"x\"".to_string(),
                source: Box::new(inner),
            }),
        }
    }

    #[test]
    fn test_root_looks_through_page_wrappers() {
        let err = wrapped(Error::Validation("missing name".into()));
        assert!(matches!(err.root(), Error::Validation(msg) if msg == "missing name"));
        assert_eq!(err.category(), "validation");
        assert!(matches!(err.into_root(), Error::Validation(_)));
    }

    #[test]
    fn test_page_wrapper_display_names_page_and_input() {
        let err = wrapped(Error::Parse("no rows".into()));
        let msg = err.to_string();
        assert!(msg.starts_with("outer(null): inner(\"x\"): Parse error: no rows"), "{msg}");
    }

    #[test]
    fn test_skip_is_detected_through_wrappers() {
        assert!(wrapped(Error::skip("bad row")).is_skip());
        assert!(!wrapped(Error::Parse("bad row".into())).is_skip());
    }

    #[test]
    fn test_recoverable_errors() {
        let recoverable = [
            Error::Io(io::Error::new(io::ErrorKind::TimedOut, "timeout")),
            Error::Io(io::Error::new(io::ErrorKind::Interrupted, "interrupted")),
            Error::Http {
                locator: "https://example.com".into(),
                status: 429,
                message: "slow down".into(),
            },
        ];
        for err in recoverable {
            assert!(err.is_recoverable(), "{err} should be recoverable");
        }

        let permanent = [
            Error::Io(io::Error::new(io::ErrorKind::NotFound, "missing")),
            Error::Offline("https://example.com".into()),
            Error::CyclicDependency {
                chain: vec!["a".into(), "a".into()],
            },
            Error::skip("nope"),
        ];
        for err in permanent {
            assert!(!err.is_recoverable(), "{err} should not be recoverable");
        }
    }

    #[test]
    fn test_shared_failure_is_transparent() {
        let shared = Arc::new(wrapped(Error::Validation("bad session".into())));
        let first = Error::Shared(Arc::clone(&shared));
        let second = Error::Shared(Arc::clone(&shared));

        assert_eq!(first.to_string(), shared.to_string());
        assert_eq!(second.category(), "validation");
        assert!(matches!(second.root(), Error::Validation(_)));

        // Still shared with `first`, so it stays wrapped.
        assert!(matches!(second.into_root(), Error::Shared(_)));
        drop(shared);
        assert!(matches!(first.into_root(), Error::Validation(_)));
    }

    #[test]
    fn test_cycle_display_lists_chain() {
        let err = Error::CyclicDependency {
            chain: vec!["a(1)".into(), "b(1)".into(), "a(1)".into()],
        };
        assert_eq!(err.to_string(), "Cyclic dependency: a(1) -> b(1) -> a(1)");
    }

    #[test]
    fn test_serde_json_conversion() {
        let err: Error = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
        assert_eq!(err.category(), "serialization");
    }
}
