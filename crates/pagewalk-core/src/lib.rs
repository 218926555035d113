//! # pagewalk-core
//!
//! Core engine for pagewalk - a page-oriented scraper that turns fetched
//! documents into validated, structured records.
//!
//! A scrape is composed of small, independently testable pages. Each page
//! knows where its content lives and how to parse it; pages can depend on
//! other pages, continue onto a next page, or expand into child pages. The
//! engine drives them from a set of seeds to a lazy stream of records.
//!
//! ## Architecture
//!
//! - **Sources**: URL requests, local files and inline content, fetched once per page
//! - **Pages**: the [`Page`] trait and its [`PageResult`]
//! - **Resolver**: runs the fetch, dependency and parse pipeline with per-run memoization
//! - **Pagination**: follows next-page chains and refuses to loop
//! - **Scrape loop**: the depth-first [`Scraper`] producing a [`ScrapeRun`] stream
//! - **Error Handling**: one error type with categorization and recovery hints
//!
//! ## Quick Start
//!
//! ```rust
//! use futures::TryStreamExt;
//! use pagewalk_core::pages::HtmlListPage;
//! use pagewalk_core::{Config, OfflineFetcher, Scraper, Source, Workflow};
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> pagewalk_core::Result<()> {
//! let html = r#"<ul><li>Ada</li><li>Grace</li></ul>"#;
//! let workflow = Workflow::new().with_seed(HtmlListPage::new(Source::inline(html), "li"));
//!
//! let scraper = Scraper::new(Arc::new(OfflineFetcher), Config::default());
//! let records: Vec<_> = scraper.run(workflow).try_collect().await?;
//! assert_eq!(records[1]["text"], "Grace");
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! All operations return [`Result<T, Error>`]. Failures raised while
//! processing a page are wrapped in [`Error::Page`], and [`Error::root`] gives
//! the underlying cause:
//!
//! ```rust
//! use pagewalk_core::Error;
//!
//! # fn handle(err: Error) {
//! match err.root() {
//!     Error::Skip(reason) => eprintln!("skipped: {reason}"),
//!     e if e.is_recoverable() => eprintln!("transient failure: {e}"),
//!     e => eprintln!("failed: {e}"),
//! }
//! # }
//! ```

/// Configuration for fetching and for the scrape loop
pub mod config;
/// Error types and result aliases
pub mod error;
/// HTTP and offline fetch clients
pub mod fetcher;
/// Helpers for list pages
pub mod list;
/// The page contract
pub mod page;
/// Built-in HTML and JSON pages
pub mod pages;
/// Pagination chains
pub mod pagination;
/// Page pipeline and dependency resolution
pub mod resolver;
/// Binding raw values to typed records
pub mod schema;
/// The scrape loop
pub mod scrape;
/// Source descriptors and lazily-fetched content
pub mod source;
/// Offline page testing
pub mod testing;

// Re-export commonly used types
pub use config::{CacheMode, Config, FetchOptions, ScrapeConfig};
pub use error::{Error, Result};
pub use fetcher::{DEFAULT_CACHE_CAPACITY, FetchClient, HttpFetcher, OfflineFetcher};
pub use page::{
    Dependencies, Dependency, Page, PageFactory, PageKey, PageResult, PageState, ParseContext,
};
pub use resolver::{Resolver, SourceMode};
pub use schema::{Record, bind};
pub use scrape::{ScrapeRun, ScrapeStats, Scraper, Workflow, run};
pub use source::{Response, Source, SourceHandle, UrlRequest};
