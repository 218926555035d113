//! Offline page testing.
//!
//! [`test_page`] runs one page against its example source, with dependencies
//! resolved the same way, through a fetch client that refuses every network
//! request. A page whose example is a URL therefore fails with
//! [`Error::Offline`](crate::Error::Offline) instead of touching the network.
//!
//! ```rust
//! use pagewalk_core::pages::JsonListPage;
//! use pagewalk_core::testing::test_page;
//! use pagewalk_core::{PageResult, Source};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> pagewalk_core::Result<()> {
//! let page = JsonListPage::new(Source::url("https://example.com/api/bills"))
//!     .with_example(Source::inline(r#"[{"id": 1}, {"id": 2}]"#));
//! let result = test_page(&page).await?;
//! assert!(matches!(result, PageResult::Items(items) if items.len() == 2));
//! # Ok(())
//! # }
//! ```

use crate::page::{Page, PageFactory, PageResult};
use crate::resolver::{Resolver, SourceMode};
use crate::{FetchOptions, OfflineFetcher, Result};
use std::sync::Arc;

/// Run `page` once, offline, from its example source.
pub async fn test_page(page: &dyn Page) -> Result<PageResult> {
    let resolver = Resolver::new(Arc::new(OfflineFetcher), FetchOptions::default(), 1)
        .with_source_mode(SourceMode::Example);
    resolver.process(page).await
}

/// Build a page from the factory's example input and test it offline.
pub async fn test_factory(factory: &PageFactory) -> Result<PageResult> {
    let page = factory.example();
    test_page(page.as_ref()).await
}
