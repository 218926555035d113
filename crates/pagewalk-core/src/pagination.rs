//! Pagination chains.
//!
//! A page answering [`PageResult::NextPage`](crate::PageResult::NextPage) starts
//! a chain. The [`Paginator`] travels with the chain from page to page and
//! decides whether each successor may run: a successor identical to a page
//! already seen in the chain is a [`Error::PaginationCycle`], and a chain that
//! reaches `max_pages` ends early.

use crate::page::{Page, PageKey};
use crate::{Error, Result};
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, warn};

/// Identity of a page within a chain: type, input and source locator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ChainKey {
    page: PageKey,
    locator: String,
}

impl ChainKey {
    fn of(page: &dyn Page) -> Self {
        Self {
            page: PageKey::of(page),
            locator: page.source().map(|s| s.locator()).unwrap_or_default(),
        }
    }
}

impl fmt::Display for ChainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.locator.is_empty() {
            write!(f, "{}", self.page)
        } else {
            write!(f, "{} at {}", self.page, self.locator)
        }
    }
}

/// State of one pagination chain.
#[derive(Debug, Clone)]
pub struct Paginator {
    seen: HashSet<ChainKey>,
    pages: usize,
    max_pages: Option<usize>,
}

impl Paginator {
    /// Start a chain at `first`.
    pub fn start(first: &dyn Page, max_pages: Option<usize>) -> Self {
        let mut seen = HashSet::new();
        seen.insert(ChainKey::of(first));
        Self {
            seen,
            pages: 1,
            max_pages,
        }
    }

    /// Number of pages accepted into the chain so far.
    pub const fn pages(&self) -> usize {
        self.pages
    }

    /// Accept `next` as the following page of the chain.
    ///
    /// Returns `Ok(None)` when the chain hit its page limit and must stop.
    pub fn advance(&mut self, next: Box<dyn Page>) -> Result<Option<Box<dyn Page>>> {
        let key = ChainKey::of(next.as_ref());
        if self.seen.contains(&key) {
            return Err(Error::PaginationCycle {
                page: key.to_string(),
            });
        }
        if let Some(limit) = self.max_pages {
            if self.pages >= limit {
                warn!(page = %key, limit, "pagination limit reached, not following next page");
                return Ok(None);
            }
        }
        debug!(page = %key, number = self.pages + 1, "following next page");
        self.seen.insert(key);
        self.pages += 1;
        Ok(Some(next))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{PageResult, ParseContext, Source};
    use async_trait::async_trait;
    use serde_json::{Value, json};

    #[derive(Debug)]
    struct Numbered(u32);

    #[async_trait]
    impl Page for Numbered {
        fn input(&self) -> Value {
            json!(self.0)
        }

        fn source(&self) -> Result<Source> {
            Ok(Source::url(format!("https://example.com/?page={}", self.0)))
        }

        async fn parse(&self, _ctx: &ParseContext<'_>) -> Result<PageResult> {
            Ok(PageResult::Items(Vec::new()))
        }
    }

    #[test]
    fn test_distinct_successors_are_followed() {
        let mut chain = Paginator::start(&Numbered(1), None);
        for n in 2..=5 {
            let next = chain.advance(Box::new(Numbered(n))).unwrap();
            assert_eq!(next.unwrap().input(), json!(n));
        }
        assert_eq!(chain.pages(), 5);
    }

    #[test]
    fn test_repeated_successor_is_a_cycle() {
        let mut chain = Paginator::start(&Numbered(1), None);
        assert!(chain.advance(Box::new(Numbered(2))).unwrap().is_some());
        let err = chain.advance(Box::new(Numbered(1))).unwrap_err();
        assert!(
            matches!(&err, Error::PaginationCycle { page } if page.contains("page=1")),
            "{err}"
        );
    }

    #[test]
    fn test_limit_stops_chain() {
        let mut chain = Paginator::start(&Numbered(1), Some(2));
        assert!(chain.advance(Box::new(Numbered(2))).unwrap().is_some());
        assert!(chain.advance(Box::new(Numbered(3))).unwrap().is_none());
        assert_eq!(chain.pages(), 2);
    }
}
