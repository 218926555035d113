//! The page contract.
//!
//! A [`Page`] is one fetch-and-parse step. It knows how to derive its
//! [`Source`] from its input and how to turn the fetched [`Response`] plus its
//! resolved dependencies into a [`PageResult`].
//!
//! ```rust
//! use async_trait::async_trait;
//! use pagewalk_core::{Page, PageResult, ParseContext, Result, Source};
//! use serde_json::{Value, json};
//!
//! #[derive(Debug)]
//! struct Headline {
//!     url: String,
//! }
//!
//! #[async_trait]
//! impl Page for Headline {
//!     fn input(&self) -> Value {
//!         json!(self.url)
//!     }
//!
//!     fn source(&self) -> Result<Source> {
//!         Ok(Source::url(&self.url))
//!     }
//!
//!     async fn parse(&self, ctx: &ParseContext<'_>) -> Result<PageResult> {
//!         let title = ctx.response.text()?.lines().next().unwrap_or_default();
//!         Ok(PageResult::Item(json!({ "title": title })))
//!     }
//! }
//! ```

use crate::schema::{Record, bind};
use crate::{Error, Response, Result, Source};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// One fetch-and-parse unit of work.
#[async_trait]
pub trait Page: Send + Sync + fmt::Debug {
    /// Page type identity, used for memoization keys and diagnostics.
    fn kind(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// The structured input this page was created with.
    fn input(&self) -> Value {
        Value::Null
    }

    /// Where this page's content lives, derived from its input.
    fn source(&self) -> Result<Source> {
        Err(Error::MissingSource(format!(
            "{} has no source and cannot derive one from its input",
            self.kind()
        )))
    }

    /// Content to parse instead of [`Page::source`] when testing this page in isolation.
    fn example_source(&self) -> Option<Source> {
        None
    }

    /// Named pages whose items must be resolved before this page parses.
    fn dependencies(&self) -> Vec<Dependency> {
        Vec::new()
    }

    /// Decide what a failed fetch means for this page, for example turn a 404
    /// into a skip. Dependencies are not resolved and `parse` does not run.
    fn on_fetch_error(&self, err: Error) -> Result<PageResult> {
        Err(err)
    }

    /// Turn fetched content and resolved dependencies into a result.
    ///
    /// Return `Err(Error::skip(..))` or `Ok(PageResult::Skip(..))` to drop this
    /// page without failing the scrape.
    async fn parse(&self, ctx: &ParseContext<'_>) -> Result<PageResult>;
}

/// What a page produced.
#[derive(Debug)]
pub enum PageResult {
    /// A single record.
    Item(Value),
    /// Many homogeneous records, in page order.
    Items(Vec<Value>),
    /// Records from this page plus the page that continues the listing.
    NextPage {
        /// Records found on this page.
        items: Vec<Value>,
        /// Successor page, processed right after this one.
        next: Box<dyn Page>,
    },
    /// Child pages to scrape, in order.
    SubPages(Vec<Box<dyn Page>>),
    /// Deliberately contributes nothing.
    Skip(String),
}

impl PageResult {
    /// Continue pagination with `next` after emitting `items`.
    pub fn next_page(items: Vec<Value>, next: impl Page + 'static) -> Self {
        Self::NextPage {
            items,
            next: Box::new(next),
        }
    }

    /// Expand into child pages.
    pub fn sub_pages<I, P>(pages: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Page + 'static,
    {
        Self::SubPages(
            pages
                .into_iter()
                .map(|page| Box::new(page) as Box<dyn Page>)
                .collect(),
        )
    }

    /// Short tag for logs.
    #[must_use]
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::Item(_) => "item",
            Self::Items(_) => "items",
            Self::NextPage { .. } => "next_page",
            Self::SubPages(_) => "sub_pages",
            Self::Skip(_) => "skip",
        }
    }
}

/// A named dependency of a page.
#[derive(Debug)]
pub struct Dependency {
    /// Name the resolved value is available under.
    pub name: String,
    /// Page producing the value; it must resolve to exactly one item.
    pub page: Box<dyn Page>,
}

impl Dependency {
    /// Declare `page` as dependency `name`.
    pub fn new(name: impl Into<String>, page: impl Page + 'static) -> Self {
        Self {
            name: name.into(),
            page: Box::new(page),
        }
    }

    /// Declare a dependency built by `factory` from `input`.
    pub fn from_factory(name: impl Into<String>, factory: &PageFactory, input: Value) -> Self {
        Self {
            name: name.into(),
            page: factory.build(input),
        }
    }
}

/// Resolved dependency values by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dependencies {
    values: BTreeMap<String, Value>,
}

impl Dependencies {
    pub(crate) fn insert(&mut self, name: String, value: Value) {
        self.values.insert(name, value);
    }

    /// Raw value of dependency `name`.
    pub fn get(&self, name: &str) -> Result<&Value> {
        self.values.get(name).ok_or_else(|| Error::InvalidDependency {
            name: name.to_string(),
            reason: "not declared".to_string(),
        })
    }

    /// Value of dependency `name` bound to a record type.
    pub fn bind<T: Record>(&self, name: &str) -> Result<T> {
        bind(self.get(name)?.clone())
    }

    /// Number of resolved dependencies.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no dependencies were declared.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Everything a page sees while parsing.
#[derive(Debug)]
pub struct ParseContext<'a> {
    /// The page's input.
    pub input: &'a Value,
    /// Descriptor the content came from.
    pub source: &'a Source,
    /// Fetched content.
    pub response: &'a Response,
    /// Resolved dependency values.
    pub dependencies: &'a Dependencies,
}

impl ParseContext<'_> {
    /// URL that relative links on this page resolve against.
    pub fn base_url(&self) -> Option<&str> {
        self.response.url.as_deref().or_else(|| self.source.base_url())
    }
}

/// Type identity plus canonical input: the memoization and cycle-detection key.
///
/// `serde_json` object keys are kept sorted, so equal inputs always produce the
/// same canonical text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageKey {
    /// Page type identity.
    pub kind: &'static str,
    /// Canonical JSON form of the input.
    pub input: String,
}

impl PageKey {
    /// Key of a page.
    pub fn of(page: &dyn Page) -> Self {
        Self {
            kind: page.kind(),
            input: page.input().to_string(),
        }
    }
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind, self.input)
    }
}

/// Lifecycle of one page inside the scrape loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    /// Queued, nothing done yet.
    Created,
    /// Source content is being fetched.
    Fetching,
    /// Dependencies are being resolved.
    ResolvingDependencies,
    /// The parse step is running.
    Parsing,
    /// Produced records.
    Emitted,
    /// Produced child pages.
    Expanded,
    /// Deliberately contributed nothing.
    Skipped,
    /// Failed with an error.
    Failed,
}

type Builder = dyn Fn(Value) -> Box<dyn Page> + Send + Sync;

/// Builds pages of one type from an input value.
#[derive(Clone)]
pub struct PageFactory {
    kind: &'static str,
    build: Arc<Builder>,
    example_input: Option<Value>,
}

impl PageFactory {
    /// Factory for pages reporting `kind` from [`Page::kind`].
    pub fn new<F, P>(kind: &'static str, build: F) -> Self
    where
        F: Fn(Value) -> P + Send + Sync + 'static,
        P: Page + 'static,
    {
        Self {
            kind,
            build: Arc::new(move |input| Box::new(build(input)) as Box<dyn Page>),
            example_input: None,
        }
    }

    /// Factory for a page type that keeps the default [`Page::kind`].
    pub fn of<P, F>(build: F) -> Self
    where
        F: Fn(Value) -> P + Send + Sync + 'static,
        P: Page + 'static,
    {
        Self::new(std::any::type_name::<P>(), build)
    }

    /// Input used when testing this page type in isolation.
    #[must_use]
    pub fn with_example_input(mut self, input: Value) -> Self {
        self.example_input = Some(input);
        self
    }

    /// Page type identity of the built pages.
    pub const fn kind(&self) -> &'static str {
        self.kind
    }

    /// Example input, when one was set.
    pub const fn example_input(&self) -> Option<&Value> {
        self.example_input.as_ref()
    }

    /// Build a page from `input`.
    pub fn build(&self, input: Value) -> Box<dyn Page> {
        (self.build)(input)
    }

    /// Build a page from the example input (`null` when none was set).
    pub fn example(&self) -> Box<dyn Page> {
        self.build(self.example_input.clone().unwrap_or(Value::Null))
    }
}

impl fmt::Debug for PageFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageFactory")
            .field("kind", &self.kind)
            .field("example_input", &self.example_input)
            .finish_non_exhaustive()
    }
}
