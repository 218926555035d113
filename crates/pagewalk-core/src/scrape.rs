//! The scrape loop.
//!
//! A [`Workflow`] names the seed pages and, optionally, the page type that
//! produces final records. [`Scraper::run`] turns it into a lazy
//! [`ScrapeRun`] stream: nothing is fetched until the stream is polled, and
//! each poll drives the loop only as far as the next record or error.
//!
//! ## Traversal
//!
//! Work is kept in a deque. Traversal is depth-first: child pages and
//! pagination successors are pushed to the front, keeping their relative
//! order, so a listing's detail pages are scraped before the listing's next
//! page.
//!
//! ## Failures
//!
//! A failing seed page (or any page of a seed's pagination chain) ends the run
//! after its error is yielded. Failures of other pages are yielded as `Err`
//! items and the run continues, unless `fail_fast` is configured.
//!
//! ```rust,no_run
//! use futures::TryStreamExt;
//! use pagewalk_core::pages::HtmlListPage;
//! use pagewalk_core::{Config, HttpFetcher, Scraper, Source, Workflow};
//! use std::sync::Arc;
//!
//! # async fn demo() -> pagewalk_core::Result<()> {
//! let config = Config::load()?;
//! let client = Arc::new(HttpFetcher::new(&config.fetch)?);
//! let workflow = Workflow::new()
//!     .with_seed(HtmlListPage::new(Source::url("https://example.com/bills"), "ul.bills a"));
//!
//! let records: Vec<_> = Scraper::new(client, config).run(workflow).try_collect().await?;
//! # Ok(())
//! # }
//! ```

use crate::page::{Page, PageFactory, PageKey, PageResult, PageState};
use crate::pagination::Paginator;
use crate::resolver::Resolver;
use crate::{Config, Error, FetchClient, Result};
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use tracing::{debug, error, info, warn};

/// Seeds plus the optional final-record page type.
#[derive(Debug, Default)]
pub struct Workflow {
    seeds: Vec<Box<dyn Page>>,
    item_page: Option<PageFactory>,
}

impl Workflow {
    /// An empty workflow.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a seed page.
    #[must_use]
    pub fn with_seed(mut self, page: impl Page + 'static) -> Self {
        self.seeds.push(Box::new(page));
        self
    }

    /// Add already boxed seed pages.
    #[must_use]
    pub fn with_seeds(mut self, pages: impl IntoIterator<Item = Box<dyn Page>>) -> Self {
        self.seeds.extend(pages);
        self
    }

    /// Pages built by `factory` produce the records; items of every other
    /// page type become inputs for them.
    #[must_use]
    pub fn with_item_page(mut self, factory: PageFactory) -> Self {
        self.item_page = Some(factory);
        self
    }

    /// Seed pages in order.
    pub fn seeds(&self) -> &[Box<dyn Page>] {
        &self.seeds
    }

    /// Final-record page type, if any.
    pub const fn item_page(&self) -> Option<&PageFactory> {
        self.item_page.as_ref()
    }
}

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScrapeStats {
    /// When the run was first polled.
    pub started_at: Option<DateTime<Utc>>,
    /// When the stream ended.
    pub finished_at: Option<DateTime<Utc>>,
    /// Pages processed.
    pub pages: usize,
    /// Sources loaded.
    pub fetches: usize,
    /// Records yielded.
    pub records: usize,
    /// Pages that produced at least one record.
    pub emitted: usize,
    /// Pages that produced child pages.
    pub expanded: usize,
    /// Pages that were skipped.
    pub skipped: usize,
    /// Pages that failed.
    pub failed: usize,
    /// Whether the run ended early on a fatal failure.
    pub aborted: bool,
}

/// Runs workflows against one fetch client and configuration.
#[derive(Clone)]
pub struct Scraper {
    client: Arc<dyn FetchClient>,
    config: Config,
}

impl Scraper {
    /// Scraper using `client` for URL sources.
    pub fn new(client: Arc<dyn FetchClient>, config: Config) -> Self {
        Self { client, config }
    }

    /// Effective configuration.
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Start a lazy run of `workflow`.
    ///
    /// Every run gets its own dependency memo; dropping the stream cancels any
    /// fetch in flight and releases its connection.
    pub fn run(&self, workflow: Workflow) -> ScrapeRun {
        let stats = Arc::new(Mutex::new(ScrapeStats::default()));
        let resolver = Resolver::new(
            Arc::clone(&self.client),
            self.config.fetch.clone(),
            self.config.scrape.max_connections,
        );
        let queue = workflow
            .seeds
            .into_iter()
            .map(|page| Task {
                page,
                origin: Origin::Seed,
                chain: None,
            })
            .collect();

        let state = LoopState {
            resolver,
            queue,
            item_page: workflow.item_page,
            fail_fast: self.config.scrape.fail_fast,
            max_pages: self.config.scrape.max_pages,
            pending: VecDeque::new(),
            stats: ScrapeStats::default(),
            shared: Arc::clone(&stats),
            done: false,
        };

        let stream = stream::unfold(state, |mut state| async move {
            let next = state.next().await;
            next.map(|item| (item, state))
        })
        .boxed();

        ScrapeRun { stream, stats }
    }
}

impl std::fmt::Debug for Scraper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scraper")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Run `workflow` with `client` and `config`.
pub fn run(workflow: Workflow, client: Arc<dyn FetchClient>, config: Config) -> ScrapeRun {
    Scraper::new(client, config).run(workflow)
}

/// A lazy stream of records from one run.
pub struct ScrapeRun {
    stream: BoxStream<'static, Result<Value>>,
    stats: Arc<Mutex<ScrapeStats>>,
}

impl ScrapeRun {
    /// Snapshot of the run counters so far.
    pub fn stats(&self) -> ScrapeStats {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Stream for ScrapeRun {
    type Item = Result<Value>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().stream.poll_next_unpin(cx)
    }
}

impl std::fmt::Debug for ScrapeRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScrapeRun")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

/// How a page entered the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    /// A workflow seed or a page of a seed's pagination chain.
    Seed,
    /// Produced by another page.
    Child,
}

struct Task {
    page: Box<dyn Page>,
    origin: Origin,
    chain: Option<Paginator>,
}

struct LoopState {
    resolver: Resolver,
    queue: VecDeque<Task>,
    item_page: Option<PageFactory>,
    fail_fast: bool,
    max_pages: Option<usize>,
    pending: VecDeque<Result<Value>>,
    stats: ScrapeStats,
    shared: Arc<Mutex<ScrapeStats>>,
    done: bool,
}

impl LoopState {
    async fn next(&mut self) -> Option<Result<Value>> {
        if self.stats.started_at.is_none() {
            self.stats.started_at = Some(Utc::now());
            info!(seeds = self.queue.len(), "scrape started");
        }
        loop {
            if let Some(output) = self.pending.pop_front() {
                if output.is_ok() {
                    self.stats.records += 1;
                }
                self.publish();
                return Some(output);
            }
            if self.done {
                self.finish();
                return None;
            }
            match self.queue.pop_front() {
                Some(task) => self.step(task).await,
                None => self.done = true,
            }
        }
    }

    async fn step(&mut self, task: Task) {
        self.stats.pages += 1;
        let outcome = self.resolver.process(task.page.as_ref()).await;
        self.stats.fetches = self.resolver.fetches();
        match outcome {
            Ok(result) => self.dispatch(task, result),
            Err(err) if err.is_skip() => {
                self.skipped(task.page.as_ref(), &err.root().to_string());
            },
            Err(err) => self.fail(task.origin, err),
        }
        self.publish();
    }

    fn dispatch(&mut self, task: Task, result: PageResult) {
        match result {
            PageResult::Item(value) => self.emit(task.page.as_ref(), vec![value]),
            PageResult::Items(values) => self.emit(task.page.as_ref(), values),
            PageResult::NextPage { items, next } => {
                let mut chain = task
                    .chain
                    .unwrap_or_else(|| Paginator::start(task.page.as_ref(), self.max_pages));
                match chain.advance(next) {
                    Ok(Some(next)) => {
                        self.queue.push_front(Task {
                            page: next,
                            origin: task.origin,
                            chain: Some(chain),
                        });
                        self.emit(task.page.as_ref(), items);
                    },
                    Ok(None) => self.emit(task.page.as_ref(), items),
                    Err(err) => {
                        self.emit(task.page.as_ref(), items);
                        let key = PageKey::of(task.page.as_ref());
                        self.fail(
                            task.origin,
                            Error::Page {
                                kind: key.kind,
                                input: key.input,
                                source: Box::new(err),
                            },
                        );
                    },
                }
            },
            PageResult::SubPages(pages) => {
                self.expanded(task.page.as_ref(), pages.len());
                for page in pages.into_iter().rev() {
                    self.queue.push_front(Task {
                        page,
                        origin: Origin::Child,
                        chain: None,
                    });
                }
            },
            PageResult::Skip(reason) => self.skipped(task.page.as_ref(), &reason),
        }
    }

    fn emit(&mut self, page: &dyn Page, items: Vec<Value>) {
        match self.item_page.clone() {
            Some(factory) if factory.kind() != page.kind() => {
                self.expanded(page, items.len());
                for input in items.into_iter().rev() {
                    self.queue.push_front(Task {
                        page: factory.build(input),
                        origin: Origin::Child,
                        chain: None,
                    });
                }
            },
            _ => {
                if !items.is_empty() {
                    self.stats.emitted += 1;
                }
                debug!(page = page.kind(), records = items.len(), state = ?PageState::Emitted);
                self.pending.extend(items.into_iter().map(Ok));
            },
        }
    }

    fn expanded(&mut self, page: &dyn Page, children: usize) {
        self.stats.expanded += 1;
        debug!(page = page.kind(), children, state = ?PageState::Expanded);
    }

    fn skipped(&mut self, page: &dyn Page, reason: &str) {
        self.stats.skipped += 1;
        debug!(page = page.kind(), input = %page.input(), reason, state = ?PageState::Skipped);
    }

    fn fail(&mut self, origin: Origin, err: Error) {
        self.stats.failed += 1;
        if origin == Origin::Seed || self.fail_fast {
            error!(error = %err, category = err.category(), "scrape aborted");
            self.stats.aborted = true;
            self.queue.clear();
            self.done = true;
        } else {
            warn!(error = %err, category = err.category(), "page failed");
        }
        self.pending.push_back(Err(err));
    }

    fn publish(&self) {
        let mut shared = self.shared.lock().unwrap_or_else(PoisonError::into_inner);
        *shared = self.stats.clone();
    }

    fn finish(&mut self) {
        self.stats.finished_at = Some(Utc::now());
        self.publish();
        info!(
            pages = self.stats.pages,
            fetches = self.stats.fetches,
            records = self.stats.records,
            skipped = self.stats.skipped,
            failed = self.stats.failed,
            aborted = self.stats.aborted,
            "scrape finished"
        );
    }
}
