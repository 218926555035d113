//! Page pipeline and dependency resolution.
//!
//! [`Resolver::process`] runs one page through fetch, dependency resolution and
//! parse. Dependencies go through the same pipeline recursively and must
//! produce a single item. Dependency outcomes (value, skip or failure) are
//! memoized per [`PageKey`] for the lifetime of the resolver, which is one
//! scrape run, so a dependency is parsed at most once per run.

use crate::page::{Dependencies, Dependency, Page, PageKey, PageResult, PageState, ParseContext};
use crate::{Error, FetchClient, FetchOptions, Result, Source, SourceHandle};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{OnceCell, Semaphore};
use tracing::debug;

/// Which source a page is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceMode {
    /// [`Page::source`], the normal scraping path.
    #[default]
    Live,
    /// [`Page::example_source`] where a page has one, [`Page::source`] otherwise.
    Example,
}

/// What a dependency resolved to.
#[derive(Debug, Clone)]
enum Resolution {
    Item(Value),
    Skipped(String),
    Failed(Arc<Error>),
}

type Memo = HashMap<PageKey, Arc<OnceCell<Resolution>>>;

/// Runs pages and resolves their dependencies, memoizing dependency values.
pub struct Resolver {
    client: Arc<dyn FetchClient>,
    options: FetchOptions,
    connections: Semaphore,
    mode: SourceMode,
    memo: Mutex<Memo>,
    fetches: AtomicUsize,
    parses: AtomicUsize,
}

impl Resolver {
    /// Resolver fetching through `client` with at most `max_connections`
    /// fetches in flight.
    pub fn new(client: Arc<dyn FetchClient>, options: FetchOptions, max_connections: usize) -> Self {
        Self {
            client,
            options,
            connections: Semaphore::new(max_connections.max(1)),
            mode: SourceMode::Live,
            memo: Mutex::new(HashMap::new()),
            fetches: AtomicUsize::new(0),
            parses: AtomicUsize::new(0),
        }
    }

    /// Read pages from their example sources instead.
    #[must_use]
    pub const fn with_source_mode(mut self, mode: SourceMode) -> Self {
        self.mode = mode;
        self
    }

    /// Number of sources loaded so far.
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }

    /// Number of parse steps run so far.
    pub fn parses(&self) -> usize {
        self.parses.load(Ordering::Relaxed)
    }

    /// Number of distinct dependency pages resolved or in flight.
    pub fn memoized(&self) -> usize {
        self.memo.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Fetch, resolve dependencies, then parse `page`.
    ///
    /// Failures are wrapped in [`Error::Page`] naming the page that raised them.
    pub async fn process(&self, page: &dyn Page) -> Result<PageResult> {
        self.process_at(page, &[]).await
    }

    /// Resolve the declared dependencies of `page` without parsing it.
    pub async fn resolve_dependencies(&self, page: &dyn Page) -> Result<Dependencies> {
        let path = [PageKey::of(page)];
        self.resolve_at(page, &path).await
    }

    fn process_at<'a>(
        &'a self,
        page: &'a dyn Page,
        parents: &'a [PageKey],
    ) -> BoxFuture<'a, Result<PageResult>> {
        async move {
            let key = PageKey::of(page);
            self.pipeline(page, &key, parents)
                .await
                .map_err(|source| {
                    let state = if source.is_skip() {
                        PageState::Skipped
                    } else {
                        PageState::Failed
                    };
                    debug!(page = key.kind, input = %key.input, state = ?state, "page finished");
                    Error::Page {
                        kind: key.kind,
                        input: key.input.clone(),
                        source: Box::new(source),
                    }
                })
        }
        .boxed()
    }

    async fn pipeline(
        &self,
        page: &dyn Page,
        key: &PageKey,
        parents: &[PageKey],
    ) -> Result<PageResult> {
        let handle = SourceHandle::new(self.source_of(page)?);
        debug!(page = key.kind, input = %key.input, source = %handle.source(), state = ?PageState::Fetching);
        let response = match handle
            .content(self.client.as_ref(), &self.options, &self.connections)
            .await
        {
            Ok(response) => response,
            Err(err) => {
                debug!(page = key.kind, input = %key.input, error = %err, "fetch failed");
                return page.on_fetch_error(err);
            },
        };
        self.fetches.fetch_add(1, Ordering::Relaxed);

        let mut path = parents.to_vec();
        path.push(key.clone());
        debug!(page = key.kind, input = %key.input, state = ?PageState::ResolvingDependencies);
        let dependencies = self.resolve_at(page, &path).await?;

        debug!(page = key.kind, input = %key.input, state = ?PageState::Parsing);
        let input = page.input();
        let ctx = ParseContext {
            input: &input,
            source: handle.source(),
            response,
            dependencies: &dependencies,
        };
        self.parses.fetch_add(1, Ordering::Relaxed);
        page.parse(&ctx).await
    }

    fn source_of(&self, page: &dyn Page) -> Result<Source> {
        match self.mode {
            SourceMode::Live => page.source(),
            SourceMode::Example => page.example_source().map_or_else(|| page.source(), Ok),
        }
    }

    async fn resolve_at(&self, page: &dyn Page, path: &[PageKey]) -> Result<Dependencies> {
        let mut resolved = Dependencies::default();
        for dependency in page.dependencies() {
            let key = PageKey::of(dependency.page.as_ref());
            if path.contains(&key) {
                let chain = path
                    .iter()
                    .chain(std::iter::once(&key))
                    .map(ToString::to_string)
                    .collect();
                return Err(Error::CyclicDependency { chain });
            }

            let cell = {
                let mut memo = self.memo.lock().unwrap_or_else(PoisonError::into_inner);
                Arc::clone(memo.entry(key.clone()).or_default())
            };
            if cell.initialized() {
                debug!(dependency = %dependency.name, page = key.kind, input = %key.input, "memoized");
            }
            let resolution = cell
                .get_or_init(|| self.resolve_one(&dependency, path))
                .await
                .clone();

            match resolution {
                Resolution::Item(value) => resolved.insert(dependency.name, value),
                Resolution::Skipped(reason) => {
                    return Err(Error::skip(format!(
                        "dependency '{}' skipped: {reason}",
                        dependency.name
                    )));
                },
                Resolution::Failed(err) => return Err(Error::Shared(err)),
            }
        }
        Ok(resolved)
    }

    async fn resolve_one(&self, dependency: &Dependency, path: &[PageKey]) -> Resolution {
        match self.process_at(dependency.page.as_ref(), path).await {
            Ok(PageResult::Item(value)) => Resolution::Item(value),
            Ok(PageResult::Skip(reason)) => Resolution::Skipped(reason),
            Ok(other) => Resolution::Failed(Arc::new(Error::InvalidDependency {
                name: dependency.name.clone(),
                reason: format!("expected a single item, got {}", other.tag()),
            })),
            Err(err) => match err.root() {
                Error::Skip(reason) => Resolution::Skipped(reason.clone()),
                _ => Resolution::Failed(Arc::new(err)),
            },
        }
    }
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("options", &self.options)
            .field("mode", &self.mode)
            .field("fetches", &self.fetches())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::OfflineFetcher;
    use async_trait::async_trait;
    use serde_json::json;

    fn resolver() -> Resolver {
        Resolver::new(Arc::new(OfflineFetcher), FetchOptions::default(), 2)
    }

    /// Returns its input as an item, counting parses.
    #[derive(Debug, Clone)]
    struct Echo {
        input: Value,
        parses: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Page for Echo {
        fn input(&self) -> Value {
            self.input.clone()
        }

        fn source(&self) -> Result<Source> {
            Ok(Source::inline(self.input.to_string()))
        }

        async fn parse(&self, ctx: &ParseContext<'_>) -> Result<PageResult> {
            self.parses.fetch_add(1, Ordering::SeqCst);
            Ok(PageResult::Item(ctx.response.json()?))
        }
    }

    /// Sums the values of its dependencies.
    #[derive(Debug)]
    struct Sum {
        deps: Vec<(String, Echo)>,
    }

    #[async_trait]
    impl Page for Sum {
        fn source(&self) -> Result<Source> {
            Ok(Source::inline(""))
        }

        fn dependencies(&self) -> Vec<Dependency> {
            self.deps
                .iter()
                .map(|(name, page)| Dependency::new(name.clone(), page.clone()))
                .collect()
        }

        async fn parse(&self, ctx: &ParseContext<'_>) -> Result<PageResult> {
            let mut total = 0;
            for (name, _) in &self.deps {
                total += ctx.dependencies.bind::<i64>(name)?;
            }
            Ok(PageResult::Item(json!(total)))
        }
    }

    #[tokio::test]
    async fn test_dependencies_resolve_before_parse() -> Result<()> {
        let parses = Arc::new(AtomicUsize::new(0));
        let echo = |n: i64| Echo {
            input: json!(n),
            parses: Arc::clone(&parses),
        };
        let page = Sum {
            deps: vec![("a".into(), echo(2)), ("b".into(), echo(5))],
        };
        let resolver = resolver();
        let result = resolver.process(&page).await?;
        assert!(matches!(result, PageResult::Item(v) if v == json!(7)));
        assert_eq!(parses.load(Ordering::SeqCst), 2);
        assert_eq!(resolver.parses(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_equal_dependencies_parse_once() -> Result<()> {
        let parses = Arc::new(AtomicUsize::new(0));
        let shared = Echo {
            input: json!(4),
            parses: Arc::clone(&parses),
        };
        let resolver = resolver();
        for _ in 0..3 {
            let page = Sum {
                deps: vec![("x".into(), shared.clone()), ("y".into(), shared.clone())],
            };
            let result = resolver.process(&page).await?;
            assert!(matches!(result, PageResult::Item(v) if v == json!(8)));
        }
        assert_eq!(parses.load(Ordering::SeqCst), 1);
        assert_eq!(resolver.memoized(), 1);
        Ok(())
    }

    #[derive(Debug)]
    struct Loop {
        name: &'static str,
        next: &'static str,
    }

    #[async_trait]
    impl Page for Loop {
        fn kind(&self) -> &'static str {
            self.name
        }

        fn input(&self) -> Value {
            json!("same")
        }

        fn source(&self) -> Result<Source> {
            Ok(Source::inline("{}"))
        }

        fn dependencies(&self) -> Vec<Dependency> {
            vec![Dependency::new(
                "next",
                Loop {
                    name: self.next,
                    next: self.name,
                },
            )]
        }

        async fn parse(&self, _ctx: &ParseContext<'_>) -> Result<PageResult> {
            Ok(PageResult::Item(Value::Null))
        }
    }

    #[tokio::test]
    async fn test_cycle_detected_with_chain() {
        let err = resolver()
            .process(&Loop { name: "a", next: "b" })
            .await
            .unwrap_err();
        match err.root() {
            Error::CyclicDependency { chain } => {
                assert_eq!(chain, &["a(\"same\")", "b(\"same\")", "a(\"same\")"]);
            },
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[derive(Debug)]
    struct Fixed(fn() -> Result<PageResult>);

    #[async_trait]
    impl Page for Fixed {
        fn source(&self) -> Result<Source> {
            Ok(Source::inline(""))
        }

        async fn parse(&self, _ctx: &ParseContext<'_>) -> Result<PageResult> {
            (self.0)()
        }
    }

    #[derive(Debug)]
    struct Needs(fn() -> Result<PageResult>);

    #[async_trait]
    impl Page for Needs {
        fn source(&self) -> Result<Source> {
            Ok(Source::inline(""))
        }

        fn dependencies(&self) -> Vec<Dependency> {
            vec![Dependency::new("dep", Fixed(self.0))]
        }

        async fn parse(&self, _ctx: &ParseContext<'_>) -> Result<PageResult> {
            panic!("parse must not run when a dependency does not resolve");
        }
    }

    #[tokio::test]
    async fn test_skipping_dependency_skips_dependent() {
        let err = resolver()
            .process(&Needs(|| Err(Error::skip("no data"))))
            .await
            .unwrap_err();
        assert!(err.is_skip());

        let err = resolver()
            .process(&Needs(|| Ok(PageResult::Skip("empty".into()))))
            .await
            .unwrap_err();
        assert!(matches!(err.root(), Error::Skip(msg) if msg.contains("empty")));
    }

    #[tokio::test]
    async fn test_multi_item_dependency_is_invalid() {
        let err = resolver()
            .process(&Needs(|| Ok(PageResult::Items(vec![json!(1), json!(2)]))))
            .await
            .unwrap_err();
        assert!(matches!(
            err.root(),
            Error::InvalidDependency { name, reason } if name == "dep" && reason.contains("items")
        ));
    }

    #[tokio::test]
    async fn test_failing_dependency_aborts_dependent() {
        let err = resolver()
            .process(&Needs(|| Err(Error::Parse("broken".into()))))
            .await
            .unwrap_err();
        assert_eq!(err.category(), "parse");
        assert!(err.to_string().contains("Needs"));
    }

    #[derive(Debug)]
    struct Remote;

    #[async_trait]
    impl Page for Remote {
        fn source(&self) -> Result<Source> {
            Ok(Source::url("https://example.com/list"))
        }

        fn example_source(&self) -> Option<Source> {
            Some(Source::inline("[]"))
        }

        async fn parse(&self, ctx: &ParseContext<'_>) -> Result<PageResult> {
            Ok(PageResult::Items(ctx.response.json()?))
        }
    }

    #[tokio::test]
    async fn test_source_modes() {
        let live = resolver().process(&Remote).await.unwrap_err();
        assert!(matches!(live.root(), Error::Offline(_)));

        let example = resolver()
            .with_source_mode(SourceMode::Example)
            .process(&Remote)
            .await
            .unwrap();
        assert!(matches!(example, PageResult::Items(items) if items.is_empty()));
    }

    /// Rejects its content, counting parses.
    #[derive(Debug, Clone)]
    struct Rejecting {
        parses: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Page for Rejecting {
        fn input(&self) -> Value {
            json!("session")
        }

        fn source(&self) -> Result<Source> {
            Ok(Source::inline("{}"))
        }

        async fn parse(&self, _ctx: &ParseContext<'_>) -> Result<PageResult> {
            self.parses.fetch_add(1, Ordering::SeqCst);
            Err(Error::Validation("session has no year".into()))
        }
    }

    #[derive(Debug)]
    struct NeedsRejecting {
        id: u32,
        dep: Rejecting,
    }

    #[async_trait]
    impl Page for NeedsRejecting {
        fn input(&self) -> Value {
            json!(self.id)
        }

        fn source(&self) -> Result<Source> {
            Ok(Source::inline(""))
        }

        fn dependencies(&self) -> Vec<Dependency> {
            vec![Dependency::new("session", self.dep.clone())]
        }

        async fn parse(&self, _ctx: &ParseContext<'_>) -> Result<PageResult> {
            panic!("parse must not run when a dependency fails");
        }
    }

    #[tokio::test]
    async fn test_failed_dependency_is_parsed_once() {
        let parses = Arc::new(AtomicUsize::new(0));
        let dep = Rejecting {
            parses: Arc::clone(&parses),
        };
        let resolver = resolver();

        for id in 0..3 {
            let err = resolver
                .process(&NeedsRejecting {
                    id,
                    dep: dep.clone(),
                })
                .await
                .unwrap_err();
            assert!(matches!(err.root(), Error::Validation(msg) if msg.contains("no year")));
            assert_eq!(err.category(), "validation");
        }
        assert_eq!(parses.load(Ordering::SeqCst), 1);
        assert_eq!(resolver.memoized(), 1);
    }

    /// Yields to the scheduler before producing its item.
    #[derive(Debug, Clone)]
    struct Slow {
        parses: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Page for Slow {
        fn input(&self) -> Value {
            json!("slow")
        }

        fn source(&self) -> Result<Source> {
            Ok(Source::inline("41"))
        }

        async fn parse(&self, ctx: &ParseContext<'_>) -> Result<PageResult> {
            self.parses.fetch_add(1, Ordering::SeqCst);
            for _ in 0..3 {
                tokio::task::yield_now().await;
            }
            let n: i64 = ctx.response.json()?;
            Ok(PageResult::Item(json!(n + 1)))
        }
    }

    #[derive(Debug)]
    struct NeedsSlow {
        id: u32,
        dep: Slow,
    }

    #[async_trait]
    impl Page for NeedsSlow {
        fn input(&self) -> Value {
            json!(self.id)
        }

        fn source(&self) -> Result<Source> {
            Ok(Source::inline(""))
        }

        fn dependencies(&self) -> Vec<Dependency> {
            vec![Dependency::new("slow", self.dep.clone())]
        }

        async fn parse(&self, ctx: &ParseContext<'_>) -> Result<PageResult> {
            Ok(PageResult::Item(ctx.dependencies.get("slow")?.clone()))
        }
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_resolution() -> Result<()> {
        let parses = Arc::new(AtomicUsize::new(0));
        let dep = Slow {
            parses: Arc::clone(&parses),
        };
        let resolver = resolver();
        let first = NeedsSlow {
            id: 1,
            dep: dep.clone(),
        };
        let second = NeedsSlow { id: 2, dep };

        let (a, b) = tokio::join!(resolver.process(&first), resolver.process(&second));
        let (PageResult::Item(a), PageResult::Item(b)) = (a?, b?) else {
            panic!("expected two items");
        };
        assert_eq!(a, json!(42));
        assert_eq!(a, b);
        assert_eq!(parses.load(Ordering::SeqCst), 1);
        Ok(())
    }

    /// Treats a missing page as nothing to scrape.
    #[derive(Debug)]
    struct Optional {
        url: String,
    }

    #[async_trait]
    impl Page for Optional {
        fn input(&self) -> Value {
            json!(self.url)
        }

        fn source(&self) -> Result<Source> {
            Ok(Source::url(&self.url))
        }

        fn on_fetch_error(&self, err: Error) -> Result<PageResult> {
            match err.root() {
                Error::Http { status: 404, .. } => Ok(PageResult::Skip("page was removed".into())),
                _ => Err(err),
            }
        }

        async fn parse(&self, ctx: &ParseContext<'_>) -> Result<PageResult> {
            Ok(PageResult::Item(json!(ctx.response.text()?)))
        }
    }

    #[tokio::test]
    async fn test_fetch_error_hook_turns_not_found_into_skip() -> Result<()> {
        use crate::HttpFetcher;
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let options = FetchOptions {
            retry_wait_ms: 1,
            ..FetchOptions::default()
        };
        let resolver = Resolver::new(Arc::new(HttpFetcher::new(&options)?), options, 2);

        let gone = resolver
            .process(&Optional {
                url: format!("{}/gone", server.uri()),
            })
            .await?;
        assert!(matches!(gone, PageResult::Skip(reason) if reason == "page was removed"));

        let broken = resolver
            .process(&Optional {
                url: format!("{}/broken", server.uri()),
            })
            .await
            .unwrap_err();
        assert!(matches!(broken.root(), Error::Http { status: 400, .. }));
        assert_eq!(resolver.fetches(), 0);
        Ok(())
    }
}
