//! View-count service: cache, throttle and provider access behind one object.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, histogram};
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cache::ViewCache;
use crate::domain::error::DomainError;
use crate::domain::route::RoutePath;
use crate::domain::views::{CountOrigin, HelloWorldFixture, ViewCountEntry, fallback_view_count};

use super::clock::{Clock, SystemClock};
use super::provider::{ProviderError, ViewsProvider};

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_MIN_REQUEST_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(5);

pub(crate) const METRIC_PROVIDER_FAILURE: &str = "folio_views_provider_failure_total";
pub(crate) const METRIC_BATCH_FAILURE: &str = "folio_views_batch_failure_total";
pub(crate) const METRIC_PROVIDER_REQUEST_MS: &str = "folio_views_provider_request_ms";
pub(crate) const METRIC_THROTTLE_WAIT_MS: &str = "folio_views_throttle_wait_ms";

const TARGET: &str = "folio_views::views";

#[derive(Debug, Clone)]
pub struct ViewsConfig {
    pub cache_ttl: Duration,
    pub min_request_delay: Duration,
    pub provider_timeout: Duration,
    pub hello_world_fixture: HelloWorldFixture,
}

impl Default for ViewsConfig {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_CACHE_TTL,
            min_request_delay: DEFAULT_MIN_REQUEST_DELAY,
            provider_timeout: DEFAULT_PROVIDER_TIMEOUT,
            hello_world_fixture: HelloWorldFixture::default(),
        }
    }
}

impl From<&crate::config::ViewsSettings> for ViewsConfig {
    fn from(settings: &crate::config::ViewsSettings) -> Self {
        Self {
            cache_ttl: settings.cache_ttl,
            min_request_delay: settings.min_request_delay,
            provider_timeout: settings.provider_timeout,
            hello_world_fixture: settings.hello_world_fixture,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ViewsError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<DomainError> for ViewsError {
    fn from(error: DomainError) -> Self {
        match error {
            DomainError::Validation { message } => ViewsError::InvalidArgument(message),
        }
    }
}

/// Result of a single lookup, tagged with where the number came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewLookup {
    pub path: String,
    pub views: u64,
    pub origin: CountOrigin,
    /// Served from a fresh cache entry without recomputation.
    pub cached: bool,
    #[serde(skip)]
    pub computed_at: OffsetDateTime,
}

impl ViewLookup {
    fn from_entry(entry: ViewCountEntry, cached: bool) -> Self {
        Self {
            path: entry.path,
            views: entry.count,
            origin: entry.origin,
            cached,
            computed_at: entry.computed_at,
        }
    }

    /// True when the count is a stand-in rather than provider data.
    pub fn is_degraded(&self) -> bool {
        matches!(self.origin, CountOrigin::Degraded)
    }
}

/// Spaces outbound provider calls at least `min_delay` apart.
///
/// The guard is held while waiting, so concurrent callers queue up behind
/// each other instead of all waking at the same instant.
#[derive(Debug)]
pub struct RequestThrottle {
    min_delay: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RequestThrottle {
    pub fn new(min_delay: Duration) -> Self {
        Self {
            min_delay,
            last_request: Mutex::new(None),
        }
    }

    /// Wait for the next slot and claim it. Returns how long the caller waited.
    pub async fn acquire(&self) -> Duration {
        let mut last_request = self.last_request.lock().await;
        let mut waited = Duration::ZERO;

        if let Some(previous) = *last_request {
            let elapsed = previous.elapsed();
            if elapsed < self.min_delay {
                waited = self.min_delay - elapsed;
                debug!(
                    target = TARGET,
                    wait_ms = waited.as_millis() as u64,
                    "Throttling analytics request"
                );
                tokio::time::sleep(waited).await;
            }
        }

        *last_request = Some(Instant::now());
        waited
    }
}

pub struct ViewCountService {
    config: ViewsConfig,
    cache: ViewCache,
    provider: Option<Arc<dyn ViewsProvider>>,
    clock: Arc<dyn Clock>,
    throttle: RequestThrottle,
}

impl ViewCountService {
    pub fn new(config: ViewsConfig, provider: Option<Arc<dyn ViewsProvider>>) -> Self {
        let throttle = RequestThrottle::new(config.min_request_delay);
        Self {
            config,
            cache: ViewCache::new(),
            provider,
            clock: Arc::new(SystemClock),
            throttle,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &ViewsConfig {
        &self.config
    }

    pub fn cache(&self) -> &ViewCache {
        &self.cache
    }

    /// `"provider"` when a live analytics source is wired in, else `"fallback"`.
    pub fn mode(&self) -> &'static str {
        match &self.provider {
            Some(_) => "provider",
            None => "fallback",
        }
    }

    /// View count for one path.
    ///
    /// Only a blank path is an error. Provider failures are absorbed and
    /// reported as zero views.
    pub async fn get_views(&self, path: &str) -> Result<u64, ViewsError> {
        self.lookup(path).await.map(|lookup| lookup.views)
    }

    pub async fn lookup(&self, path: &str) -> Result<ViewLookup, ViewsError> {
        let route = RoutePath::parse(path)?;
        let now = self.clock.now();

        if let Some(entry) = self.cache.get_fresh(route.as_str(), now, self.ttl()) {
            debug!(
                target = TARGET,
                route = %route,
                views = entry.count,
                "Using cached view count"
            );
            return Ok(ViewLookup::from_entry(entry, true));
        }

        let (count, origin) = self.compute(&route).await;
        let stored = self.cache.store(ViewCountEntry {
            path: route.into_inner(),
            count,
            computed_at: now,
            origin,
        });

        Ok(ViewLookup::from_entry(stored, false))
    }

    /// View counts for many paths, resolved one after another in input order.
    ///
    /// The result has one key per distinct input string. A path that cannot be
    /// resolved maps to zero without affecting the others.
    pub async fn get_bulk_views<I, S>(&self, paths: I) -> BTreeMap<String, u64>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut views = BTreeMap::new();
        for path in paths {
            let path = path.as_ref();
            let count = match self.get_views(path).await {
                Ok(count) => count,
                Err(err) => {
                    warn!(
                        target = TARGET,
                        path,
                        error = %err,
                        "View lookup failed inside batch; reporting zero"
                    );
                    counter!(METRIC_BATCH_FAILURE).increment(1);
                    0
                }
            };
            views.insert(path.to_string(), count);
        }
        views
    }

    /// View count for the post published under `slug`.
    pub async fn post_views(&self, slug: &str) -> Result<u64, ViewsError> {
        let route = RoutePath::for_post(slug)?;
        self.get_views(route.as_str()).await
    }

    /// Bulk variant of [`Self::post_views`], keyed by the slugs as given.
    pub async fn preload_post_views<I, S>(&self, slugs: I) -> BTreeMap<String, u64>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut views = BTreeMap::new();
        for slug in slugs {
            let slug = slug.as_ref();
            let count = match self.post_views(slug).await {
                Ok(count) => count,
                Err(err) => {
                    warn!(
                        target = TARGET,
                        slug,
                        error = %err,
                        "Post view lookup failed inside batch; reporting zero"
                    );
                    counter!(METRIC_BATCH_FAILURE).increment(1);
                    0
                }
            };
            views.insert(slug.to_string(), count);
        }
        views
    }

    fn ttl(&self) -> time::Duration {
        time::Duration::try_from(self.config.cache_ttl).unwrap_or(time::Duration::MAX)
    }

    async fn compute(&self, route: &RoutePath) -> (u64, CountOrigin) {
        let Some(provider) = self.provider.as_ref() else {
            let views = fallback_view_count(route.as_str(), self.config.hello_world_fixture);
            debug!(
                target = TARGET,
                route = %route,
                views,
                "Generated fallback view count"
            );
            return (views, CountOrigin::Fallback);
        };

        let waited = self.throttle.acquire().await;
        histogram!(METRIC_THROTTLE_WAIT_MS).record(waited.as_secs_f64() * 1000.0);

        let started = Instant::now();
        let result = match tokio::time::timeout(
            self.config.provider_timeout,
            provider.fetch_views(route.as_str()),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout {
                seconds: self.config.provider_timeout.as_secs(),
            }),
        };
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        match result {
            Ok(views) => {
                histogram!(METRIC_PROVIDER_REQUEST_MS, "outcome" => "ok").record(elapsed_ms);
                info!(
                    target = TARGET,
                    route = %route,
                    provider = provider.name(),
                    views,
                    "Fetched view count"
                );
                (views, CountOrigin::Provider)
            }
            Err(err) => {
                histogram!(METRIC_PROVIDER_REQUEST_MS, "outcome" => "error").record(elapsed_ms);
                counter!(METRIC_PROVIDER_FAILURE, "kind" => err.kind()).increment(1);
                warn!(
                    target = TARGET,
                    route = %route,
                    provider = provider.name(),
                    kind = err.kind(),
                    error = %err,
                    "Analytics provider failed; caching zero views"
                );
                (0, CountOrigin::Degraded)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use time::Duration as TimeDuration;

    use super::*;
    use crate::application::clock::ManualClock;
    use crate::domain::views::HELLO_WORLD_ROUTE;

    #[derive(Default)]
    struct CountingProvider {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl ViewsProvider for CountingProvider {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn fetch_views(&self, route: &str) -> Result<u64, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ProviderError::transport("connection refused"));
            }
            Ok(route.len() as u64 * 100)
        }
    }

    struct HangingProvider;

    #[async_trait]
    impl ViewsProvider for HangingProvider {
        fn name(&self) -> &'static str {
            "hanging"
        }

        async fn fetch_views(&self, _route: &str) -> Result<u64, ProviderError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(1)
        }
    }

    fn fallback_service(clock: Arc<ManualClock>) -> ViewCountService {
        ViewCountService::new(ViewsConfig::default(), None).with_clock(clock)
    }

    #[tokio::test]
    async fn blank_path_is_invalid_argument() {
        let service = ViewCountService::new(ViewsConfig::default(), None);
        assert!(matches!(
            service.get_views("").await,
            Err(ViewsError::InvalidArgument(_))
        ));
        assert!(matches!(
            service.get_views("   ").await,
            Err(ViewsError::InvalidArgument(_))
        ));
        assert!(service.cache().is_empty());
    }

    #[tokio::test]
    async fn repeated_lookup_within_ttl_hits_cache() {
        let clock = Arc::new(ManualClock::default());
        let provider = Arc::new(CountingProvider::default());
        let service = ViewCountService::new(ViewsConfig::default(), Some(provider.clone()))
            .with_clock(clock.clone());

        let first = service.lookup("/posts/a").await.expect("first lookup");
        clock.advance(TimeDuration::minutes(59));
        let second = service.lookup("https://site.dev/posts/a/").await.expect("second");

        assert_eq!(first.views, second.views);
        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(first.computed_at, second.computed_at);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.origin, CountOrigin::Provider);
    }

    #[tokio::test]
    async fn expired_entry_is_recomputed() {
        let clock = Arc::new(ManualClock::default());
        let service = fallback_service(clock.clone());

        let first = service.lookup("/a").await.expect("first lookup");
        clock.advance(TimeDuration::hours(1) + TimeDuration::seconds(1));
        let second = service.lookup("/a").await.expect("second lookup");

        assert_eq!(first.views, 29);
        assert_eq!(second.views, 29);
        assert!(!second.cached);
        assert!(second.computed_at > first.computed_at);
        assert_eq!(
            service.cache().get("/a").expect("entry").computed_at,
            second.computed_at
        );
    }

    #[tokio::test]
    async fn fallback_is_deterministic_across_instances() {
        let one = ViewCountService::new(ViewsConfig::default(), None);
        let two = ViewCountService::new(ViewsConfig::default(), None);
        for path in ["/", "/about", "/posts/another-post", "/misc"] {
            assert_eq!(
                one.get_views(path).await.expect("views"),
                two.get_views(path).await.expect("views")
            );
        }
        assert_eq!(one.get_views(HELLO_WORLD_ROUTE).await, Ok(27));
        assert_eq!(one.mode(), "fallback");
    }

    #[tokio::test]
    async fn client_fixture_reports_client_value() {
        let config = ViewsConfig {
            hello_world_fixture: HelloWorldFixture::Client,
            ..ViewsConfig::default()
        };
        let service = ViewCountService::new(config, None);
        assert_eq!(service.post_views("hello-world").await, Ok(28));
    }

    #[tokio::test]
    async fn provider_failure_is_cached_as_zero() {
        let provider = Arc::new(CountingProvider {
            fail: true,
            ..CountingProvider::default()
        });
        let service = ViewCountService::new(
            ViewsConfig {
                min_request_delay: Duration::ZERO,
                ..ViewsConfig::default()
            },
            Some(provider.clone()),
        );

        let first = service.lookup("/posts/a").await.expect("lookup never fails");
        let second = service.lookup("/posts/a").await.expect("lookup never fails");

        assert_eq!(first.views, 0);
        assert!(first.is_degraded());
        assert!(second.cached);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_provider_times_out_to_zero() {
        let service =
            ViewCountService::new(ViewsConfig::default(), Some(Arc::new(HangingProvider)));

        let started = Instant::now();
        let lookup = service.lookup("/posts/slow").await.expect("lookup");

        assert_eq!(lookup.views, 0);
        assert_eq!(lookup.origin, CountOrigin::Degraded);
        assert!(started.elapsed() >= DEFAULT_PROVIDER_TIMEOUT);
        assert!(started.elapsed() < Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn bulk_lookup_keys_match_distinct_inputs() {
        let service = ViewCountService::new(ViewsConfig::default(), None);

        assert!(service.get_bulk_views(Vec::<String>::new()).await.is_empty());

        let views = service.get_bulk_views(["/b", "/a", "/b", "", "/a/"]).await;
        let keys: Vec<&str> = views.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["", "/a", "/a/", "/b"]);
        assert_eq!(views[""], 0);
        assert_eq!(views["/a"], 29);
        assert_eq!(views["/a/"], 29);
    }

    #[tokio::test]
    async fn preload_is_keyed_by_slug() {
        let service = ViewCountService::new(ViewsConfig::default(), None);
        let views = service
            .preload_post_views(["hello-world", "bun-api-with-nix-and-kubernetes", ""])
            .await;
        assert_eq!(views["hello-world"], 27);
        assert_eq!(views["bun-api-with-nix-and-kubernetes"], 42);
        assert_eq!(views[""], 0);
    }

    #[tokio::test(start_paused = true)]
    async fn throttle_spaces_consecutive_acquisitions() {
        let throttle = RequestThrottle::new(Duration::from_secs(1));
        assert_eq!(throttle.acquire().await, Duration::ZERO);

        tokio::time::advance(Duration::from_millis(300)).await;
        let waited = throttle.acquire().await;
        assert!(waited > Duration::ZERO);
        assert!(waited <= Duration::from_millis(700));

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(throttle.acquire().await, Duration::ZERO);
    }
}
