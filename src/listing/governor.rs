//! Client-side request governor for listing lookups.
//!
//! Many independent callers ask "is this mint listed?" at once. The governor
//! funnels them through a single FIFO queue drained by one task at a time,
//! spaces consecutive upstream dispatches by at least `min_delay`, retries
//! transient failures with exponential backoff and keeps successful results
//! in a short-lived cache so repeats within a search session never leave the
//! process.

use crate::listing::cache::CacheSweeper;
use crate::listing::config::GovernorConfig;
use crate::listing::entry::CacheEntry;
use crate::listing::error::ListingError;
use crate::listing::source::ListingSource;
use crate::types::{short_mint, ListingQueryResult, Mint};
use moka::future::Cache;
use rand::Rng;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::{sleep, timeout, Instant};
use tokio_retry::strategy::ExponentialBackoff;
use tracing::{debug, error, info, instrument, warn};

type Reply = oneshot::Sender<Result<ListingQueryResult, ListingError>>;

/// A lookup waiting for its turn.
struct QueuedRequest {
    mint: Mint,
    enqueued_at: Instant,
    reply: Reply,
}

#[derive(Default)]
struct QueueState {
    queue: VecDeque<QueuedRequest>,
    /// Set while a drain task is running; at most one runs at a time
    processing: bool,
    last_request_time: Option<Instant>,
}

/// Diagnostic snapshot of the governor.
#[derive(Debug, Clone)]
pub struct GovernorStatus {
    pub queue_length: usize,
    pub cache_size: u64,
    pub processing: bool,
    /// When the last dispatch completed
    pub last_request_time: Option<Instant>,
}

struct GovernorInner {
    source: Arc<dyn ListingSource>,
    config: GovernorConfig,
    /// Capacity-bounded by moka; freshness is judged by the entry's own TTL
    cache: Cache<Mint, CacheEntry<ListingQueryResult>>,
    state: Mutex<QueueState>,
}

/// Paced, cached, FIFO front for a [`ListingSource`].
///
/// Cloning is cheap and every clone shares the same queue and cache.
#[derive(Clone)]
pub struct ListingGovernor {
    inner: Arc<GovernorInner>,
}

impl ListingGovernor {
    pub fn new(source: Arc<dyn ListingSource>, config: GovernorConfig) -> Self {
        let cache = Cache::builder().max_capacity(config.cache_capacity).build();

        info!(
            "Created listing governor: min delay {:?}, cache TTL {:?}, {} retries",
            config.min_delay, config.cache_ttl, config.max_retries
        );

        Self {
            inner: Arc::new(GovernorInner {
                source,
                config,
                cache,
                state: Mutex::new(QueueState::default()),
            }),
        }
    }

    /// Look up the listings of `mint`.
    ///
    /// A fresh cached result is returned straight away. Otherwise the request
    /// joins the queue and the future completes once it has been processed.
    pub async fn check_listing(&self, mint: &str) -> Result<ListingQueryResult, ListingError> {
        let mint = require_mint(mint)?;

        if let Some(cached) = self.inner.cached(mint).await {
            debug!("Cache hit for {}", short_mint(mint));
            return Ok(cached);
        }

        let (reply, response) = oneshot::channel();
        let start_drain = {
            let mut state = self.inner.lock_state();
            state.queue.push_back(QueuedRequest {
                mint: mint.to_string(),
                enqueued_at: Instant::now(),
                reply,
            });
            debug!(
                "Queued {} (queue length {})",
                short_mint(mint),
                state.queue.len()
            );
            !std::mem::replace(&mut state.processing, true)
        };

        if start_drain {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(inner.drain());
        }

        response.await.map_err(|_| ListingError::GovernorClosed)?
    }

    /// Drop every cached result. Queued and in-flight requests are unaffected.
    pub fn clear_cache(&self) {
        self.inner.cache.invalidate_all();
        info!("Listing cache cleared");
    }

    /// Snapshot of queue and cache state. Expired cache entries are evicted
    /// first so `cache_size` only counts live results.
    pub async fn status(&self) -> GovernorStatus {
        let cache_size = self.inner.evict_expired().await;
        let state = self.inner.lock_state();
        GovernorStatus {
            queue_length: state.queue.len(),
            cache_size,
            processing: state.processing,
            last_request_time: state.last_request_time,
        }
    }

    /// Periodically evict expired cache entries even when nobody asks for
    /// status. Stops when the handle is shut down or dropped.
    pub fn spawn_cache_sweeper(&self, interval: Duration) -> CacheSweeper {
        let inner = Arc::clone(&self.inner);
        CacheSweeper::spawn(interval, move || {
            let inner = Arc::clone(&inner);
            async move {
                inner.evict_expired().await;
            }
        })
    }
}

/// The governor keys its cache by whatever the caller passes; only blank
/// keys are rejected. Sources validate mints before they reach a URL.
fn require_mint(mint: &str) -> Result<&str, ListingError> {
    if mint.trim().is_empty() {
        return Err(ListingError::InvalidInput("mint address is required".to_string()));
    }
    Ok(mint)
}

impl GovernorInner {
    /// Fresh cached result for `mint`. An expired entry counts as a miss and
    /// is dropped.
    async fn cached(&self, mint: &str) -> Option<ListingQueryResult> {
        let entry = self.cache.get(mint).await?;
        if entry.is_expired() {
            debug!(
                "Cached result for {} expired after {:?}",
                short_mint(mint),
                entry.age()
            );
            self.cache.invalidate(mint).await;
            return None;
        }
        Some(entry.value)
    }

    /// Drop every expired entry; returns how many live entries remain.
    async fn evict_expired(&self) -> u64 {
        let now = Instant::now();
        let mut live = 0u64;
        let mut expired = Vec::new();
        for (mint, entry) in self.cache.iter() {
            if entry.is_expired_at(now) {
                expired.push(mint);
            } else {
                live += 1;
            }
        }

        for mint in &expired {
            self.cache.invalidate(mint.as_str()).await;
        }
        self.cache.run_pending_tasks().await;

        if !expired.is_empty() {
            debug!("Evicted {} expired listing results", expired.len());
        }
        live
    }

    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Work through the queue until it is empty, then release the guard.
    async fn drain(self: Arc<Self>) {
        loop {
            let request = {
                let mut state = self.lock_state();
                match state.queue.pop_front() {
                    Some(request) => request,
                    None => {
                        state.processing = false;
                        break;
                    }
                }
            };

            let waited = request.enqueued_at.elapsed();
            if waited > self.config.max_queue_age {
                warn!(
                    "Dropping {} after {:?} in queue",
                    short_mint(&request.mint),
                    waited
                );
                let _ = request.reply.send(Err(ListingError::QueueTimeout { waited }));
                continue;
            }

            if request.reply.is_closed() {
                debug!("Caller for {} went away, skipping", short_mint(&request.mint));
                continue;
            }

            self.wait_for_slot().await;

            let result = self.fetch_with_retries(&request.mint).await;
            match &result {
                Ok(listing) => {
                    let entry = CacheEntry::new(listing.clone(), self.config.cache_ttl);
                    self.cache.insert(request.mint.clone(), entry).await;
                }
                Err(e) => {
                    error!(
                        "Failed to check listing for {}: {} (queue length {})",
                        short_mint(&request.mint),
                        e,
                        self.lock_state().queue.len()
                    );
                }
            }

            let _ = request.reply.send(result);
            self.lock_state().last_request_time = Some(Instant::now());
        }

        debug!("Listing queue drained");
    }

    /// Sleep until `min_delay` has passed since the previous dispatch.
    async fn wait_for_slot(&self) {
        let last = self.lock_state().last_request_time;
        if let Some(last) = last {
            let elapsed = last.elapsed();
            if elapsed < self.config.min_delay {
                sleep(self.config.min_delay - elapsed).await;
            }
        }
    }

    /// Delays before each retry: `backoff_base * 2^n`, `max_retries` of them.
    fn backoff_schedule(&self) -> impl Iterator<Item = Duration> {
        // ExponentialBackoff::from_millis(2) yields factor*2, factor*4, ...
        let factor = (self.config.backoff_base.as_millis() as u64 / 2).max(1);
        ExponentialBackoff::from_millis(2)
            .factor(factor)
            .take(self.config.max_retries)
    }

    fn jitter(&self) -> Duration {
        let max_ms = self.config.max_jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..max_ms))
    }

    /// One attempt plus up to `max_retries` retries for transient failures.
    #[instrument(skip(self, mint), fields(mint = %short_mint(mint)))]
    async fn fetch_with_retries(&self, mint: &str) -> Result<ListingQueryResult, ListingError> {
        let mut backoff = self.backoff_schedule();
        let mut attempt = 0usize;

        loop {
            attempt += 1;
            let attempt_call = self.source.fetch_listings(mint);
            let outcome = match timeout(self.config.request_timeout, attempt_call).await {
                Ok(outcome) => outcome,
                Err(_) => Err(ListingError::Timeout(self.config.request_timeout)),
            };

            let err = match outcome {
                Ok(result) => return Ok(result),
                Err(err) if err.is_retryable() => err,
                Err(err) => return Err(err),
            };

            match backoff.next() {
                Some(delay) => {
                    let delay = delay + self.jitter();
                    warn!(
                        "Attempt {} for {} failed: {}; retrying in {}ms",
                        attempt,
                        short_mint(mint),
                        err,
                        delay.as_millis()
                    );
                    sleep(delay).await;
                }
                None => {
                    error!(
                        "Final failure for {} after {} attempts: {}",
                        short_mint(mint),
                        attempt,
                        err
                    );
                    return Err(err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::config::GovernorBuilder;
    use async_trait::async_trait;

    /// Source that fails with the scripted errors first, then answers.
    struct ScriptedSource {
        failures: Mutex<VecDeque<ListingError>>,
        calls: Mutex<Vec<Mint>>,
    }

    impl ScriptedSource {
        fn new(failures: Vec<ListingError>) -> Arc<Self> {
            Arc::new(Self {
                failures: Mutex::new(failures.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<Mint> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ListingSource for ScriptedSource {
        async fn fetch_listings(&self, mint: &str) -> Result<ListingQueryResult, ListingError> {
            self.calls.lock().unwrap().push(mint.to_string());
            if let Some(err) = self.failures.lock().unwrap().pop_front() {
                return Err(err);
            }
            Ok(ListingQueryResult::unlisted(mint))
        }
    }

    fn governor(source: Arc<ScriptedSource>) -> ListingGovernor {
        ListingGovernor::new(source, GovernorConfig::default())
    }

    #[test]
    fn test_backoff_schedule_doubles() {
        let source = ScriptedSource::new(vec![]);
        let governor = ListingGovernor::new(
            source,
            GovernorBuilder::new()
                .with_retries(3, Duration::from_secs(1))
                .build_config(),
        );

        let delays: Vec<Duration> = governor.inner.backoff_schedule().collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_mint_is_rejected_before_queueing() {
        let source = ScriptedSource::new(vec![]);
        let governor = governor(source.clone());

        let result = governor.check_listing("").await;

        assert!(matches!(result, Err(ListingError::InvalidInput(_))));
        assert!(source.calls().is_empty());
        assert_eq!(governor.status().await.queue_length, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_any_non_blank_key_is_accepted() {
        let source = ScriptedSource::new(vec![]);
        let governor = governor(source.clone());

        assert!(matches!(
            governor.check_listing("   ").await,
            Err(ListingError::InvalidInput(_))
        ));
        let result = governor.check_listing("mint-with_symbols.v2").await.unwrap();

        assert_eq!(result.mint, "mint-with_symbols.v2");
        assert_eq!(source.calls(), vec!["mint-with_symbols.v2".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_evicts_expired_results() {
        let source = ScriptedSource::new(vec![]);
        let governor = governor(source);
        governor.check_listing("MintA").await.unwrap();

        let sweeper = governor.spawn_cache_sweeper(Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(governor.inner.cache.iter().count(), 0);

        sweeper.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_is_not_retried() {
        let source = ScriptedSource::new(vec![ListingError::InvalidInput("bad".into())]);
        let governor = governor(source.clone());

        let result = governor.check_listing("MintA").await;

        assert!(matches!(result, Err(ListingError::InvalidInput(_))));
        assert_eq!(source.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_after_drain() {
        let source = ScriptedSource::new(vec![]);
        let governor = governor(source);

        governor.check_listing("MintA").await.unwrap();
        // let the drain task observe the empty queue
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(1)).await;

        let status = governor.status().await;
        assert_eq!(status.queue_length, 0);
        assert_eq!(status.cache_size, 1);
        assert!(!status.processing);
        assert!(status.last_request_time.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_governor_survives_final_failure() {
        let source = ScriptedSource::new(vec![
            ListingError::Network("reset".into()),
            ListingError::Network("reset".into()),
            ListingError::Network("reset".into()),
        ]);
        let governor = governor(source.clone());

        let first = governor.check_listing("MintA").await;
        assert!(matches!(first, Err(ListingError::Network(_))));
        assert_eq!(source.calls().len(), 3);

        // Failures are not cached; the next call dispatches again and succeeds
        let second = governor.check_listing("MintA").await.unwrap();
        assert_eq!(second.mint, "MintA");
        assert_eq!(source.calls().len(), 4);
    }
}
