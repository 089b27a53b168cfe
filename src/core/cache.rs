use crate::core::rate::{ConversionFactor, ExchangeRate, RateTable};
use chrono::{DateTime, Duration, Utc};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// Default time after which cached rates are refreshed.
pub const DEFAULT_TTL: Duration = Duration::minutes(10);

#[derive(Debug, Default)]
struct RateState {
    table: Option<Arc<RateTable>>,
    conversion: Option<ConversionFactor>,
    last_updated: Option<DateTime<Utc>>,
}

/// Current rate table, conversion factor and refresh bookkeeping.
///
/// The table is replaced wholesale so readers always observe a complete
/// table. Refreshes go through [`RateCache::exclusive_refresh`], which
/// allows at most one in flight.
pub struct RateCache {
    state: RwLock<RateState>,
    ttl: Duration,
    refresh_lock: Mutex<()>,
    generation: AtomicU64,
}

impl RateCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            state: RwLock::new(RateState::default()),
            ttl,
            refresh_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    /// Seeds the table with a persisted rate before any refresh completes.
    ///
    /// Does not touch `last_updated`, so the next query still refreshes.
    pub async fn prewarm(&self, snapshot: ExchangeRate) {
        let mut state = self.state.write().await;
        if state.table.is_none() {
            debug!(rate = %snapshot, "Pre-warming rate cache");
            let table: RateTable = std::iter::once(snapshot).collect();
            state.table = Some(Arc::new(table));
        }
    }

    pub async fn table(&self) -> Option<Arc<RateTable>> {
        self.state.read().await.table.clone()
    }

    pub async fn conversion_factor(&self) -> Option<ConversionFactor> {
        self.state.read().await.conversion
    }

    pub async fn set_conversion_factor(&self, factor: ConversionFactor) {
        self.state.write().await.conversion = Some(factor);
    }

    pub async fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.state.read().await.last_updated
    }

    /// True when never refreshed or the last refresh is older than the TTL.
    pub async fn is_stale(&self, now: DateTime<Utc>) -> bool {
        match self.last_updated().await {
            None => true,
            Some(last) => now - last > self.ttl,
        }
    }

    /// Publishes a new table and marks the cache fresh as of `now`.
    pub async fn replace(&self, table: RateTable, now: DateTime<Utc>) -> Arc<RateTable> {
        let table = Arc::new(table);
        let mut state = self.state.write().await;
        state.table = Some(Arc::clone(&table));
        state.last_updated = Some(now);
        debug!(entries = table.len(), "Replaced rate table");
        table
    }

    /// Runs `refresh` unless another refresh finished while waiting for the
    /// lock, in which case `None` is returned and the caller reuses its result.
    ///
    /// A `forced` refresh never joins: it waits for the lock and always runs.
    pub async fn exclusive_refresh<F, Fut, T>(&self, forced: bool, refresh: F) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let seen = self.generation.load(Ordering::Acquire);
        let _guard = self.refresh_lock.lock().await;
        if !forced && self.generation.load(Ordering::Acquire) != seen {
            debug!("Joined in-flight refresh");
            return None;
        }

        let result = refresh().await;
        self.generation.fetch_add(1, Ordering::AcqRel);
        Some(result)
    }
}

impl Default for RateCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn table_with(code: &str, rate: u128) -> RateTable {
        std::iter::once(ExchangeRate::new(code, rate, "test")).collect()
    }

    #[tokio::test]
    async fn test_staleness_boundaries() {
        let cache = RateCache::default();
        let now = Utc::now();
        assert!(cache.is_stale(now).await);

        cache.replace(table_with("USD", 1), now).await;
        assert!(!cache.is_stale(now).await);
        assert!(!cache.is_stale(now + DEFAULT_TTL).await);
        assert!(
            !cache
                .is_stale(now + DEFAULT_TTL - Duration::milliseconds(1))
                .await
        );
        assert!(
            cache
                .is_stale(now + DEFAULT_TTL + Duration::milliseconds(1))
                .await
        );
    }

    #[tokio::test]
    async fn test_replace_swaps_whole_table() {
        let cache = RateCache::default();
        let now = Utc::now();

        let first = cache.replace(table_with("USD", 1), now).await;
        let second = cache.replace(table_with("EUR", 2), now).await;

        // Readers holding the old table keep a consistent view
        assert!(first.get("USD").is_some());
        assert!(second.get("USD").is_none());

        let current = cache.table().await.unwrap();
        assert_eq!(current.len(), 1);
        assert!(current.get("EUR").is_some());
        assert_eq!(cache.last_updated().await, Some(now));
    }

    #[tokio::test]
    async fn test_prewarm() {
        let cache = RateCache::default();
        cache.prewarm(ExchangeRate::new("USD", 42, "cached")).await;

        let table = cache.table().await.unwrap();
        assert_eq!(table.get("USD").unwrap().rate, 42);
        assert!(cache.last_updated().await.is_none());
        assert!(cache.is_stale(Utc::now()).await);

        // Never overrides a real table
        cache.replace(table_with("EUR", 1), Utc::now()).await;
        cache.prewarm(ExchangeRate::new("USD", 42, "cached")).await;
        assert!(cache.table().await.unwrap().get("USD").is_none());
    }

    #[tokio::test]
    async fn test_conversion_factor() {
        let cache = RateCache::default();
        assert!(cache.conversion_factor().await.is_none());

        let factor = ConversionFactor::new(0.25).unwrap();
        cache.set_conversion_factor(factor).await;
        assert_eq!(cache.conversion_factor().await, Some(factor));
    }

    #[tokio::test]
    async fn test_exclusive_refresh_joins_in_flight() {
        let cache = Arc::new(RateCache::default());
        let runs = Arc::new(AtomicUsize::new(0));

        let refresh = |cache: Arc<RateCache>, runs: Arc<AtomicUsize>| async move {
            cache
                .exclusive_refresh(false, || async {
                    runs.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                })
                .await
        };

        let (first, second) = tokio::join!(
            refresh(Arc::clone(&cache), Arc::clone(&runs)),
            refresh(Arc::clone(&cache), Arc::clone(&runs))
        );

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(
            [first.is_some(), second.is_some()]
                .iter()
                .filter(|ran| **ran)
                .count(),
            1
        );

        // Later refreshes run again
        assert!(refresh(cache, runs.clone()).await.is_some());
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_forced_refresh_never_joins() {
        let cache = Arc::new(RateCache::default());
        let runs = Arc::new(AtomicUsize::new(0));

        let refresh = |cache: Arc<RateCache>, runs: Arc<AtomicUsize>, forced: bool| async move {
            cache
                .exclusive_refresh(forced, || async {
                    runs.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                })
                .await
        };

        let slow = refresh(Arc::clone(&cache), Arc::clone(&runs), false);
        let forced = async {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            refresh(Arc::clone(&cache), Arc::clone(&runs), true).await
        };
        let (first, second) = tokio::join!(slow, forced);

        assert!(first.is_some());
        assert!(second.is_some());
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }
}
