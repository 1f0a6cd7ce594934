//! Fetch, decode and cache images under a shared memory budget.
//!
//! Entries are kept in LRU order with a fixed time-to-live. Before every
//! insert the cache drops expired entries, then evicts least-recently-used
//! entries until both the entry limit and the [`ImageMemoryBudget`] have
//! room for the newcomer.
//!
//! Concurrent loads of one key share a single fetch: the first caller owns
//! the in-flight marker, everyone else waits for it to go away and then
//! re-reads the cache.

use crate::budget::{self, BYTES_PER_MB, ImageMemoryBudget, MemoryPressureListener};
use crate::lifecycle::LifecycleAware;
use crate::lock;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::future::join_all;
use listcore::config::ListConfig;
use listcore::decode::{
    DEFAULT_IMAGE_TTL, DEFAULT_MAX_DECODE_DIMENSION, DecodedImage, ImageEntry, ImageRequest,
    decode_image,
};
use listcore::error::ImageError;
use listcore::net::HttpClient;
use log::{debug, trace, warn};
use lru::LruCache;
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// What [`ImageDecodeCache::get`] knows about a key right now.
#[derive(Debug, Clone)]
pub enum ImageLookup {
    Ready(Arc<DecodedImage>),
    /// A load for this key is running.
    Pending,
    Absent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFailure {
    pub key: String,
    pub error: ImageError,
}

/// Result of a load. Failures are values: show a placeholder and call
/// `load` again to retry.
#[derive(Debug, Clone)]
pub enum ImageOutcome {
    Ready(Arc<DecodedImage>),
    Failed(ImageFailure),
}

impl ImageOutcome {
    pub fn image(&self) -> Option<&Arc<DecodedImage>> {
        match self {
            Self::Ready(image) => Some(image),
            Self::Failed(_) => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    /// The decoded image, or a transparent 1x1 placeholder on failure.
    pub fn or_placeholder(self) -> Arc<DecodedImage> {
        match self {
            Self::Ready(image) => image,
            Self::Failed(_) => Arc::new(DecodedImage::placeholder()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ImageCacheStats {
    pub cached_images: usize,
    pub memory_usage_mb: f64,
    pub max_memory_mb: f64,
    pub usage_percentage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageCacheConfig {
    pub max_entries: usize,
    pub ttl: Duration,
    pub max_decode_dimension: u32,
}

impl Default for ImageCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 100,
            ttl: DEFAULT_IMAGE_TTL,
            max_decode_dimension: DEFAULT_MAX_DECODE_DIMENSION,
        }
    }
}

impl From<&ListConfig> for ImageCacheConfig {
    fn from(config: &ListConfig) -> Self {
        Self {
            max_entries: config.max_cached_images.max(1),
            ttl: config.image_ttl(),
            max_decode_dimension: config.max_decode_dimension,
        }
    }
}

static GLOBAL_CACHE: OnceCell<Arc<ImageDecodeCache>> = OnceCell::new();

/// Create the process-wide cache on the global budget. Later calls return
/// the existing instance and ignore their arguments.
pub fn init_global(http: Arc<dyn HttpClient>, config: ImageCacheConfig) -> Arc<ImageDecodeCache> {
    Arc::clone(GLOBAL_CACHE.get_or_init(|| ImageDecodeCache::new(http, budget::global(), config)))
}

pub fn global() -> Option<Arc<ImageDecodeCache>> {
    GLOBAL_CACHE.get().cloned()
}

pub struct ImageDecodeCache {
    http: Arc<dyn HttpClient>,
    budget: Arc<ImageMemoryBudget>,
    config: ImageCacheConfig,
    entries: Mutex<LruCache<String, ImageEntry>>,
    in_flight: DashMap<String, watch::Receiver<()>>,
}

impl std::fmt::Debug for ImageDecodeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageDecodeCache")
            .field("config", &self.config)
            .field("entries", &self.len())
            .field("in_flight", &self.in_flight.len())
            .finish_non_exhaustive()
    }
}

impl ImageDecodeCache {
    /// Build a cache and register it for memory-pressure signals on `budget`.
    pub fn new(
        http: Arc<dyn HttpClient>,
        budget: Arc<ImageMemoryBudget>,
        config: ImageCacheConfig,
    ) -> Arc<Self> {
        let cache = Arc::new(Self {
            http,
            budget: Arc::clone(&budget),
            config,
            entries: Mutex::new(LruCache::unbounded()),
            in_flight: DashMap::new(),
        });
        let weak = Arc::downgrade(&cache);
        let listener: Weak<dyn MemoryPressureListener> = weak;
        budget.register(listener);
        cache
    }

    pub fn budget(&self) -> &Arc<ImageMemoryBudget> {
        &self.budget
    }

    pub fn config(&self) -> &ImageCacheConfig {
        &self.config
    }

    pub fn get(&self, key: &str) -> ImageLookup {
        if let Some(image) = self.lookup(key) {
            return ImageLookup::Ready(image);
        }
        if self.in_flight.contains_key(key) {
            ImageLookup::Pending
        } else {
            ImageLookup::Absent
        }
    }

    /// Cached image for `key`. Promotes on a hit; drops an expired entry.
    fn lookup(&self, key: &str) -> Option<Arc<DecodedImage>> {
        let now = Instant::now();
        let mut entries = lock(&self.entries);

        let entry = entries.get_mut(key)?;
        if !entry.is_expired(self.config.ttl, now) {
            entry.touch(now);
            return Some(Arc::clone(&entry.image));
        }

        if let Some(expired) = entries.pop(key) {
            self.budget.release(expired.size_bytes);
            debug!(target: "ChatList/ImageCache", "Dropped expired image {key}");
        }
        None
    }

    /// Return the image for `request`, fetching and decoding it on a miss.
    ///
    /// Dropping the returned future before it completes leaves the cache as
    /// it was.
    pub async fn load(&self, request: ImageRequest) -> ImageOutcome {
        let key = request.key().to_string();

        loop {
            if let Some(image) = self.lookup(&key) {
                return ImageOutcome::Ready(image);
            }

            let claim = match self.in_flight.entry(key.clone()) {
                Entry::Occupied(existing) => Err(existing.get().clone()),
                Entry::Vacant(slot) => {
                    let (tx, rx) = watch::channel(());
                    slot.insert(rx);
                    Ok(tx)
                }
            };

            let tx = match claim {
                Ok(tx) => tx,
                Err(mut waiter) => {
                    trace!(target: "ChatList/ImageCache", "Waiting on in-flight load of {key}");
                    // Errs once the owning load finishes or is dropped.
                    let _ = waiter.changed().await;
                    continue;
                }
            };

            let _in_flight = scopeguard::guard(tx, |tx| {
                self.in_flight.remove(&key);
                drop(tx);
            });

            // The previous owner may have finished between lookup and claim.
            if let Some(image) = self.lookup(&key) {
                return ImageOutcome::Ready(image);
            }

            return match self.fetch_and_decode(&request).await {
                Ok(image) => {
                    let image = Arc::new(image);
                    self.insert(&key, Arc::clone(&image));
                    ImageOutcome::Ready(image)
                }
                Err(error) => {
                    warn!(target: "ChatList/ImageCache", "Failed to load {key}: {error}");
                    ImageOutcome::Failed(ImageFailure {
                        key: key.clone(),
                        error,
                    })
                }
            };
        }
    }

    /// Run [`load`](Self::load) as its own task. Aborting the handle cancels
    /// the load.
    pub fn spawn_load(self: &Arc<Self>, request: ImageRequest) -> JoinHandle<ImageOutcome> {
        let cache = Arc::clone(self);
        tokio::spawn(async move { cache.load(request).await })
    }

    /// Load several images concurrently, keeping the request order.
    pub async fn load_many<I>(&self, requests: I) -> Vec<ImageOutcome>
    where
        I: IntoIterator<Item = ImageRequest>,
    {
        join_all(requests.into_iter().map(|request| self.load(request))).await
    }

    async fn fetch_and_decode(&self, request: &ImageRequest) -> Result<DecodedImage, ImageError> {
        let response = self
            .http
            .execute(request.to_http())
            .await
            .map_err(|e| ImageError::Transport(e.to_string()))?;

        if !response.is_success() {
            return Err(ImageError::HttpStatus(response.status_code));
        }

        let max_dimension = self.config.max_decode_dimension;
        let body = response.body;
        tokio::task::spawn_blocking(move || decode_image(&body, max_dimension))
            .await
            .map_err(|e| ImageError::DecodeTask(e.to_string()))?
    }

    /// Cache an already decoded image under `key`, evicting as needed.
    pub(crate) fn insert(&self, key: &str, image: Arc<DecodedImage>) {
        let now = Instant::now();
        let entry = ImageEntry::new(image, now);
        let size = entry.size_bytes;

        let mut entries = lock(&self.entries);
        self.purge_expired_locked(&mut entries, now);
        if let Some(previous) = entries.pop(key) {
            self.budget.release(previous.size_bytes);
        }

        while entries.len() + 1 > self.config.max_entries || !self.budget.can_reserve(size) {
            let Some((evicted, old)) = entries.pop_lru() else {
                break;
            };
            self.budget.release(old.size_bytes);
            trace!(target: "ChatList/ImageCache", "Evicted {evicted} to make room for {key}");
        }

        if !self.budget.can_reserve(size) {
            warn!(
                target: "ChatList/ImageCache",
                "Image {key} ({:.1} MB) exceeds the remaining budget; caching it anyway",
                size as f64 / BYTES_PER_MB as f64
            );
        }
        self.budget.reserve(size);
        entries.put(key.to_string(), entry);
    }

    fn purge_expired_locked(&self, entries: &mut LruCache<String, ImageEntry>, now: Instant) -> usize {
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(self.config.ttl, now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            if let Some(entry) = entries.pop(key) {
                self.budget.release(entry.size_bytes);
            }
        }
        if !expired.is_empty() {
            debug!(target: "ChatList/ImageCache", "Purged {} expired images", expired.len());
        }
        expired.len()
    }

    /// Drop every entry past its time-to-live. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let mut entries = lock(&self.entries);
        self.purge_expired_locked(&mut entries, Instant::now())
    }

    /// Evict least-recently-used entries until the budget is back under its
    /// ceiling or this cache is empty.
    pub fn evict_to_ceiling(&self) -> usize {
        let mut entries = lock(&self.entries);
        let mut evicted = 0;
        while self.budget.is_over_ceiling() {
            let Some((_, old)) = entries.pop_lru() else {
                break;
            };
            self.budget.release(old.size_bytes);
            evicted += 1;
        }
        evicted
    }

    pub fn invalidate(&self, key: &str) -> bool {
        let removed = lock(&self.entries).pop(key);
        match removed {
            Some(entry) => {
                self.budget.release(entry.size_bytes);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        lock(&self.entries).contains(key)
    }

    /// Drop everything and give the bytes back to the budget.
    pub fn clear(&self) {
        let mut entries = lock(&self.entries);
        let total: u64 = entries.iter().map(|(_, entry)| entry.size_bytes).sum();
        let count = entries.len();
        entries.clear();
        self.budget.release(total);
        debug!(target: "ChatList/ImageCache", "Cleared {count} images");
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cached keys from most- to least-recently-used.
    pub fn keys_by_recency(&self) -> Vec<String> {
        lock(&self.entries).iter().map(|(key, _)| key.clone()).collect()
    }

    pub fn stats(&self) -> ImageCacheStats {
        let budget = self.budget.stats();
        ImageCacheStats {
            cached_images: self.len(),
            memory_usage_mb: budget.total_usage as f64 / BYTES_PER_MB as f64,
            max_memory_mb: budget.ceiling as f64 / BYTES_PER_MB as f64,
            usage_percentage: budget.usage_percentage,
        }
    }
}

impl MemoryPressureListener for ImageDecodeCache {
    fn on_memory_pressure(&self) {
        self.clear();
    }
}

impl LifecycleAware for ImageDecodeCache {
    fn on_background(&self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use listcore::net::{HttpRequest, HttpResponse};

    struct NotFound;

    #[async_trait]
    impl HttpClient for NotFound {
        async fn execute(&self, _request: HttpRequest) -> Result<HttpResponse> {
            Ok(HttpResponse {
                status_code: 404,
                body: Vec::new(),
            })
        }
    }

    fn cache() -> Arc<ImageDecodeCache> {
        ImageDecodeCache::new(
            Arc::new(NotFound),
            Arc::new(ImageMemoryBudget::with_ceiling_mb(1)),
            ImageCacheConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_http_error_is_failure_and_not_cached() {
        let cache = cache();
        let outcome = cache.load(ImageRequest::new("https://cdn.example/missing")).await;

        match outcome {
            ImageOutcome::Failed(failure) => {
                assert_eq!(failure.key, "https://cdn.example/missing");
                assert_eq!(failure.error, ImageError::HttpStatus(404));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(matches!(cache.get("https://cdn.example/missing"), ImageLookup::Absent));
        assert_eq!(cache.budget().current(), 0);
    }

    #[test]
    fn test_insert_evicts_least_recently_used_by_count() {
        let cache = ImageDecodeCache::new(
            Arc::new(NotFound),
            Arc::new(ImageMemoryBudget::with_ceiling_mb(1)),
            ImageCacheConfig {
                max_entries: 2,
                ..Default::default()
            },
        );
        for key in ["a", "b"] {
            cache.insert(key, Arc::new(DecodedImage::placeholder()));
        }
        assert!(matches!(cache.get("a"), ImageLookup::Ready(_)));

        cache.insert("c", Arc::new(DecodedImage::placeholder()));
        assert_eq!(cache.keys_by_recency(), vec!["c", "a"]);
        assert_eq!(cache.budget().current(), 8);
    }

    #[test]
    fn test_pressure_releases_exactly_what_was_cached() {
        let cache = cache();
        cache.insert("a", Arc::new(DecodedImage::placeholder()));
        cache.insert("b", Arc::new(DecodedImage::placeholder()));
        assert_eq!(cache.budget().current(), 8);

        cache.budget().on_pressure_signal();
        assert!(cache.is_empty());
        assert_eq!(cache.budget().current(), 0);
    }

    /// Inserts into the cache while the pressure signal is being delivered.
    struct RacingInsert(OnceCell<Weak<ImageDecodeCache>>);

    impl MemoryPressureListener for RacingInsert {
        fn on_memory_pressure(&self) {
            if let Some(cache) = self.0.get().and_then(Weak::upgrade) {
                cache.insert("late", Arc::new(DecodedImage::placeholder()));
            }
        }
    }

    #[test]
    fn test_insert_during_pressure_stays_accounted() {
        let budget = Arc::new(ImageMemoryBudget::with_ceiling_mb(1));
        // Registered ahead of the cache, so the insert lands before the cache
        // clears.
        let early = Arc::new(RacingInsert(OnceCell::new()));
        let early_dyn: Arc<dyn MemoryPressureListener> = early.clone();
        budget.register(Arc::downgrade(&early_dyn));

        let cache = ImageDecodeCache::new(
            Arc::new(NotFound),
            Arc::clone(&budget),
            ImageCacheConfig::default(),
        );
        let _ = early.0.set(Arc::downgrade(&cache));
        // Registered after it, so the insert lands once the cache is empty.
        let late = Arc::new(RacingInsert(OnceCell::new()));
        let _ = late.0.set(Arc::downgrade(&cache));
        let late_dyn: Arc<dyn MemoryPressureListener> = late.clone();
        budget.register(Arc::downgrade(&late_dyn));

        cache.insert("a", Arc::new(DecodedImage::placeholder()));
        budget.on_pressure_signal();

        assert_eq!(cache.keys_by_recency(), vec!["late"]);
        assert_eq!(budget.current(), 4);
    }

    #[test]
    fn test_failed_outcome_falls_back_to_placeholder() {
        let outcome = ImageOutcome::Failed(ImageFailure {
            key: "k".to_string(),
            error: ImageError::EmptyBody,
        });
        assert!(!outcome.is_ready());
        assert_eq!(*outcome.or_placeholder(), DecodedImage::placeholder());
    }
}
