use crate::lock;
use listcore::render_cache::RenderCache;
use log::{trace, warn};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// A render cache shared by every list instance on screen.
pub type SharedRenderCache<V> = Arc<Mutex<RenderCache<V>>>;

pub fn shared_render_cache<V>(capacity: usize) -> SharedRenderCache<V> {
    Arc::new(Mutex::new(RenderCache::new(capacity)))
}

/// Flags freshly inserted ids as animating and clears each batch after a
/// fixed delay.
///
/// Every batch owns its timer. A later batch never postpones the clear of an
/// earlier one. The cache may be shared with other lists, so the tracker only
/// ever clears ids from its own batches.
pub struct AnimationTracker<V> {
    cache: SharedRenderCache<V>,
    clear_delay: Duration,
    batches: Mutex<Vec<PendingBatch>>,
}

struct PendingBatch {
    ids: Arc<[String]>,
    timer: JoinHandle<()>,
}

impl<V> std::fmt::Debug for AnimationTracker<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnimationTracker")
            .field("clear_delay", &self.clear_delay)
            .field("batches", &lock(&self.batches).len())
            .finish()
    }
}

impl<V: Send + 'static> AnimationTracker<V> {
    pub fn new(cache: SharedRenderCache<V>, clear_delay: Duration) -> Self {
        Self {
            cache,
            clear_delay,
            batches: Mutex::new(Vec::new()),
        }
    }

    pub fn cache(&self) -> &SharedRenderCache<V> {
        &self.cache
    }

    /// Mark `ids` animating and schedule their clear.
    ///
    /// Outside a tokio runtime there is nothing to drive the timer, so the
    /// batch is cleared right away and the items render without animation.
    pub fn mark_inserted<I, S>(&self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let batch: Arc<[String]> = ids.into_iter().map(Into::into).collect();
        if batch.is_empty() {
            return;
        }

        {
            let mut cache = lock(&self.cache);
            for id in batch.iter() {
                cache.mark_animating(id.as_str());
            }
        }

        let Ok(handle) = Handle::try_current() else {
            warn!(
                target: "ChatList/RenderCache",
                "No runtime to time insert animations; clearing {} ids now",
                batch.len()
            );
            lock(&self.cache).clear_animating(batch.iter());
            return;
        };

        trace!(target: "ChatList/RenderCache", "Animating {} new ids", batch.len());
        let cache = Arc::clone(&self.cache);
        let delay = self.clear_delay;
        let ids = Arc::clone(&batch);
        let timer = handle.spawn(async move {
            tokio::time::sleep(delay).await;
            lock(&cache).clear_animating(ids.iter());
        });

        let mut batches = lock(&self.batches);
        batches.retain(|pending| !pending.timer.is_finished());
        batches.push(PendingBatch { ids: batch, timer });
    }

    pub fn is_animating(&self, id: &str) -> bool {
        lock(&self.cache).is_animating(id)
    }

    /// Timers that have not fired yet.
    pub fn pending_timers(&self) -> usize {
        lock(&self.batches)
            .iter()
            .filter(|pending| !pending.timer.is_finished())
            .count()
    }

    /// Cancel pending clears and drop the flags of ids this tracker marked.
    pub fn teardown(&self) {
        let pending: Vec<PendingBatch> = lock(&self.batches).drain(..).collect();
        let mut cache = lock(&self.cache);
        for batch in pending.into_iter().filter(|batch| !batch.timer.is_finished()) {
            batch.timer.abort();
            cache.clear_animating(batch.ids.iter());
        }
    }
}

impl<V> Drop for AnimationTracker<V> {
    fn drop(&mut self) {
        for pending in lock(&self.batches).drain(..) {
            pending.timer.abort();
        }
    }
}
