//! Glue for one on-screen message list: diffing, insert animations, render
//! caching and auto-scroll.

use crate::animation::{AnimationTracker, SharedRenderCache};
use crate::diff_engine::{DiffEngine, DiffEngineStats};
use crate::lock;
use crate::scroll_coordinator::{ScrollCoordinator, ScrollSurface};
use listcore::Identified;
use listcore::config::ListConfig;
use listcore::diff::DiffResult;
use listcore::render_cache::RenderCacheStats;
use log::debug;
use serde::Serialize;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ControllerStats {
    pub items: usize,
    pub render_cache: RenderCacheStats,
    pub diff: DiffEngineStats,
}

pub struct MessageListController<T, V> {
    snapshot: Mutex<Arc<[T]>>,
    diff: DiffEngine,
    animation: AnimationTracker<V>,
    scroll: ScrollCoordinator,
}

impl<T, V> std::fmt::Debug for MessageListController<T, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageListController")
            .field("items", &lock(&self.snapshot).len())
            .field("diff", &self.diff)
            .field("scroll", &self.scroll)
            .finish_non_exhaustive()
    }
}

impl<T, V> MessageListController<T, V>
where
    T: Identified + Send + Sync,
    V: Send + 'static,
{
    pub fn new(
        config: &ListConfig,
        cache: SharedRenderCache<V>,
        local_actor_id: impl Into<String>,
        surface: Arc<dyn ScrollSurface>,
    ) -> Self {
        Self {
            snapshot: Mutex::new(Arc::from(Vec::new())),
            diff: DiffEngine::from_config(config),
            animation: AnimationTracker::new(cache, config.animation_clear_delay()),
            scroll: ScrollCoordinator::new(local_actor_id, config.scroll_settle_delay(), surface),
        }
    }

    pub fn with_diff_engine(mut self, engine: DiffEngine) -> Self {
        self.diff = engine;
        self
    }

    /// Replace the list contents with `items` (newest first).
    ///
    /// The snapshot is swapped and the scroll decided before diffing, so
    /// overlapping updates each compare against their direct predecessor and
    /// a later update can never swallow an earlier one's scroll.
    pub async fn update(&self, items: Vec<T>) -> DiffResult {
        let new: Arc<[T]> = Arc::from(items);
        let old = std::mem::replace(&mut *lock(&self.snapshot), Arc::clone(&new));
        self.scroll.evaluate(&old[..], &new[..]);

        let tracked = self.diff.diff_tracked(&old[..], &new[..]).await;
        if !self.diff.is_latest(tracked.generation) {
            debug!(
                target: "ChatList/Diff",
                "Update {} finished after a newer one started",
                tracked.generation
            );
        }
        self.animation.mark_inserted(tracked.result.added.iter().cloned());
        tracked.result
    }

    pub fn snapshot(&self) -> Arc<[T]> {
        Arc::clone(&lock(&self.snapshot))
    }

    /// Cached render output for `item`, rendering on a miss.
    ///
    /// `render` runs without the shared cache locked, so it may query
    /// [`is_animating`](Self::is_animating).
    pub fn render<F>(&self, item: &T, render: F) -> V
    where
        F: FnOnce(&T) -> V,
        V: Clone,
    {
        let cached = lock(self.animation.cache()).get(item.id()).cloned();
        if let Some(value) = cached {
            return value;
        }
        let value = render(item);
        lock(self.animation.cache()).put(item.id(), value.clone());
        value
    }

    pub fn is_animating(&self, id: &str) -> bool {
        self.animation.is_animating(id)
    }

    pub fn stats(&self) -> ControllerStats {
        ControllerStats {
            items: lock(&self.snapshot).len(),
            render_cache: lock(self.animation.cache()).stats(),
            diff: self.diff.stats(),
        }
    }

    /// Drop cached renders for the items currently in this list.
    pub fn clear_cache(&self) {
        let snapshot = self.snapshot();
        let mut cache = lock(self.animation.cache());
        for item in snapshot.iter() {
            cache.remove(item.id());
        }
    }

    pub fn teardown(&self) {
        self.animation.teardown();
        self.scroll.teardown();
    }
}
