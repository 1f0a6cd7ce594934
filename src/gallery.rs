//! Sliding-window preloading for a paged image viewer.
//!
//! The gallery holds decoded images for the current page and `radius`
//! neighbours on each side. Pages that leave the window stay around for a
//! grace period in case the user swipes back, then are disposed and their
//! cache entries invalidated.

use crate::budget::MemoryPressureListener;
use crate::image_cache::{ImageDecodeCache, ImageOutcome};
use crate::lifecycle::LifecycleAware;
use crate::lock;
use listcore::config::ListConfig;
use listcore::decode::{DecodedImage, ImageRequest};
use listcore::preload::PreloadWindow;
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GalleryState {
    /// No page shown yet.
    Idle,
    Windowed,
    /// Some held pages are outside the window and will be disposed when the
    /// grace timer fires.
    DisposingScheduled,
    Disposed,
}

struct GalleryInner {
    state: GalleryState,
    center: Option<usize>,
    held: BTreeMap<usize, Arc<DecodedImage>>,
    loading: HashMap<usize, JoinHandle<()>>,
    dispose_timer: Option<JoinHandle<()>>,
    /// Bumped whenever the grace timer is cancelled or replaced. A timer that
    /// wakes with an older value does nothing.
    dispose_generation: u64,
    aggressive: bool,
}

impl GalleryInner {
    fn cancel_dispose_timer(&mut self) {
        if let Some(timer) = self.dispose_timer.take() {
            timer.abort();
        }
        self.dispose_generation += 1;
    }
}

struct Shared {
    cache: Arc<ImageDecodeCache>,
    pages: Vec<ImageRequest>,
    radius: usize,
    grace: Duration,
    inner: Mutex<GalleryInner>,
}

pub struct GalleryPreloadWindow {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for GalleryPreloadWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = lock(&self.shared.inner);
        f.debug_struct("GalleryPreloadWindow")
            .field("pages", &self.shared.pages.len())
            .field("radius", &self.shared.radius)
            .field("state", &inner.state)
            .field("center", &inner.center)
            .field("held", &inner.held.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl GalleryPreloadWindow {
    pub fn new(
        cache: Arc<ImageDecodeCache>,
        pages: Vec<ImageRequest>,
        radius: usize,
        grace: Duration,
    ) -> Arc<Self> {
        let gallery = Arc::new(Self {
            shared: Arc::new(Shared {
                cache,
                pages,
                radius,
                grace,
                inner: Mutex::new(GalleryInner {
                    state: GalleryState::Idle,
                    center: None,
                    held: BTreeMap::new(),
                    loading: HashMap::new(),
                    dispose_timer: None,
                    dispose_generation: 0,
                    aggressive: false,
                }),
            }),
        });
        let weak = Arc::downgrade(&gallery);
        let listener: Weak<dyn MemoryPressureListener> = weak;
        gallery.shared.cache.budget().register(listener);
        gallery
    }

    pub fn from_config(
        cache: Arc<ImageDecodeCache>,
        pages: Vec<ImageRequest>,
        config: &ListConfig,
    ) -> Arc<Self> {
        Self::new(cache, pages, config.preload_distance, config.cleanup_delay())
    }

    pub fn len(&self) -> usize {
        self.shared.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.pages.is_empty()
    }

    pub fn state(&self) -> GalleryState {
        lock(&self.shared.inner).state
    }

    pub fn center(&self) -> Option<usize> {
        lock(&self.shared.inner).center
    }

    pub fn held_indices(&self) -> BTreeSet<usize> {
        lock(&self.shared.inner).held.keys().copied().collect()
    }

    pub fn image(&self, index: usize) -> Option<Arc<DecodedImage>> {
        lock(&self.shared.inner).held.get(&index).cloned()
    }

    pub fn is_loading(&self, index: usize) -> bool {
        lock(&self.shared.inner)
            .loading
            .get(&index)
            .is_some_and(|task| !task.is_finished())
    }

    /// Move the window to `center`: start loads for pages entering it and
    /// schedule disposal of held pages that left it.
    pub fn set_center(&self, center: usize) {
        let shared = &self.shared;
        let mut inner = lock(&shared.inner);
        if inner.state == GalleryState::Disposed {
            warn!(target: "ChatList/Gallery", "set_center({center}) on a disposed gallery");
            return;
        }

        let window = PreloadWindow::new(center, shared.radius);
        let len = shared.pages.len();
        inner.center = Some(center);
        if inner.state == GalleryState::Idle {
            inner.state = GalleryState::Windowed;
        }

        inner.loading.retain(|index, task| {
            let keep = window.contains(*index, len) && !task.is_finished();
            if !keep {
                task.abort();
            }
            keep
        });

        let runtime = Handle::try_current().ok();
        for index in window.indices(len) {
            if inner.held.contains_key(&index) || inner.loading.contains_key(&index) {
                continue;
            }
            let Some(handle) = &runtime else {
                warn!(target: "ChatList/Gallery", "No runtime to preload page {index}");
                break;
            };
            let task = handle.spawn(load_page(Arc::clone(shared), index));
            inner.loading.insert(index, task);
        }

        let leaving = window.outside(inner.held.keys(), len);
        inner.cancel_dispose_timer();
        if leaving.is_empty() {
            inner.state = GalleryState::Windowed;
            return;
        }

        match &runtime {
            Some(handle) if !inner.aggressive => {
                debug!(
                    target: "ChatList/Gallery",
                    "Disposing {leaving:?} in {:?} unless they come back",
                    shared.grace
                );
                let generation = inner.dispose_generation;
                inner.dispose_timer = Some(handle.spawn(dispose_after_grace(
                    Arc::clone(shared),
                    generation,
                )));
                inner.state = GalleryState::DisposingScheduled;
            }
            _ => {
                shared.dispose(&mut inner, &leaving);
                inner.state = GalleryState::Windowed;
            }
        }
    }

    /// Dispose every held page except the center, skipping the grace period.
    pub fn aggressive_cleanup(&self) {
        let shared = &self.shared;
        let mut inner = lock(&shared.inner);
        if inner.state == GalleryState::Disposed {
            return;
        }
        inner.cancel_dispose_timer();

        let center = inner.center;
        let victims: BTreeSet<usize> = inner
            .held
            .keys()
            .copied()
            .filter(|index| Some(*index) != center)
            .collect();
        inner.loading.retain(|index, task| {
            let keep = Some(*index) == center;
            if !keep {
                task.abort();
            }
            keep
        });
        shared.dispose(&mut inner, &victims);
        if inner.center.is_some() {
            inner.state = GalleryState::Windowed;
        }
        info!(target: "ChatList/Gallery", "Aggressive cleanup disposed {} pages", victims.len());
    }

    pub fn set_aggressive(&self, aggressive: bool) {
        lock(&self.shared.inner).aggressive = aggressive;
    }

    /// Release every page, cancel timers and loads. The gallery is unusable
    /// afterwards.
    pub fn teardown(&self) {
        let shared = &self.shared;
        let mut inner = lock(&shared.inner);
        if inner.state == GalleryState::Disposed {
            return;
        }
        shared.abort_tasks(&mut inner);
        let all: BTreeSet<usize> = inner.held.keys().copied().collect();
        shared.dispose(&mut inner, &all);
        inner.state = GalleryState::Disposed;
        debug!(target: "ChatList/Gallery", "Gallery torn down");
    }
}

impl Shared {
    fn dispose(&self, inner: &mut GalleryInner, indices: &BTreeSet<usize>) {
        for index in indices {
            if inner.held.remove(index).is_some()
                && let Some(page) = self.pages.get(*index)
            {
                self.cache.invalidate(page.key());
            }
        }
    }

    fn abort_tasks(&self, inner: &mut GalleryInner) {
        inner.cancel_dispose_timer();
        for (_, task) in inner.loading.drain() {
            task.abort();
        }
    }
}

async fn load_page(shared: Arc<Shared>, index: usize) {
    let Some(request) = shared.pages.get(index).cloned() else {
        return;
    };
    let outcome = shared.cache.load(request).await;

    let mut inner = lock(&shared.inner);
    inner.loading.remove(&index);
    match outcome {
        ImageOutcome::Ready(image) => {
            let in_window = inner.center.is_some_and(|center| {
                PreloadWindow::new(center, shared.radius).contains(index, shared.pages.len())
            });
            if inner.state != GalleryState::Disposed && in_window {
                inner.held.insert(index, image);
            }
        }
        ImageOutcome::Failed(failure) => {
            debug!(target: "ChatList/Gallery", "Page {index} failed: {}", failure.error);
        }
    }
}

async fn dispose_after_grace(shared: Arc<Shared>, generation: u64) {
    tokio::time::sleep(shared.grace).await;

    let mut inner = lock(&shared.inner);
    if inner.dispose_generation != generation || inner.state != GalleryState::DisposingScheduled {
        return;
    }
    let Some(center) = inner.center else {
        return;
    };
    let window = PreloadWindow::new(center, shared.radius);
    let leaving = window.outside(inner.held.keys(), shared.pages.len());
    shared.dispose(&mut inner, &leaving);
    inner.dispose_timer = None;
    inner.state = GalleryState::Windowed;
    debug!(target: "ChatList/Gallery", "Disposed {leaving:?} after grace period");
}

impl MemoryPressureListener for GalleryPreloadWindow {
    /// Keep only the page on screen. The gallery registers after its cache,
    /// which has already been emptied by the time this runs, so the center
    /// image is handed back to the cache to stay on the budget.
    fn on_memory_pressure(&self) {
        self.aggressive_cleanup();

        let shared = &self.shared;
        let inner = lock(&shared.inner);
        let Some(center) = inner.center else {
            return;
        };
        if let (Some(image), Some(page)) = (inner.held.get(&center), shared.pages.get(center))
            && !shared.cache.contains(page.key())
        {
            shared.cache.insert(page.key(), Arc::clone(image));
        }
    }
}

impl LifecycleAware for GalleryPreloadWindow {
    fn on_background(&self) {
        self.set_aggressive(true);
        self.aggressive_cleanup();
    }

    fn on_foreground(&self) {
        self.set_aggressive(false);
    }
}

impl Drop for GalleryPreloadWindow {
    fn drop(&mut self) {
        let mut inner = lock(&self.shared.inner);
        self.shared.abort_tasks(&mut inner);
    }
}
