//! Process-wide accounting of decoded image memory.

use crate::lock;
use log::{debug, info};
use once_cell::sync::Lazy;
use std::sync::{Arc, Mutex, Weak};

pub use listcore::budget::{BYTES_PER_MB, BudgetStats, DEFAULT_CEILING_BYTES, MemoryBudget};

/// Something holding decoded images that can drop them all on demand.
pub trait MemoryPressureListener: Send + Sync {
    /// Drop held images and `release` the bytes reserved for them, in the
    /// same critical section that removes them.
    fn on_memory_pressure(&self);
}

static GLOBAL: Lazy<Arc<ImageMemoryBudget>> = Lazy::new(|| Arc::new(ImageMemoryBudget::default()));

/// The budget shared by every image cache in the process.
pub fn global() -> Arc<ImageMemoryBudget> {
    Arc::clone(&GLOBAL)
}

/// Thread-safe [`MemoryBudget`] plus the listeners to notify under pressure.
#[derive(Default)]
pub struct ImageMemoryBudget {
    inner: Mutex<MemoryBudget>,
    listeners: Mutex<Vec<Weak<dyn MemoryPressureListener>>>,
}

impl std::fmt::Debug for ImageMemoryBudget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageMemoryBudget")
            .field("budget", &*lock(&self.inner))
            .field("listeners", &lock(&self.listeners).len())
            .finish()
    }
}

impl ImageMemoryBudget {
    pub fn new(ceiling_bytes: u64) -> Self {
        Self {
            inner: Mutex::new(MemoryBudget::new(ceiling_bytes)),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn with_ceiling_mb(megabytes: u64) -> Self {
        Self::new(megabytes.saturating_mul(BYTES_PER_MB))
    }

    pub fn can_reserve(&self, bytes: u64) -> bool {
        lock(&self.inner).can_reserve(bytes)
    }

    /// Always succeeds; usage may exceed the ceiling until someone evicts.
    pub fn reserve(&self, bytes: u64) {
        lock(&self.inner).reserve(bytes);
    }

    pub fn release(&self, bytes: u64) {
        lock(&self.inner).release(bytes);
    }

    pub fn set_ceiling(&self, ceiling_bytes: u64) {
        lock(&self.inner).set_ceiling(ceiling_bytes);
    }

    pub fn current(&self) -> u64 {
        lock(&self.inner).current()
    }

    pub fn ceiling(&self) -> u64 {
        lock(&self.inner).ceiling()
    }

    pub fn is_over_ceiling(&self) -> bool {
        lock(&self.inner).is_over_ceiling()
    }

    pub fn stats(&self) -> BudgetStats {
        lock(&self.inner).stats()
    }

    pub fn register(&self, listener: Weak<dyn MemoryPressureListener>) {
        let mut listeners = lock(&self.listeners);
        listeners.retain(|l| l.strong_count() > 0);
        listeners.push(listener);
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.listeners)
            .iter()
            .filter(|l| l.strong_count() > 0)
            .count()
    }

    /// Have every live listener drop its images and give their bytes back.
    ///
    /// Each listener releases exactly what it removes, so an insert racing
    /// with the signal stays accounted for. Bytes reserved directly on the
    /// budget by a non-listener are left to their owner.
    pub fn on_pressure_signal(&self) {
        let before = self.current();
        let live: Vec<Arc<dyn MemoryPressureListener>> = {
            let mut listeners = lock(&self.listeners);
            listeners.retain(|l| l.strong_count() > 0);
            listeners.iter().filter_map(Weak::upgrade).collect()
        };

        for listener in &live {
            listener.on_memory_pressure();
        }
        let after = self.current();
        info!(
            target: "ChatList/Budget",
            "Memory pressure: {} caches freed {:.1} MB, {:.1} MB still reserved",
            live.len(),
            before.saturating_sub(after) as f64 / BYTES_PER_MB as f64,
            after as f64 / BYTES_PER_MB as f64
        );
    }

    /// Zero the counter and forget all listeners. Only for tests sharing the
    /// process-wide instance.
    pub fn reset_for_testing(&self) {
        lock(&self.inner).reset();
        lock(&self.listeners).clear();
        debug!(target: "ChatList/Budget", "Budget reset");
    }
}
