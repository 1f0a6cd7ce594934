// Re-export the runtime-free core
pub use listcore::{
    Identified, MessageRef, decode, diff, error, identity, net, preload, render_cache, scroll,
};

pub mod animation;
pub mod budget;
pub mod config;
pub mod controller;
pub mod diff_engine;
pub mod gallery;
pub mod image_cache;
pub mod lifecycle;
pub mod scroll_coordinator;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a bookkeeping mutex. State behind these locks is updated in single
/// non-panicking steps, so a poisoned lock still holds consistent data.
pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
