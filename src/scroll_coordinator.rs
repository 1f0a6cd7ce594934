use crate::lock;
use listcore::Identified;
use listcore::scroll::should_autoscroll;
use log::debug;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum ScrollError {
    #[error("list view is no longer attached")]
    Detached,

    #[error("scroll unavailable: {0}")]
    Unavailable(String),
}

/// The scrollable view a coordinator drives.
pub trait ScrollSurface: Send + Sync {
    fn scroll_to_start(&self) -> Result<(), ScrollError>;
}

/// Scrolls a newest-first list to its start when the local user sends a
/// message.
pub struct ScrollCoordinator {
    local_actor_id: String,
    settle_delay: Duration,
    surface: Arc<dyn ScrollSurface>,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for ScrollCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScrollCoordinator")
            .field("local_actor_id", &self.local_actor_id)
            .field("settle_delay", &self.settle_delay)
            .field("pending", &self.has_pending())
            .finish()
    }
}

impl ScrollCoordinator {
    pub fn new(
        local_actor_id: impl Into<String>,
        settle_delay: Duration,
        surface: Arc<dyn ScrollSurface>,
    ) -> Self {
        Self {
            local_actor_id: local_actor_id.into(),
            settle_delay,
            surface,
            pending: Mutex::new(None),
        }
    }

    pub fn local_actor_id(&self) -> &str {
        &self.local_actor_id
    }

    /// Request a scroll if `new` starts with a message the local user just
    /// sent. Returns whether a scroll was requested.
    pub fn evaluate<A, B>(&self, old: &[A], new: &[B]) -> bool
    where
        A: Identified,
        B: Identified,
    {
        if !should_autoscroll(old, new, &self.local_actor_id) {
            return false;
        }
        self.request_scroll();
        true
    }

    /// Scroll after the settle delay, replacing any request still waiting.
    pub fn request_scroll(&self) {
        let surface = Arc::clone(&self.surface);

        let Ok(handle) = Handle::try_current() else {
            debug!(target: "ChatList/Scroll", "No runtime for settle delay; scrolling now");
            scroll(surface.as_ref());
            return;
        };

        let delay = self.settle_delay;
        let task = handle.spawn(async move {
            tokio::time::sleep(delay).await;
            scroll(surface.as_ref());
        });

        if let Some(previous) = lock(&self.pending).replace(task) {
            previous.abort();
        }
    }

    pub fn has_pending(&self) -> bool {
        lock(&self.pending)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    pub fn teardown(&self) {
        if let Some(task) = lock(&self.pending).take() {
            task.abort();
        }
    }
}

impl Drop for ScrollCoordinator {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn scroll(surface: &dyn ScrollSurface) {
    match surface.scroll_to_start() {
        Ok(()) => debug!(target: "ChatList/Scroll", "Scrolled to start"),
        Err(e) => debug!(target: "ChatList/Scroll", "Ignoring scroll failure: {e}"),
    }
}
