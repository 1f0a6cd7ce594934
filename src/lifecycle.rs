use crate::budget::ImageMemoryBudget;
use crate::lock;
use log::info;
use serde::Serialize;
use std::sync::{Arc, Mutex, Weak};

/// A component that sheds memory when the app goes to the background.
pub trait LifecycleAware: Send + Sync {
    fn on_background(&self);

    fn on_foreground(&self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LifecycleMode {
    Normal,
    /// Backgrounded: caches are emptied and galleries skip grace periods.
    Aggressive,
}

/// Fans app lifecycle and memory-pressure events out to registered
/// components.
pub struct AppLifecycle {
    mode: Mutex<LifecycleMode>,
    participants: Mutex<Vec<Weak<dyn LifecycleAware>>>,
    budget: Arc<ImageMemoryBudget>,
}

impl std::fmt::Debug for AppLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppLifecycle")
            .field("mode", &self.mode())
            .field("participants", &self.participant_count())
            .finish_non_exhaustive()
    }
}

impl AppLifecycle {
    pub fn new(budget: Arc<ImageMemoryBudget>) -> Self {
        Self {
            mode: Mutex::new(LifecycleMode::Normal),
            participants: Mutex::new(Vec::new()),
            budget,
        }
    }

    pub fn register(&self, participant: Weak<dyn LifecycleAware>) {
        let mut participants = lock(&self.participants);
        participants.retain(|p| p.strong_count() > 0);
        participants.push(participant);
    }

    pub fn mode(&self) -> LifecycleMode {
        *lock(&self.mode)
    }

    pub fn participant_count(&self) -> usize {
        lock(&self.participants)
            .iter()
            .filter(|p| p.strong_count() > 0)
            .count()
    }

    fn live(&self) -> Vec<Arc<dyn LifecycleAware>> {
        let mut participants = lock(&self.participants);
        participants.retain(|p| p.strong_count() > 0);
        participants.iter().filter_map(Weak::upgrade).collect()
    }

    pub fn on_background(&self) {
        *lock(&self.mode) = LifecycleMode::Aggressive;
        let participants = self.live();
        info!(
            target: "ChatList/Lifecycle",
            "App backgrounded, trimming {} components",
            participants.len()
        );
        for participant in participants {
            participant.on_background();
        }
    }

    pub fn on_foreground(&self) {
        *lock(&self.mode) = LifecycleMode::Normal;
        info!(target: "ChatList/Lifecycle", "App foregrounded");
        for participant in self.live() {
            participant.on_foreground();
        }
    }

    pub fn on_memory_pressure(&self) {
        self.budget.on_pressure_signal();
    }
}
