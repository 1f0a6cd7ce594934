//! Byte accounting for decoded images.
//!
//! [`MemoryBudget`] is plain arithmetic. The process-wide instance, listener
//! registration and pressure handling live in the runtime crate.

use serde::Serialize;

pub const BYTES_PER_MB: u64 = 1024 * 1024;

/// Default ceiling for decoded image memory.
pub const DEFAULT_CEILING_BYTES: u64 = 150 * BYTES_PER_MB;

/// Read-only snapshot of a budget.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BudgetStats {
    pub total_usage: u64,
    pub ceiling: u64,
    pub usage_percentage: f64,
}

/// Running total of reserved bytes against a ceiling.
///
/// `reserve` never fails: usage may sit above the ceiling until the owner of
/// the memory evicts. `release` clamps at zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryBudget {
    current: u64,
    ceiling: u64,
}

impl Default for MemoryBudget {
    fn default() -> Self {
        Self::new(DEFAULT_CEILING_BYTES)
    }
}

impl MemoryBudget {
    pub fn new(ceiling: u64) -> Self {
        Self {
            current: 0,
            ceiling,
        }
    }

    pub fn with_ceiling_mb(megabytes: u64) -> Self {
        Self::new(megabytes.saturating_mul(BYTES_PER_MB))
    }

    /// True iff `current + bytes <= ceiling`.
    pub fn can_reserve(&self, bytes: u64) -> bool {
        self.current.saturating_add(bytes) <= self.ceiling
    }

    pub fn reserve(&mut self, bytes: u64) {
        self.current = self.current.saturating_add(bytes);
    }

    /// Give back `bytes`. Releasing more than is reserved clamps to zero and
    /// returns `false`, which points at a double release by the caller.
    pub fn release(&mut self, bytes: u64) -> bool {
        match self.current.checked_sub(bytes) {
            Some(remaining) => {
                self.current = remaining;
                true
            }
            None => {
                log::warn!(
                    target: "ChatList/Budget",
                    "Released {bytes} bytes with only {} reserved; clamping to zero",
                    self.current
                );
                self.current = 0;
                false
            }
        }
    }

    pub fn reset(&mut self) {
        self.current = 0;
    }

    pub fn set_ceiling(&mut self, ceiling: u64) {
        self.ceiling = ceiling;
    }

    pub fn current(&self) -> u64 {
        self.current
    }

    pub fn ceiling(&self) -> u64 {
        self.ceiling
    }

    pub fn is_over_ceiling(&self) -> bool {
        self.current > self.ceiling
    }

    /// Bytes above the ceiling, zero when within budget.
    pub fn excess(&self) -> u64 {
        self.current.saturating_sub(self.ceiling)
    }

    pub fn stats(&self) -> BudgetStats {
        let usage_percentage = if self.ceiling == 0 {
            0.0
        } else {
            self.current as f64 / self.ceiling as f64 * 100.0
        };
        BudgetStats {
            total_usage: self.current,
            ceiling: self.ceiling,
            usage_percentage,
        }
    }
}
