//! Sliding preload window for paged image galleries.

use std::collections::BTreeSet;

/// Default number of neighbours decoded on each side of the current page.
pub const DEFAULT_PRELOAD_DISTANCE: usize = 1;

/// Indices `i` with `max(0, center - radius) <= i <= min(len - 1, center + radius)`.
///
/// Empty when `len` is zero or the center lies so far past the end that the
/// window does not overlap the sequence.
pub fn compute_window(center: usize, radius: usize, len: usize) -> BTreeSet<usize> {
    if len == 0 {
        return BTreeSet::new();
    }
    let start = center.saturating_sub(radius);
    let end = center.saturating_add(radius).min(len - 1);
    if start > end {
        return BTreeSet::new();
    }
    (start..=end).collect()
}

/// A window position: `center` plus `radius` pages either side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreloadWindow {
    pub center: usize,
    pub radius: usize,
}

impl PreloadWindow {
    pub fn new(center: usize, radius: usize) -> Self {
        Self { center, radius }
    }

    pub fn indices(&self, len: usize) -> BTreeSet<usize> {
        compute_window(self.center, self.radius, len)
    }

    pub fn contains(&self, index: usize, len: usize) -> bool {
        index < len && index.abs_diff(self.center) <= self.radius
    }

    /// Indices of `held` that fall outside this window.
    pub fn outside<'a, I>(&self, held: I, len: usize) -> BTreeSet<usize>
    where
        I: IntoIterator<Item = &'a usize>,
    {
        held.into_iter()
            .copied()
            .filter(|index| !self.contains(*index, len))
            .collect()
    }
}
