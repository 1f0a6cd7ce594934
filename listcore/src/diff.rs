//! Set-based diffing of id sequences.
//!
//! `added = new − old` and `removed = old − new`. Order inside a sequence does
//! not matter and content changes never show up as add/remove.
//!
//! [`DiffRequest`] / [`DiffResponse`] are the messages exchanged with a
//! background worker: owned data in, one owned result out.

use crate::identity::{Identified, extract_ids};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Ids that appeared and disappeared between two list versions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffResult {
    pub added: HashSet<String>,
    pub removed: HashSet<String>,
}

impl DiffResult {
    /// True when neither side changed membership.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    /// Total number of ids that changed membership.
    pub fn change_count(&self) -> usize {
        self.added.len() + self.removed.len()
    }
}

/// Diff two id lists.
pub fn diff_ids<S: AsRef<str>>(old_ids: &[S], new_ids: &[S]) -> DiffResult {
    let old: HashSet<&str> = old_ids.iter().map(AsRef::as_ref).collect();
    let new: HashSet<&str> = new_ids.iter().map(AsRef::as_ref).collect();

    DiffResult {
        added: new.difference(&old).map(|id| id.to_string()).collect(),
        removed: old.difference(&new).map(|id| id.to_string()).collect(),
    }
}

/// Diff two item sequences by id.
pub fn diff_items<A: Identified, B: Identified>(old: &[A], new: &[B]) -> DiffResult {
    let old_ids: Vec<&str> = old.iter().map(|item| item.id()).collect();
    let new_ids: Vec<&str> = new.iter().map(|item| item.id()).collect();
    diff_ids(&old_ids, &new_ids)
}

/// Work item sent to a background diff worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffRequest {
    /// Request number assigned by the dispatcher; echoed in the response.
    pub generation: u64,
    pub old_ids: Vec<String>,
    pub new_ids: Vec<String>,
}

impl DiffRequest {
    /// Snapshot the ids of both sequences so the request owns all its data.
    pub fn from_items<A: Identified, B: Identified>(generation: u64, old: &[A], new: &[B]) -> Self {
        Self {
            generation,
            old_ids: extract_ids(old),
            new_ids: extract_ids(new),
        }
    }

    /// Run the diff. This is what the worker executes.
    pub fn compute(self) -> DiffResponse {
        let result = diff_ids(&self.old_ids, &self.new_ids);
        DiffResponse {
            generation: self.generation,
            result,
        }
    }
}

/// The single reply a worker sends back for a [`DiffRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffResponse {
    pub generation: u64,
    pub result: DiffResult,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::MessageRef;

    fn ids(range: std::ops::Range<usize>) -> Vec<String> {
        range.map(|i| format!("msg-{i}")).collect()
    }

    fn set(values: &[&str]) -> HashSet<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_added_and_removed_are_set_differences() {
        let old = vec!["a", "b", "c"];
        let new = vec!["b", "c", "d", "e"];
        let diff = diff_ids(&old, &new);
        assert_eq!(diff.added, set(&["d", "e"]));
        assert_eq!(diff.removed, set(&["a"]));
        assert_eq!(diff.change_count(), 3);
    }

    #[test]
    fn test_identical_input_is_empty() {
        let items = ids(0..50);
        let diff = diff_ids(&items, &items);
        assert!(diff.is_empty());
    }

    #[test]
    fn test_reordering_is_not_a_change() {
        let old = ids(0..10);
        let mut new = old.clone();
        new.reverse();
        assert!(diff_ids(&old, &new).is_empty());
    }

    #[test]
    fn test_pure_growth_only_adds() {
        let old = ids(0..100);
        let new = ids(0..1000);
        let diff = diff_ids(&old, &new);
        assert_eq!(diff.added.len(), 900);
        assert!(diff.removed.is_empty());
        assert!(!diff.added.contains("msg-5"));
        assert!(diff.added.contains("msg-999"));
    }

    #[test]
    fn test_request_compute_matches_inline_diff() {
        let old: Vec<MessageRef> = (0..20).map(|i| MessageRef::new(format!("{i}"), "a")).collect();
        let new: Vec<MessageRef> = (5..30).map(|i| MessageRef::new(format!("{i}"), "b")).collect();

        let response = DiffRequest::from_items(7, &old, &new).compute();
        assert_eq!(response.generation, 7);
        assert_eq!(response.result, diff_items(&old, &new));
        assert_eq!(response.result.added.len(), 10);
        assert_eq!(response.result.removed.len(), 5);
    }
}
