//! Stable identity helpers for item sequences.
//!
//! The list core never looks at message content. Everything it needs from an
//! item is the stable id (and, for scroll decisions, the author id), exposed
//! through the [`Identified`] trait.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// An item with a stable identifier that survives re-renders.
pub trait Identified {
    /// The stable id used for add/remove detection.
    fn id(&self) -> &str;

    /// Id of the actor who authored the item, if the item has one.
    fn author_id(&self) -> Option<&str> {
        None
    }
}

impl Identified for String {
    fn id(&self) -> &str {
        self
    }
}

impl Identified for str {
    fn id(&self) -> &str {
        self
    }
}

impl<T: Identified + ?Sized> Identified for &T {
    fn id(&self) -> &str {
        (**self).id()
    }

    fn author_id(&self) -> Option<&str> {
        (**self).author_id()
    }
}

impl<T: Identified + ?Sized> Identified for Box<T> {
    fn id(&self) -> &str {
        (**self).id()
    }

    fn author_id(&self) -> Option<&str> {
        (**self).author_id()
    }
}

impl<T: Identified + ?Sized> Identified for Arc<T> {
    fn id(&self) -> &str {
        (**self).id()
    }

    fn author_id(&self) -> Option<&str> {
        (**self).author_id()
    }
}

/// Minimal owned item: an id plus its author.
///
/// Collaborators with their own message records implement [`Identified`]
/// directly; this type exists for callers that only carry references.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRef {
    pub id: String,
    pub author_id: Option<String>,
}

impl MessageRef {
    pub fn new(id: impl Into<String>, author_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            author_id: Some(author_id.into()),
        }
    }

    /// An item without an author, e.g. a date separator or a typing spacer.
    pub fn anonymous(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            author_id: None,
        }
    }
}

impl Identified for MessageRef {
    fn id(&self) -> &str {
        &self.id
    }

    fn author_id(&self) -> Option<&str> {
        self.author_id.as_deref()
    }
}

/// Ids of `items` in sequence order.
pub fn extract_ids<T: Identified>(items: &[T]) -> Vec<String> {
    items.iter().map(|item| item.id().to_string()).collect()
}

/// The id set of `items`. Duplicate ids collapse into one member.
pub fn id_set<T: Identified>(items: &[T]) -> HashSet<String> {
    items.iter().map(|item| item.id().to_string()).collect()
}

/// Shallow equality by id: same length and the same id at every position.
pub fn shallow_equal<A: Identified, B: Identified>(a: &[A], b: &[B]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.id() == y.id())
}

/// True when both sequences hold the same ids, ignoring order.
pub fn same_members<A: Identified, B: Identified>(a: &[A], b: &[B]) -> bool {
    let left: HashSet<&str> = a.iter().map(|item| item.id()).collect();
    let right: HashSet<&str> = b.iter().map(|item| item.id()).collect();
    left == right
}
