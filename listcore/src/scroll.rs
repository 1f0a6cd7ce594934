//! Auto-scroll decision for newest-first message lists.

use crate::identity::Identified;

/// Position of the first real message. Index 0 is reserved for a leading
/// spacer (typing indicator, composer padding) in newest-first lists.
pub const ANCHOR_INDEX: usize = 1;

/// Whether the view should jump to the start after `old` became `new`.
///
/// Fires only when the anchor item changed identity and the new anchor was
/// authored by `local_actor_id`, i.e. the local user just sent it. Edits of
/// existing items and messages from other actors never scroll.
pub fn should_autoscroll<A, B>(old: &[A], new: &[B], local_actor_id: &str) -> bool
where
    A: Identified,
    B: Identified,
{
    let Some(anchor) = new.get(ANCHOR_INDEX) else {
        return false;
    };
    let changed = old
        .get(ANCHOR_INDEX)
        .is_none_or(|previous| previous.id() != anchor.id());

    changed && anchor.author_id() == Some(local_actor_id)
}
