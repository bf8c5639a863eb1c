//! Collapses descendant moves into their ancestor folder move.

use std::{cmp::Ordering, path::PathBuf};

use tracing::{debug, trace};

use crate::reconcile::{
    action::{Action, Move},
    sorter::path_cmp,
};

/// Orders moves first, by destination path, and keeps every other action in
/// its original relative order after them.
pub fn sort_before_squash(actions: &mut [Action]) {
    trace!("Sort actions before squash...");
    actions.sort_by(|a, b| match (a.as_move(), b.as_move()) {
        (Some(a), Some(b)) => path_cmp(&a.path, &b.path),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}

/// How a move relates to an enclosing folder move.
enum Descendant {
    /// Same relative path before and after: implied by the ancestor move.
    Redundant,
    /// Moved somewhere else inside the ancestor. `rebased_old` is where the
    /// entry sits once the ancestor move has been applied.
    Nested { rebased_old: PathBuf },
}

fn descendant_of(ancestor: &Move, candidate: &Move) -> Option<Descendant> {
    let new_offset = candidate.path.strip_prefix(&ancestor.path).ok()?;
    let old_offset = candidate.old.path.strip_prefix(&ancestor.old.path).ok()?;
    if new_offset.as_os_str().is_empty() || old_offset.as_os_str().is_empty() {
        return None;
    }

    if new_offset == old_offset {
        Some(Descendant::Redundant)
    } else {
        Some(Descendant::Nested {
            rebased_old: ancestor.path.join(old_offset),
        })
    }
}

/// Removes moves made redundant by an ancestor folder move.
///
/// Expects the order produced by [`sort_before_squash`]. A descendant still in
/// progress keeps its ancestor in progress too.
pub fn squash_moves(actions: &mut Vec<Action>) {
    trace!("Squash moves...");

    let mut i = 0;
    while i < actions.len() && actions[i].is_move() {
        let mut j = i + 1;
        while j < actions.len() {
            let descendant = match (&actions[i], actions[j].as_move()) {
                (_, None) => break,
                (Action::MoveFolder(ancestor), Some(candidate)) => {
                    descendant_of(ancestor, candidate)
                }
                _ => None,
            };

            match descendant {
                Some(Descendant::Redundant) => {
                    let squashed = actions.remove(j);
                    debug!("Squashing descendant move {}", squashed.describe());
                    if squashed.is_wip() {
                        actions[i].set_wip(true);
                    }
                    continue;
                }
                Some(Descendant::Nested { rebased_old }) => {
                    let mut wip = false;
                    if let Some(nested) = actions[j].as_move_mut() {
                        debug!(
                            "Move inside move: {:?} -> {:?} (source now {:?})",
                            nested.old.path, nested.path, rebased_old
                        );
                        nested.old.path = rebased_old;
                        nested.need_refetch = true;
                        wip = nested.wip;
                    }
                    if wip {
                        actions[i].set_wip(true);
                    }
                }
                None => {}
            }
            j += 1;
        }
        i += 1;
    }
}
