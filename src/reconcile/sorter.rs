//! Final ordering of ready actions.
//!
//! Applying the sorted actions one after the other never needs a path that
//! has not been created yet, and never removes a folder before what it
//! contains. Those constraints are dependency edges between actions; the
//! actions are then emitted in dependency order, ties going to
//! [`compare_actions`].

use std::{
    cmp::{Ordering, Reverse},
    collections::{BinaryHeap, HashMap},
    path::Path,
};

use tracing::{trace, warn};

use crate::reconcile::action::Action;

/// Orders paths by their byte representation.
///
/// A path sorts before every path below it.
#[must_use]
pub fn path_cmp(a: &Path, b: &Path) -> Ordering {
    a.as_os_str()
        .as_encoded_bytes()
        .cmp(b.as_os_str().as_encoded_bytes())
}

fn option_path_cmp(a: Option<&Path>, b: Option<&Path>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => path_cmp(a, b),
        (a, b) => a.is_some().cmp(&b.is_some()),
    }
}

/// Compares two actions with no dependency between them.
///
/// Actions creating something come first, by ascending creation path. Pure
/// deletions follow, by descending path so children go before parents. This
/// is a total order.
#[must_use]
pub fn compare_actions(a: &Action, b: &Action) -> Ordering {
    match (a.add_path(), b.add_path()) {
        (Some(a_add), Some(b_add)) => path_cmp(a_add, b_add)
            .then_with(|| option_path_cmp(a.del_path(), b.del_path())),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => option_path_cmp(b.del_path(), a.del_path()),
    }
}

/// Proper ancestors of `path`, closest first.
fn ancestors(path: &Path) -> impl Iterator<Item = &Path> {
    path.ancestors().skip(1)
}

/// Indices registered under `path`.
fn indices<'m>(
    map: &'m HashMap<&Path, Vec<usize>>,
    path: &Path,
) -> impl Iterator<Item = usize> + 'm {
    map.get(path).into_iter().flatten().copied()
}

/// `edges[i]` lists the actions that can only be applied after action `i`.
///
/// * The creation of a folder precedes whatever is created below it.
/// * Whatever is removed from below a folder goes before the folder's own
///   removal.
/// * A path is freed before something else takes it.
/// * A created folder precedes the removal of an entry below it, unless that
///   folder or one of its ancestors is itself removed: the entry then belongs
///   to the folder's previous incarnation. Moves rebased under their moved
///   parent rely on this one.
fn dependencies(actions: &[Action]) -> Vec<Vec<usize>> {
    let mut creators: HashMap<&Path, Vec<usize>> = HashMap::new();
    let mut removers: HashMap<&Path, Vec<usize>> = HashMap::new();
    for (index, action) in actions.iter().enumerate() {
        if let Some(path) = action.add_path() {
            creators.entry(path).or_default().push(index);
        }
        if let Some(path) = action.del_path() {
            removers.entry(path).or_default().push(index);
        }
    }
    let recreated = |path: &Path| path.ancestors().any(|p| removers.contains_key(p));

    let mut edges = vec![Vec::new(); actions.len()];
    for (index, action) in actions.iter().enumerate() {
        if let Some(add) = action.add_path() {
            for parent in ancestors(add) {
                for before in indices(&creators, parent) {
                    edges[before].push(index);
                }
            }
            for before in indices(&removers, add) {
                edges[before].push(index);
            }
        }
        if let Some(del) = action.del_path() {
            for parent in ancestors(del) {
                for after in indices(&removers, parent) {
                    edges[index].push(after);
                }
                if !recreated(parent) {
                    for before in indices(&creators, parent) {
                        edges[before].push(index);
                    }
                }
            }
        }
    }

    for (index, after) in edges.iter_mut().enumerate() {
        after.retain(|&other| other != index);
    }
    edges
}

/// Action ready to be applied, ordered for a min-heap.
struct Ready<'a> {
    action: &'a Action,
    index: usize,
}

impl Ord for Ready<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_actions(self.action, other.action).then(self.index.cmp(&other.index))
    }
}

impl PartialOrd for Ready<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Ready<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ready<'_> {}

/// Indices of `actions` in application order.
fn application_order(actions: &[Action]) -> Vec<usize> {
    let edges = dependencies(actions);
    let mut waiting_on = vec![0usize; actions.len()];
    for after in edges.iter().flatten() {
        waiting_on[*after] += 1;
    }

    let mut queued = vec![false; actions.len()];
    let mut ready = BinaryHeap::new();
    for (index, action) in actions.iter().enumerate() {
        if waiting_on[index] == 0 {
            queued[index] = true;
            ready.push(Reverse(Ready { action, index }));
        }
    }

    let mut order = Vec::with_capacity(actions.len());
    while order.len() < actions.len() {
        let Some(Reverse(Ready { index, .. })) = ready.pop() else {
            // Every remaining action waits on another one: a cycle, such as
            // two entries swapping places. Break it at the smallest action.
            let Some(index) = (0..actions.len())
                .filter(|&index| !queued[index])
                .min_by(|&a, &b| compare_actions(&actions[a], &actions[b]).then(a.cmp(&b)))
            else {
                break;
            };
            warn!(
                "Dependency cycle, applying {} first",
                actions[index].describe()
            );
            queued[index] = true;
            ready.push(Reverse(Ready {
                action: &actions[index],
                index,
            }));
            continue;
        };

        order.push(index);
        for &after in &edges[index] {
            waiting_on[after] = waiting_on[after].saturating_sub(1);
            if waiting_on[after] == 0 && !queued[after] {
                queued[after] = true;
                ready.push(Reverse(Ready {
                    action: &actions[after],
                    index: after,
                }));
            }
        }
    }
    order
}

/// Sorts ready actions for sequential application.
///
/// Independent actions keep the [`compare_actions`] order, and equal ones
/// their relative order, so sorting a sorted list changes nothing.
pub fn final_sort(actions: &mut Vec<Action>) {
    trace!("Final sort...");
    let order = application_order(actions.as_slice());

    let mut slots: Vec<Option<Action>> = actions.drain(..).map(Some).collect();
    actions.extend(order.into_iter().filter_map(|index| slots[index].take()));
}
