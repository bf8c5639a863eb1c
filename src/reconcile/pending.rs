//! Actions carried over between reconciliation cycles.

use std::{slice::Iter, vec::IntoIter};

use {
    serde::{Deserialize, Serialize},
    tracing::{debug, trace},
};

use crate::reconcile::action::Action;

/// Incomplete actions deferred to the next cycle.
///
/// Owned by the caller between cycles and moved into each cycle by value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PendingActionSet(Vec<Action>);

impl PendingActionSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of deferred actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nothing is deferred.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the deferred actions in order.
    pub fn iter(&self) -> Iter<'_, Action> {
        self.0.iter()
    }
}

impl From<Vec<Action>> for PendingActionSet {
    fn from(actions: Vec<Action>) -> Self {
        Self(actions)
    }
}

impl IntoIterator for PendingActionSet {
    type Item = Action;
    type IntoIter = IntoIter<Action>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Splits out actions that are still in progress.
///
/// # Arguments
///
/// * `actions` - Squashed actions of the cycle.
///
/// # Returns
///
/// The ready actions and the pending set for the next cycle, both in their
/// original relative order.
pub fn separate_pending_actions(actions: Vec<Action>) -> (Vec<Action>, PendingActionSet) {
    trace!("Reserve actions in progress for next flush...");

    let (pending, ready): (Vec<Action>, Vec<Action>) =
        actions.into_iter().partition(Action::is_wip);
    for action in &pending {
        debug!("Incomplete action: {}", action.describe());
    }
    (ready, PendingActionSet(pending))
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use serde_json::{from_str, to_string};

    use crate::reconcile::{
        action::{Action, Entry, Removal},
        pending::{PendingActionSet, separate_pending_actions},
    };

    fn add(path: &str, wip: bool) -> Action {
        Action::AddFile(Entry {
            path: PathBuf::from(path),
            ino: None,
            stats: None,
            checksum: None,
            wip,
        })
    }

    #[test]
    fn test_separate_preserves_order() {
        let actions = vec![
            add("/1", true),
            add("/2", false),
            add("/3", true),
            Action::DeleteFile(Removal {
                path: PathBuf::from("/4"),
                ino: None,
                wip: false,
            }),
        ];
        let (ready, pending) = separate_pending_actions(actions);

        let ready: Vec<&Path> = ready.iter().map(Action::path).collect();
        assert_eq!(ready, vec![Path::new("/2"), Path::new("/4")]);

        let pending: Vec<&Path> = pending.iter().map(Action::path).collect();
        assert_eq!(pending, vec![Path::new("/1"), Path::new("/3")]);
    }

    #[test]
    fn test_pending_set_serializes_as_list() {
        let pending = PendingActionSet::from(vec![add("/f", true)]);
        let json = to_string(&pending).unwrap();
        assert!(json.starts_with('['));

        let decoded: PendingActionSet = from_str(&json).unwrap();
        assert_eq!(decoded, pending);
        assert_eq!(decoded.len(), 1);
    }
}
