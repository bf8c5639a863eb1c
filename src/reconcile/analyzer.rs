//! Correlation of raw events into actions.
//!
//! Events are processed in delivery order against a working set of actions
//! indexed by inode and by path. A deletion and a creation sharing an inode
//! become one move, whichever side is observed first.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use tracing::{debug, error, trace, warn};

use crate::{
    error::domain::ReconcileError,
    reconcile::{
        action::{Action, Removal},
        event::{EventKind, RawEvent},
        factory::{self, MoveKind},
        pending::PendingActionSet,
    },
};

/// Actions of one cycle, addressable by inode and by path.
///
/// Slots are never removed. An action replaced under its inode key stays in
/// `slots` but is no longer reachable from `by_inode`, so it is not emitted.
#[derive(Debug, Default)]
struct WorkingSet {
    slots: Vec<Action>,
    by_inode: HashMap<u64, usize>,
    by_path: HashMap<PathBuf, usize>,
    /// Actions without inode, in insertion order.
    unkeyed: Vec<usize>,
}

impl WorkingSet {
    fn push(&mut self, action: Action) {
        let index = self.slots.len();
        self.by_path.insert(action.path().to_path_buf(), index);
        match action.ino() {
            Some(ino) => {
                self.by_inode.insert(ino, index);
            }
            None => self.unkeyed.push(index),
        }
        self.slots.push(action);
    }

    fn push_by_path(&mut self, action: Action) {
        let index = self.slots.len();
        self.by_path.insert(action.path().to_path_buf(), index);
        self.unkeyed.push(index);
        self.slots.push(action);
    }

    fn slot_by_inode(&self, ino: Option<u64>) -> Option<usize> {
        ino.and_then(|ino| self.by_inode.get(&ino).copied())
    }

    fn slot_by_path(&self, path: &Path) -> Option<usize> {
        self.by_path.get(path).copied()
    }

    /// Forgets the action in `index`, so it is not emitted.
    fn cancel(&mut self, index: usize) {
        let action = &self.slots[index];
        if let Some(ino) = action.ino() {
            self.by_inode.remove(&ino);
        }
        if self.by_path.get(action.path()) == Some(&index) {
            self.by_path.remove(action.path());
        }
        self.unkeyed.retain(|&unkeyed| unkeyed != index);
    }

    fn double_observation(&self, event: RawEvent, index: usize) -> ReconcileError {
        let action = self.slots[index].clone();
        ReconcileError::DoubleObservation {
            ino: action.ino().unwrap_or_default(),
            event: Box::new(event),
            action: Box::new(action),
        }
    }

    fn on_add(&mut self, event: RawEvent) -> Result<(), ReconcileError> {
        if let Some(index) = self.slot_by_inode(event.inode()) {
            match &mut self.slots[index] {
                Action::MoveFile(mv) if !mv.wip => {
                    error!(
                        "Add event for {:?} while move {:?} -> {:?} is already complete",
                        event.path, mv.old.path, mv.path
                    );
                    return Err(self.double_observation(event, index));
                }
                Action::MoveFile(mv) => {
                    mv.path = event.path;
                    mv.stats = event.stats;
                    mv.checksum = event.checksum;
                    mv.wip = false;
                    debug!(
                        ino = mv.ino,
                        "File move completing: {:?} -> {:?}", mv.old.path, mv.path
                    );
                    self.by_path.insert(mv.path.clone(), index);
                    return Ok(());
                }
                Action::DeleteFile(deleted) => {
                    let action = factory::move_after_delete(MoveKind::File, &event, deleted);
                    debug!(
                        ino = deleted.ino,
                        "File moved: {:?} -> {:?}", deleted.path, event.path
                    );
                    self.push(action);
                    return Ok(());
                }
                _ => {}
            }
        }

        self.push(factory::from_event(&event));
        Ok(())
    }

    fn on_add_dir(&mut self, event: RawEvent) -> Result<(), ReconcileError> {
        if let Some(index) = self.slot_by_inode(event.inode()) {
            match &mut self.slots[index] {
                Action::MoveFolder(mv) if !mv.wip => {
                    error!(
                        "AddDir event for {:?} while move {:?} -> {:?} is already complete",
                        event.path, mv.old.path, mv.path
                    );
                    return Err(self.double_observation(event, index));
                }
                Action::MoveFolder(mv) => {
                    mv.path = event.path;
                    mv.stats = event.stats;
                    mv.wip = false;
                    debug!(
                        ino = mv.ino,
                        "Folder move completing: {:?} -> {:?}", mv.old.path, mv.path
                    );
                    self.by_path.insert(mv.path.clone(), index);
                    return Ok(());
                }
                Action::DeleteFolder(deleted) => {
                    let action = factory::move_after_delete(MoveKind::Folder, &event, deleted);
                    debug!(
                        ino = deleted.ino,
                        "Folder moved: {:?} -> {:?}", deleted.path, event.path
                    );
                    self.push(action);
                    return Ok(());
                }
                _ => {}
            }
        }

        self.push(factory::from_event(&event));
        Ok(())
    }

    fn on_change(&mut self, event: RawEvent) {
        let action = factory::from_event(&event);
        if let Some(index) = self.slot_by_path(&event.path)
            && matches!(self.slots[index], Action::UpdateFile(_))
        {
            trace!("Refreshing update of {:?}", event.path);
            self.slots[index] = action;
            return;
        }
        self.push_by_path(action);
    }

    fn on_unlink(&mut self, event: RawEvent) -> Result<(), ReconcileError> {
        let ino = event.inode();
        if let Some(index) = self.slot_by_inode(ino) {
            match &self.slots[index] {
                Action::MoveFile(mv) => {
                    error!(
                        "Unlink event for {:?} while move {:?} -> {:?} is pending",
                        event.path, mv.old.path, mv.path
                    );
                    return Err(self.double_observation(event, index));
                }
                Action::AddFile(added) if added.path == event.path => {
                    debug!(ino = added.ino, "File created then deleted: {:?}", event.path);
                    self.cancel(index);
                    return Ok(());
                }
                Action::AddFile(added) => {
                    let action = factory::move_after_add(MoveKind::File, added, &event);
                    debug!(ino = added.ino, "File moved: {:?} -> {:?}", event.path, added.path);
                    self.push(action);
                    return Ok(());
                }
                _ => {}
            }
        }

        if ino.is_some() {
            self.push(factory::from_event(&event));
            return Ok(());
        }

        if let Some(index) = self.slot_by_path(&event.path)
            && let Action::MoveFile(mv) = &self.slots[index]
            && mv.checksum.is_none()
        {
            debug!(
                ino = mv.ino,
                "File was moved then deleted. Deleting origin {:?} directly.", mv.old.path
            );
            let removal = Removal {
                path: mv.old.path.clone(),
                ino: mv.ino,
                wip: false,
            };
            self.slots[index] = Action::DeleteFile(removal);
        } else {
            debug!("Dropping unlink event without inode: {:?}", event.path);
        }
        Ok(())
    }

    fn on_unlink_dir(&mut self, event: RawEvent) -> Result<(), ReconcileError> {
        let ino = event.inode();
        if let Some(index) = self.slot_by_inode(ino) {
            match &self.slots[index] {
                Action::MoveFolder(mv) => {
                    error!(
                        "UnlinkDir event for {:?} while move {:?} -> {:?} is pending",
                        event.path, mv.old.path, mv.path
                    );
                    return Err(self.double_observation(event, index));
                }
                Action::PutFolder(added) if added.path == event.path => {
                    debug!(ino = added.ino, "Folder created then deleted: {:?}", event.path);
                    self.cancel(index);
                    return Ok(());
                }
                Action::PutFolder(added) => {
                    let action = factory::move_after_add(MoveKind::Folder, added, &event);
                    debug!(
                        ino = added.ino,
                        "Folder moved: {:?} -> {:?}", event.path, added.path
                    );
                    self.push(action);
                    return Ok(());
                }
                _ => {}
            }
        }

        if ino.is_some() {
            self.push(factory::from_event(&event));
            return Ok(());
        }

        if let Some(index) = self.slot_by_path(&event.path)
            && let Action::MoveFolder(mv) = &self.slots[index]
        {
            debug!(
                ino = mv.ino,
                "Folder was moved then deleted. Deleting origin {:?} directly.", mv.old.path
            );
            let removal = Removal {
                path: mv.old.path.clone(),
                ino: mv.ino,
                wip: false,
            };
            self.slots[index] = Action::DeleteFolder(removal);
        } else {
            debug!("Dropping unlinkDir event without inode: {:?}", event.path);
        }
        Ok(())
    }

    /// Unkeyed actions in insertion order, then inode-keyed actions in
    /// creation order.
    fn into_actions(self) -> Vec<Action> {
        let mut keyed: Vec<usize> = self.by_inode.into_values().collect();
        keyed.sort_unstable();

        let mut slots: Vec<Option<Action>> = self.slots.into_iter().map(Some).collect();
        self.unkeyed
            .into_iter()
            .chain(keyed)
            .filter_map(|index| slots[index].take())
            .collect()
    }
}

/// Turns a batch of events, plus the actions carried over from the previous
/// cycle, into actions.
///
/// # Arguments
///
/// * `events` - Annotated events of the batch, in delivery order.
/// * `pending` - Actions left incomplete by the previous cycle. They are
///   processed first, so events of this batch can complete them.
///
/// # Returns
///
/// The unsorted actions of the cycle, incomplete ones included.
///
/// # Errors
///
/// Returns `ReconcileError::DoubleObservation` when an inode is seen both in
/// an in-progress move and in a fresh event that cannot belong to it.
pub fn analyze_events(
    events: Vec<RawEvent>,
    pending: PendingActionSet,
) -> Result<Vec<Action>, ReconcileError> {
    let mut set = WorkingSet::default();

    if !pending.is_empty() {
        warn!("Prepend {} pending action(s)", pending.len());
        for action in pending {
            set.push(action);
        }
    }

    trace!("Analyze events...");
    for event in events {
        let path = event.path.clone();
        let result = match event.kind {
            EventKind::Add => set.on_add(event),
            EventKind::AddDir => set.on_add_dir(event),
            EventKind::Change => {
                set.on_change(event);
                Ok(())
            }
            EventKind::Unlink => set.on_unlink(event),
            EventKind::UnlinkDir => set.on_unlink_dir(event),
        };
        if let Err(e) = result {
            error!("Aborting cycle on {:?}: {}", path, e);
            return Err(e);
        }
    }

    trace!("Flatten actions map...");
    Ok(set.into_actions())
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use crate::{
        error::domain::ReconcileError,
        reconcile::{
            action::Action,
            analyzer::analyze_events,
            event::{EventKind, RawEvent},
            pending::PendingActionSet,
        },
    };

    fn add(path: &str, ino: u64) -> RawEvent {
        RawEvent::new(EventKind::Add, path)
            .with_ino(ino)
            .with_checksum("sum")
    }

    fn unlink(path: &str, ino: u64) -> RawEvent {
        RawEvent::new(EventKind::Unlink, path).with_ino(ino)
    }

    #[test]
    fn test_unlink_then_add_is_a_move() {
        let actions =
            analyze_events(vec![unlink("/old/f", 7), add("/new/f", 7)], PendingActionSet::new())
                .unwrap();

        assert_eq!(actions.len(), 1);
        let mv = actions[0].as_move_file().unwrap();
        assert_eq!(mv.old.path, Path::new("/old/f"));
        assert_eq!(mv.path, Path::new("/new/f"));
    }

    #[test]
    fn test_add_then_unlink_is_a_move() {
        let actions =
            analyze_events(vec![add("/new/f", 7), unlink("/old/f", 7)], PendingActionSet::new())
                .unwrap();

        assert_eq!(actions.len(), 1);
        let mv = actions[0].as_move_file().unwrap();
        assert_eq!(mv.old.path, Path::new("/old/f"));
        assert_eq!(mv.path, Path::new("/new/f"));
        assert_eq!(mv.checksum.as_deref(), Some("sum"));
    }

    #[test]
    fn test_file_created_then_deleted_leaves_nothing() {
        let actions = analyze_events(
            vec![add("/4913", 5).in_progress(), unlink("/4913", 5)],
            PendingActionSet::new(),
        )
        .unwrap();
        assert!(actions.is_empty());

        // A later file reusing the inode is a plain addition.
        let actions = analyze_events(vec![add("/4913", 5)], PendingActionSet::new()).unwrap();
        assert_eq!(actions.len(), 1);
        assert!(actions[0].as_add_file().is_some());
    }

    #[test]
    fn test_folder_created_then_deleted_leaves_nothing() {
        let events = vec![
            RawEvent::new(EventKind::AddDir, "/tmp-dir").with_ino(4),
            RawEvent::new(EventKind::UnlinkDir, "/tmp-dir").with_ino(4),
        ];
        assert!(analyze_events(events, PendingActionSet::new()).unwrap().is_empty());
    }

    #[test]
    fn test_folder_pairs_become_folder_moves() {
        let events = vec![
            RawEvent::new(EventKind::UnlinkDir, "/a").with_ino(1),
            RawEvent::new(EventKind::AddDir, "/b").with_ino(1),
        ];
        let actions = analyze_events(events, PendingActionSet::new()).unwrap();

        assert_eq!(actions.len(), 1);
        let mv = actions[0].as_move_folder().unwrap();
        assert_eq!(mv.old.path, Path::new("/a"));
        assert_eq!(mv.path, Path::new("/b"));
    }

    #[test]
    fn test_wip_move_is_completed_by_pending_carry_over() {
        let first = analyze_events(
            vec![unlink("/old/f", 7), add("/new/f", 7).in_progress()],
            PendingActionSet::new(),
        )
        .unwrap();
        assert!(first[0].is_wip());

        let pending = PendingActionSet::from(first);
        let second = analyze_events(vec![add("/final/f", 7)], pending).unwrap();

        assert_eq!(second.len(), 1);
        let mv = second[0].as_move_file().unwrap();
        assert!(!mv.wip);
        assert_eq!(mv.path, Path::new("/final/f"));
        assert_eq!(mv.old.path, Path::new("/old/f"));
    }

    #[test]
    fn test_add_on_completed_move_is_fatal() {
        let events = vec![unlink("/a", 7), add("/b", 7), add("/c", 7)];
        let error = analyze_events(events, PendingActionSet::new()).unwrap_err();

        let ReconcileError::DoubleObservation { ino, event, action } = error else {
            panic!("expected a double observation");
        };
        assert_eq!(ino, 7);
        assert_eq!(event.path, Path::new("/c"));
        assert!(matches!(*action, Action::MoveFile(_)));
    }

    #[test]
    fn test_unlink_on_pending_move_is_fatal() {
        let events = vec![unlink("/a", 7), add("/b", 7), unlink("/b", 7)];
        let error = analyze_events(events, PendingActionSet::new()).unwrap_err();
        assert!(matches!(error, ReconcileError::DoubleObservation { ino: 7, .. }));
    }

    #[test]
    fn test_moved_then_deleted_collapses_to_delete_of_origin() {
        let events = vec![
            unlink("/a", 7),
            RawEvent::new(EventKind::Add, "/b").with_ino(7).in_progress(),
            RawEvent::new(EventKind::Unlink, "/b"),
        ];
        let actions = analyze_events(events, PendingActionSet::new()).unwrap();

        assert_eq!(actions.len(), 1);
        let removal = actions[0].as_delete_file().unwrap();
        assert_eq!(removal.path, Path::new("/a"));
        assert!(!removal.wip);
    }

    #[test]
    fn test_moved_folder_then_deleted_collapses() {
        let events = vec![
            RawEvent::new(EventKind::UnlinkDir, "/a").with_ino(3),
            RawEvent::new(EventKind::AddDir, "/b").with_ino(3),
            RawEvent::new(EventKind::UnlinkDir, "/b"),
        ];
        let actions = analyze_events(events, PendingActionSet::new()).unwrap();

        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].as_delete_folder().unwrap().path, Path::new("/a"));
    }

    #[test]
    fn test_unlink_without_inode_or_match_is_dropped() {
        let events = vec![
            RawEvent::new(EventKind::Unlink, "/ghost"),
            RawEvent::new(EventKind::UnlinkDir, "/ghost-dir"),
        ];
        let actions = analyze_events(events, PendingActionSet::new()).unwrap();
        assert!(actions.is_empty());
    }

    #[test]
    fn test_changes_are_path_keyed() {
        let events = vec![
            add("/f", 5),
            RawEvent::new(EventKind::Change, "/f")
                .with_ino(5)
                .with_checksum("one"),
            RawEvent::new(EventKind::Change, "/f")
                .with_ino(5)
                .with_checksum("two"),
        ];
        let actions = analyze_events(events, PendingActionSet::new()).unwrap();

        assert_eq!(actions.len(), 2);
        let Action::UpdateFile(update) = &actions[0] else {
            panic!("expected the update first");
        };
        assert_eq!(update.checksum.as_deref(), Some("two"));
        assert!(matches!(actions[1], Action::AddFile(_)));
    }

    #[test]
    fn test_plain_events_without_correlation() {
        let events = vec![
            RawEvent::new(EventKind::AddDir, "/dir").with_ino(1),
            add("/dir/f", 2),
            unlink("/gone", 3),
        ];
        let actions = analyze_events(events, PendingActionSet::new()).unwrap();

        let kinds: Vec<&str> = actions.iter().map(Action::kind_name).collect();
        assert_eq!(kinds, vec!["PutFolder", "AddFile", "DeleteFile"]);
    }
}
