//! Change reconciliation: raw filesystem events in, ordered actions out.
//!
//! One cycle runs the analyzer over a batch (plus the actions deferred by the
//! previous cycle), squashes descendant moves, sets incomplete actions aside
//! for the next cycle and sorts the rest for sequential application.

pub mod action;
pub mod analyzer;
pub mod event;
pub mod factory;
pub mod pending;
pub mod sorter;
pub mod squash;

use tracing::debug;

use crate::error::domain::ReconcileError;

pub use {
    action::{Action, Entry, Move, Removal},
    analyzer::analyze_events,
    event::{EventKind, Identity, RawEvent, Stats},
    pending::{PendingActionSet, separate_pending_actions},
    sorter::{compare_actions, final_sort},
    squash::{sort_before_squash, squash_moves},
};

/// Outcome of one reconciliation cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciled {
    /// Ready actions, in application order, none of them in progress.
    pub actions: Vec<Action>,
    /// Actions to hand to the next cycle.
    pub pending: PendingActionSet,
}

/// Runs one reconciliation cycle.
///
/// # Arguments
///
/// * `events` - Annotated events of the batch.
/// * `pending` - Set returned by the previous cycle.
///
/// # Returns
///
/// The ordered actions and the pending set for the next cycle.
///
/// # Errors
///
/// Returns `ReconcileError` if the batch contradicts itself. Nothing from
/// the batch is emitted in that case.
pub fn sort_and_squash(
    events: Vec<RawEvent>,
    pending: PendingActionSet,
) -> Result<Reconciled, ReconcileError> {
    let mut actions = analyze_events(events, pending)?;
    sort_before_squash(&mut actions);
    squash_moves(&mut actions);
    let (mut actions, pending) = separate_pending_actions(actions);
    final_sort(&mut actions);

    debug!("Identified {} change(s).", actions.len());
    Ok(Reconciled { actions, pending })
}

/// Runs successive cycles, carrying the pending set between them.
#[derive(Debug, Default)]
pub struct Reconciler {
    pending: PendingActionSet,
}

impl Reconciler {
    /// Creates a reconciler with nothing pending.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconciles one batch.
    ///
    /// # Arguments
    ///
    /// * `events` - Annotated events of the batch.
    ///
    /// # Returns
    ///
    /// The ordered, complete actions of the batch.
    ///
    /// # Errors
    ///
    /// Returns `ReconcileError` if the batch is aborted. The pending set from
    /// before the batch is kept so a later batch can still complete it.
    pub fn process(&mut self, events: Vec<RawEvent>) -> Result<Vec<Action>, ReconcileError> {
        let Reconciled { actions, pending } = sort_and_squash(events, self.pending.clone())?;
        self.pending = pending;
        Ok(actions)
    }

    /// Actions currently waiting for their completing event.
    #[must_use]
    pub fn pending(&self) -> &PendingActionSet {
        &self.pending
    }
}
