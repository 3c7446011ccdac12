//! Counter policy: what each lifecycle transition does to an order's
//! line-number counter.
//!
//! The table is keyed by the transition (create, update towards a target
//! status, delete) and, for updates, by what is known about the counter's
//! current existence. The orchestrator in the infra crate executes the action;
//! this module only decides it.

use crate::order::WorkflowStatus;

/// First line number issued for a brand new order.
pub const FIRST_LINE_NUMBER: i64 = 1;

/// What is known about an order's counter before the transition runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CounterState {
    Live,
    Absent,
    /// Existence was not checked (only done when it changes the outcome).
    Unknown,
}

impl From<bool> for CounterState {
    fn from(exists: bool) -> Self {
        if exists {
            CounterState::Live
        } else {
            CounterState::Absent
        }
    }
}

/// A lifecycle transition of a purchase order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    Create,
    Update {
        target: WorkflowStatus,
        counter: CounterState,
    },
    Delete,
}

impl Transition {
    /// Whether the counter's existence must be probed before deciding.
    pub fn needs_existence_check(self) -> bool {
        matches!(
            self,
            Transition::Update {
                target: WorkflowStatus::Pending,
                counter: CounterState::Unknown,
            }
        )
    }
}

/// Counter action required by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CounterAction {
    /// Create the counter inside the enclosing transaction; failure aborts it.
    Create { start: i64 },
    /// Recreate the counter above the highest line number already assigned.
    RecreateAfterLastAssigned,
    /// Leave the counter untouched.
    Keep,
    /// Drop the counter inside the enclosing transaction, before the row goes.
    DropRequired,
    /// Drop the counter after a successful row update, detached from the caller.
    DropDetached,
    /// Existence must be probed first; re-evaluate with a known state.
    Probe,
}

/// Look up the counter action for a transition.
pub fn counter_action(transition: Transition) -> CounterAction {
    use CounterState::*;
    use WorkflowStatus::*;

    match transition {
        Transition::Create => CounterAction::Create {
            start: FIRST_LINE_NUMBER,
        },
        Transition::Delete => CounterAction::DropRequired,
        Transition::Update { target: Pending, counter: Live } => CounterAction::Keep,
        Transition::Update { target: Pending, counter: Absent } => {
            CounterAction::RecreateAfterLastAssigned
        }
        Transition::Update { target: Pending, counter: Unknown } => CounterAction::Probe,
        Transition::Update { target: Open | Closed, .. } => CounterAction::DropDetached,
    }
}

/// Start value for a recreated counter, strictly above `last_assigned`.
///
/// Negative input (never a valid line number) is treated as "nothing assigned".
pub fn reseed_start(last_assigned: i64) -> i64 {
    last_assigned.max(0).saturating_add(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn update(target: WorkflowStatus, counter: CounterState) -> Transition {
        Transition::Update { target, counter }
    }

    #[test]
    fn create_seeds_at_one() {
        assert_eq!(
            counter_action(Transition::Create),
            CounterAction::Create { start: 1 }
        );
    }

    #[test]
    fn delete_requires_drop() {
        assert_eq!(counter_action(Transition::Delete), CounterAction::DropRequired);
    }

    #[test]
    fn pending_update_depends_on_existence() {
        use CounterState::*;
        use WorkflowStatus::Pending;

        assert_eq!(counter_action(update(Pending, Live)), CounterAction::Keep);
        assert_eq!(
            counter_action(update(Pending, Absent)),
            CounterAction::RecreateAfterLastAssigned
        );
        assert_eq!(counter_action(update(Pending, Unknown)), CounterAction::Probe);
        assert!(update(Pending, Unknown).needs_existence_check());
        assert!(!update(Pending, Absent).needs_existence_check());
    }

    #[test]
    fn finalizing_update_drops_detached_whatever_the_counter_state() {
        for target in [WorkflowStatus::Open, WorkflowStatus::Closed] {
            for counter in [CounterState::Live, CounterState::Absent, CounterState::Unknown] {
                let transition = update(target, counter);
                assert_eq!(counter_action(transition), CounterAction::DropDetached);
                assert!(!transition.needs_existence_check());
            }
        }
    }

    #[test]
    fn reseed_handles_edges() {
        assert_eq!(reseed_start(0), 1);
        assert_eq!(reseed_start(7), 8);
        assert_eq!(reseed_start(-3), 1);
        assert_eq!(reseed_start(i64::MAX), i64::MAX);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: a recreated counter never re-issues an assigned number.
        #[test]
        fn reseed_is_strictly_above_last_assigned(last in 0i64..i64::MAX) {
            prop_assert!(reseed_start(last) > last);
        }
    }
}
