// update.rs — Per-goal update policy, packed into one byte.

use std::fmt;
use std::ops::BitOr;

/// Which of a goal's in-edge actions must run for the goal to be reached.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateActions {
    /// Every action must run.
    All,
    /// Every action whose pre-timestamps indicate change must run.
    Some,
    /// One changed action suffices.
    Any,
    /// Exactly one action may be changed; it is run.
    One,
}

/// Update policy of a [`Goal`](crate::Goal): a two-bit actions selector plus
/// an ordering bit. Modes compose with `|`, e.g.
/// `UpdateMode::ALL_ACTIONS | UpdateMode::UNORDERED`.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateMode(u8);

impl UpdateMode {
    /// All actions must be run to reach the goal. This is the default.
    pub const ALL_ACTIONS: UpdateMode = UpdateMode(0);
    /// All actions with changed state must be run to reach the goal.
    pub const SOME_ACTIONS: UpdateMode = UpdateMode(1);
    /// Only one of the actions with changed state has to be run.
    pub const ANY_ACTION: UpdateMode = UpdateMode(2);
    /// Only one action may have changed state; the goal is reached by
    /// running that action.
    pub const ONE_ACTION: UpdateMode = UpdateMode(3);
    /// Actions of the goal may run in any order, or even concurrently.
    /// Without this bit they run one after the other in registered order.
    pub const UNORDERED: UpdateMode = UpdateMode(4);

    const ACTIONS_MASK: u8 = 3;

    pub fn actions(self) -> UpdateActions {
        match self.0 & Self::ACTIONS_MASK {
            0 => UpdateActions::All,
            1 => UpdateActions::Some,
            2 => UpdateActions::Any,
            _ => UpdateActions::One,
        }
    }

    pub fn ordered(self) -> bool {
        self.0 & Self::UNORDERED.0 == 0
    }
}

impl BitOr for UpdateMode {
    type Output = UpdateMode;

    fn bitor(self, rhs: UpdateMode) -> UpdateMode {
        UpdateMode(self.0 | rhs.0)
    }
}

impl fmt::Debug for UpdateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "UpdateMode({:?}, {})",
            self.actions(),
            if self.ordered() { "ordered" } else { "unordered" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_all_ordered() {
        let m = UpdateMode::default();
        assert_eq!(m.actions(), UpdateActions::All);
        assert!(m.ordered());
    }

    #[test]
    fn unordered_bit_composes_with_every_selector() {
        for (mode, actions) in [
            (UpdateMode::ALL_ACTIONS, UpdateActions::All),
            (UpdateMode::SOME_ACTIONS, UpdateActions::Some),
            (UpdateMode::ANY_ACTION, UpdateActions::Any),
            (UpdateMode::ONE_ACTION, UpdateActions::One),
        ] {
            let m = mode | UpdateMode::UNORDERED;
            assert_eq!(m.actions(), actions);
            assert!(!m.ordered());
            assert!(mode.ordered());
        }
    }
}
