/// Optimistic UI toggle (watchlist heart, quick-bid arm).
/// Instead of an ad hoc boolean plus loading flag, the control is a
/// tagged state, so the rollback on a failed server call is one explicit
/// transition instead of scattered flag juggling.
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ToggleState {
    /// Settled; nothing in flight.
    Idle { on: bool },
    /// Flipped locally, server call in flight. Displays the target value.
    Pending { prev: bool, next: bool },
    /// Server agreed with the flip.
    Committed { on: bool },
    /// Server refused; displays the restored previous value.
    RolledBack { on: bool },
}

#[derive(Debug, Clone, Copy)]
pub struct OptimisticToggle {
    state: ToggleState,
}

impl OptimisticToggle {
    pub fn new(on: bool) -> Self {
        Self {
            state: ToggleState::Idle { on },
        }
    }

    pub fn state(&self) -> ToggleState {
        self.state
    }

    /// The value the UI should show right now.
    pub fn displayed(&self) -> bool {
        match self.state {
            ToggleState::Idle { on }
            | ToggleState::Committed { on }
            | ToggleState::RolledBack { on } => on,
            ToggleState::Pending { next, .. } => next,
        }
    }

    /// Flip optimistically; returns the value to send to the server.
    /// Refused while a flip is already in flight.
    pub fn begin(&mut self) -> Option<bool> {
        match self.state {
            ToggleState::Idle { on }
            | ToggleState::Committed { on }
            | ToggleState::RolledBack { on } => {
                self.state = ToggleState::Pending {
                    prev: on,
                    next: !on,
                };
                Some(!on)
            }
            ToggleState::Pending { .. } => None,
        }
    }

    /// The server accepted the in-flight flip.
    pub fn commit(&mut self) {
        if let ToggleState::Pending { next, .. } = self.state {
            self.state = ToggleState::Committed { on: next };
        }
    }

    /// The server refused; restore what the user saw before the flip.
    pub fn rollback(&mut self) {
        if let ToggleState::Pending { prev, .. } = self.state {
            self.state = ToggleState::RolledBack { on: prev };
        }
    }
}

// region:    --- Tests
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_flips_the_displayed_value_immediately() {
        let mut toggle = OptimisticToggle::new(false);
        assert_eq!(toggle.begin(), Some(true));
        assert!(toggle.displayed());
        assert!(matches!(
            toggle.state(),
            ToggleState::Pending {
                prev: false,
                next: true
            }
        ));
    }

    #[test]
    fn commit_settles_on_the_new_value() {
        let mut toggle = OptimisticToggle::new(false);
        toggle.begin();
        toggle.commit();
        assert_eq!(toggle.state(), ToggleState::Committed { on: true });
        assert!(toggle.displayed());
    }

    #[test]
    fn rollback_restores_the_previous_value() {
        let mut toggle = OptimisticToggle::new(true);
        toggle.begin();
        assert!(!toggle.displayed());
        toggle.rollback();
        assert_eq!(toggle.state(), ToggleState::RolledBack { on: true });
        assert!(toggle.displayed());
    }

    #[test]
    fn overlapping_flips_are_refused() {
        let mut toggle = OptimisticToggle::new(false);
        assert!(toggle.begin().is_some());
        assert!(toggle.begin().is_none());
        toggle.commit();
        // Settled again; the next flip proceeds.
        assert_eq!(toggle.begin(), Some(false));
    }

    #[test]
    fn commit_and_rollback_outside_pending_are_inert() {
        let mut toggle = OptimisticToggle::new(true);
        toggle.commit();
        toggle.rollback();
        assert_eq!(toggle.state(), ToggleState::Idle { on: true });
    }
}
// endregion: --- Tests
