//! # Loading State Machine
//!
//! One mutex guards the state; one condvar wakes every waiter on each change.
//! A thread that loses a transition race waits here for the winner instead
//! of redoing the work.

use parking_lot::{Condvar, Mutex};

use crate::state::LoadingState;

#[derive(Debug)]
struct Cell {
    state: LoadingState,
    /// State that most recently replaced each state.
    left_to: [LoadingState; LoadingState::COUNT],
}

/// Guarded loading state with blocking waits.
#[derive(Debug)]
pub struct StateMachine {
    cell: Mutex<Cell>,
    changed: Condvar,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    /// Starts in [`LoadingState::Unloaded`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_state(LoadingState::Unloaded)
    }

    /// Starts in `state`.
    #[must_use]
    pub fn with_state(state: LoadingState) -> Self {
        Self {
            cell: Mutex::new(Cell {
                state,
                left_to: [state; LoadingState::COUNT],
            }),
            changed: Condvar::new(),
        }
    }

    /// Current state.
    #[inline]
    #[must_use]
    pub fn current(&self) -> LoadingState {
        self.cell.lock().state
    }

    /// Moves `from` to `to` if the state is still `from`.
    ///
    /// # Errors
    ///
    /// Returns the actual state if it is not `from`.
    pub fn try_transition(&self, from: LoadingState, to: LoadingState) -> Result<(), LoadingState> {
        let mut cell = self.cell.lock();
        if cell.state != from {
            return Err(cell.state);
        }
        Self::replace(&mut cell, to);
        drop(cell);
        self.changed.notify_all();
        Ok(())
    }

    /// Sets the state unconditionally and wakes all waiters. Returns the
    /// previous state.
    pub fn set(&self, to: LoadingState) -> LoadingState {
        let mut cell = self.cell.lock();
        let previous = cell.state;
        Self::replace(&mut cell, to);
        drop(cell);
        self.changed.notify_all();
        previous
    }

    /// Blocks until the state is one of `targets`, then returns it.
    ///
    /// # Panics
    ///
    /// Panics if `targets` is empty.
    pub fn await_state(&self, targets: &[LoadingState]) -> LoadingState {
        assert!(!targets.is_empty(), "await_state needs at least one target");
        let mut cell = self.cell.lock();
        while !targets.contains(&cell.state) {
            self.changed.wait(&mut cell);
        }
        cell.state
    }

    /// Blocks while the state is `state`.
    ///
    /// Returns the state that replaced it, or the current state if it was
    /// not `state` on entry.
    pub fn await_leave(&self, state: LoadingState) -> LoadingState {
        let mut cell = self.cell.lock();
        if cell.state != state {
            return cell.state;
        }
        while cell.state == state {
            self.changed.wait(&mut cell);
        }
        cell.left_to[state.index()]
    }

    fn replace(cell: &mut Cell, to: LoadingState) {
        if cell.state != to {
            cell.left_to[cell.state.index()] = to;
        }
        cell.state = to;
    }
}
