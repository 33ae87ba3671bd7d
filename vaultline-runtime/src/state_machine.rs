//! Operation state machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Phase of a single backup or restore invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationState {
    /// Request accepted and validated
    Requested,

    /// Lease held on the operation's scope
    LeaseHeld,

    /// Label reserved and ledger record written
    LabelAssigned,

    /// Engine accepted the operation
    Dispatched,

    /// Waiting on the engine for a terminal state
    Polling,

    Finished,

    Failed,
}

impl OperationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationState::Requested => "REQUESTED",
            OperationState::LeaseHeld => "LEASE_HELD",
            OperationState::LabelAssigned => "LABEL_ASSIGNED",
            OperationState::Dispatched => "DISPATCHED",
            OperationState::Polling => "POLLING",
            OperationState::Finished => "FINISHED",
            OperationState::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OperationState::Finished | OperationState::Failed)
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks one operation through its phases
pub struct StateMachine {
    current_state: OperationState,
    state_history: Vec<(OperationState, DateTime<Utc>)>,
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            current_state: OperationState::Requested,
            state_history: vec![(OperationState::Requested, Utc::now())],
        }
    }

    pub fn current_state(&self) -> OperationState {
        self.current_state
    }

    /// Transition to a new state
    pub fn transition(&mut self, new_state: OperationState) -> Result<(), String> {
        if !self.is_valid_transition(new_state) {
            return Err(format!(
                "Invalid transition from {} to {}",
                self.current_state, new_state
            ));
        }

        self.current_state = new_state;
        self.state_history.push((new_state, Utc::now()));

        Ok(())
    }

    fn is_valid_transition(&self, new_state: OperationState) -> bool {
        use OperationState::*;

        match (self.current_state, new_state) {
            (Requested, LeaseHeld) => true,
            (LeaseHeld, LabelAssigned) => true,
            (LabelAssigned, Dispatched) => true,
            (Dispatched, Polling) => true,
            // Chained restores dispatch once per step
            (Polling, Dispatched) => true,
            (Polling, Finished) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }

    pub fn history(&self) -> &[(OperationState, DateTime<Utc>)] {
        &self.state_history
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let sm = StateMachine::new();
        assert_eq!(sm.current_state(), OperationState::Requested);
    }

    #[test]
    fn test_happy_path() {
        let mut sm = StateMachine::new();
        for state in [
            OperationState::LeaseHeld,
            OperationState::LabelAssigned,
            OperationState::Dispatched,
            OperationState::Polling,
            OperationState::Finished,
        ] {
            sm.transition(state).unwrap();
        }
        assert_eq!(sm.history().len(), 6);
    }

    #[test]
    fn test_cannot_skip_lease() {
        let mut sm = StateMachine::new();
        assert!(sm.transition(OperationState::Dispatched).is_err());
    }

    #[test]
    fn test_failed_is_final() {
        let mut sm = StateMachine::new();
        sm.transition(OperationState::LeaseHeld).unwrap();
        sm.transition(OperationState::Failed).unwrap();
        assert!(sm.transition(OperationState::Failed).is_err());
        assert!(sm.transition(OperationState::LabelAssigned).is_err());
    }
}
