//! Probe Cycle State Machine
//!
//! Defines the valid transitions of one dial → request → response cycle.
//! The machine always comes back to `Idle`; there is no terminal state.

use std::fmt;

/// States of a single test cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    /// Between cycles
    Idle,
    /// TCP connect in progress
    Dialing,
    /// Writing the request
    Sending,
    /// Waiting for the first response byte
    Waiting,
    /// Forwarding response lines to the operator
    Draining,
    /// Reporting a failed cycle
    Failed,
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CycleState::Idle => "idle",
            CycleState::Dialing => "dialing",
            CycleState::Sending => "sending",
            CycleState::Waiting => "waiting",
            CycleState::Draining => "draining",
            CycleState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Events that can trigger state transitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleEvent {
    /// Interval elapsed, a new cycle begins
    CycleStarted,
    /// TCP connection established
    DialSucceeded,
    /// TCP connection could not be established
    DialFailed,
    /// Request fully written
    RequestSent,
    /// Writing the request failed
    SendFailed,
    /// First response byte is available
    FirstByteArrived,
    /// No response byte before the deadline
    ResponseTimedOut,
    /// Peer closed before sending anything
    PeerClosed,
    /// Response drained and connection closed
    DrainComplete,
    /// Failure diagnosis emitted and connection (if any) closed
    ReportEmitted,
}

/// Result of a state transition attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionResult {
    /// Transition was valid and state changed
    Success(CycleState),
    /// Transition was invalid from current state
    Invalid { from: CycleState, event: CycleEvent },
}

/// Tracks the current phase of the probe cycle
#[derive(Debug)]
pub struct CycleStateMachine {
    current_state: CycleState,
    cycles_started: u64,
}

impl Default for CycleStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl CycleStateMachine {
    /// Create a new state machine in Idle state
    pub fn new() -> Self {
        Self {
            current_state: CycleState::Idle,
            cycles_started: 0,
        }
    }

    /// Get current state
    pub fn state(&self) -> CycleState {
        self.current_state
    }

    /// Number of cycles begun so far
    pub fn cycles_started(&self) -> u64 {
        self.cycles_started
    }

    /// Process an event and return the transition result
    pub fn process_event(&mut self, event: CycleEvent) -> TransitionResult {
        match self.get_next_state(&event) {
            Some(state) => {
                if event == CycleEvent::CycleStarted {
                    self.cycles_started += 1;
                }
                self.current_state = state;
                TransitionResult::Success(state)
            }
            None => TransitionResult::Invalid {
                from: self.current_state,
                event,
            },
        }
    }

    /// Get the next state for a given event, if the transition is valid
    fn get_next_state(&self, event: &CycleEvent) -> Option<CycleState> {
        use CycleEvent::*;
        use CycleState::*;

        match (self.current_state, event) {
            (Idle, CycleStarted) => Some(Dialing),

            (Dialing, DialSucceeded) => Some(Sending),
            (Dialing, DialFailed) => Some(Failed),

            (Sending, RequestSent) => Some(Waiting),
            (Sending, SendFailed) => Some(Failed),

            (Waiting, FirstByteArrived) => Some(Draining),
            (Waiting, ResponseTimedOut | PeerClosed) => Some(Failed),

            (Draining, DrainComplete) => Some(Idle),

            (Failed, ReportEmitted) => Some(Idle),

            _ => None,
        }
    }
}

/// Check if a transition from one state to another is generally valid
pub fn is_valid_transition(from: CycleState, to: CycleState) -> bool {
    use CycleState::*;

    matches!(
        (from, to),
        (Idle, Dialing)
            | (Dialing, Sending)
            | (Dialing, Failed)
            | (Sending, Waiting)
            | (Sending, Failed)
            | (Waiting, Draining)
            | (Waiting, Failed)
            | (Draining, Idle)
            | (Failed, Idle)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let fsm = CycleStateMachine::new();
        assert_eq!(fsm.state(), CycleState::Idle);
        assert_eq!(fsm.cycles_started(), 0);
    }

    #[test]
    fn test_responded_cycle() {
        let mut fsm = CycleStateMachine::new();

        for (event, expected) in [
            (CycleEvent::CycleStarted, CycleState::Dialing),
            (CycleEvent::DialSucceeded, CycleState::Sending),
            (CycleEvent::RequestSent, CycleState::Waiting),
            (CycleEvent::FirstByteArrived, CycleState::Draining),
            (CycleEvent::DrainComplete, CycleState::Idle),
        ] {
            assert_eq!(fsm.process_event(event), TransitionResult::Success(expected));
        }
        assert_eq!(fsm.cycles_started(), 1);
    }

    #[test]
    fn test_connect_failure_returns_to_idle() {
        let mut fsm = CycleStateMachine::new();
        fsm.process_event(CycleEvent::CycleStarted);

        let result = fsm.process_event(CycleEvent::DialFailed);
        assert_eq!(result, TransitionResult::Success(CycleState::Failed));

        let result = fsm.process_event(CycleEvent::ReportEmitted);
        assert_eq!(result, TransitionResult::Success(CycleState::Idle));
    }

    #[test]
    fn test_timeout_returns_to_idle() {
        let mut fsm = CycleStateMachine::new();
        fsm.process_event(CycleEvent::CycleStarted);
        fsm.process_event(CycleEvent::DialSucceeded);
        fsm.process_event(CycleEvent::RequestSent);

        assert_eq!(
            fsm.process_event(CycleEvent::ResponseTimedOut),
            TransitionResult::Success(CycleState::Failed)
        );
        assert_eq!(
            fsm.process_event(CycleEvent::ReportEmitted),
            TransitionResult::Success(CycleState::Idle)
        );
    }

    #[test]
    fn test_invalid_transition() {
        let mut fsm = CycleStateMachine::new();

        // Cannot drain without having dialed
        let result = fsm.process_event(CycleEvent::FirstByteArrived);
        assert!(matches!(result, TransitionResult::Invalid { from: CycleState::Idle, .. }));
        assert_eq!(fsm.state(), CycleState::Idle);
        assert_eq!(fsm.cycles_started(), 0);
    }

    #[test]
    fn test_cycles_are_counted() {
        let mut fsm = CycleStateMachine::new();
        for _ in 0..3 {
            fsm.process_event(CycleEvent::CycleStarted);
            fsm.process_event(CycleEvent::DialFailed);
            fsm.process_event(CycleEvent::ReportEmitted);
        }
        assert_eq!(fsm.cycles_started(), 3);
        assert_eq!(fsm.state(), CycleState::Idle);
    }

    #[test]
    fn test_transition_table() {
        assert!(is_valid_transition(CycleState::Idle, CycleState::Dialing));
        assert!(is_valid_transition(CycleState::Waiting, CycleState::Failed));
        assert!(!is_valid_transition(CycleState::Idle, CycleState::Draining));
        assert!(!is_valid_transition(CycleState::Failed, CycleState::Dialing));
    }
}
