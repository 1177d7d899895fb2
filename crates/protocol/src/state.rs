//! Client lifecycle state machine
//!
//! State transitions:
//! ```text
//! OPEN ──→ CLOSING ──→ CLOSED
//!   (close / terminal read or write error)
//! ```
//!
//! `Closed` is terminal. There is no way back to `Open`.

use crate::error::StateError;

/// Lifecycle state of one accepted connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientState {
    /// Accepted and registered, receive loop running
    #[default]
    Open,

    /// First close requested, transport teardown in progress
    Closing,

    /// Transport closed; the client is leaving or has left its registry
    Closed,
}

impl ClientState {
    /// Validates a state transition
    pub fn can_transition_to(&self, next: ClientState) -> bool {
        use ClientState::*;

        matches!((self, next), (Open, Closing) | (Closing, Closed))
    }

    /// Attempts to transition to a new state
    pub fn transition_to(&mut self, next: ClientState) -> Result<(), StateError> {
        if self.can_transition_to(next) {
            *self = next;
            Ok(())
        } else {
            Err(StateError {
                from: *self,
                to: next,
            })
        }
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        matches!(self, ClientState::Open)
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        matches!(self, ClientState::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_open() {
        assert_eq!(ClientState::default(), ClientState::Open);
        assert!(ClientState::default().is_open());
    }

    #[test]
    fn test_forward_transitions() {
        let mut state = ClientState::Open;
        assert!(state.transition_to(ClientState::Closing).is_ok());
        assert!(!state.is_open());
        assert!(state.transition_to(ClientState::Closed).is_ok());
        assert!(state.is_closed());
    }

    #[test]
    fn test_closed_is_terminal() {
        let mut state = ClientState::Closed;
        let err = state.transition_to(ClientState::Open).unwrap_err();
        assert_eq!(err.from, ClientState::Closed);
        assert_eq!(err.to, ClientState::Open);
        assert!(state.transition_to(ClientState::Closing).is_err());
        assert!(state.is_closed());
    }

    #[test]
    fn test_cannot_skip_closing() {
        let mut state = ClientState::Open;
        assert!(state.transition_to(ClientState::Closed).is_err());
        assert!(state.is_open());
    }

    #[test]
    fn test_no_self_transitions() {
        assert!(!ClientState::Open.can_transition_to(ClientState::Open));
        assert!(!ClientState::Closing.can_transition_to(ClientState::Closing));
    }
}
