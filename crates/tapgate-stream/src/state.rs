//! Per-connection session state machine.
//!
//! # States and transitions
//!
//! ```text
//! Connecting ──► Streaming ──► Closed
//!     │                          ▲
//!     └──────────────────────────┘
//! ```
//!
//! Within `Streaming` the adapter alternates between waiting and silently
//! re-arming after timeouts; those are not modeled as distinct states
//! because they carry no externally observable difference. `Closed` is
//! reachable from every state via client disconnect or fatal transport
//! error, and is terminal.

use serde::{Deserialize, Serialize};
use std::fmt;

use tapgate_core::{Error, Result};

/// Lifecycle state of one session stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Stream accepted, `connected` event not yet delivered.
    Connecting,

    /// Wait loop running; matches and heartbeats flow to the client.
    Streaming,

    /// Terminal. Entered on match delivery, client disconnect, or fatal
    /// transport error.
    Closed,
}

impl SessionState {
    /// Whether a transition to `next` is allowed.
    #[must_use]
    pub fn can_transition_to(self, next: SessionState) -> bool {
        matches!(
            (self, next),
            (SessionState::Connecting, SessionState::Streaming)
                | (SessionState::Connecting, SessionState::Closed)
                | (SessionState::Streaming, SessionState::Closed)
        )
    }

    /// Validated transition.
    ///
    /// # Errors
    /// Returns `Error::InvalidStateTransition` when the transition is not
    /// part of the lifecycle above (including any transition out of
    /// `Closed`).
    pub fn transition_to(self, next: SessionState) -> Result<SessionState> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(Error::InvalidStateTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }

    /// Whether this state is terminal.
    #[must_use]
    pub fn is_closed(self) -> bool {
        matches!(self, SessionState::Closed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::Streaming => write!(f, "streaming"),
            SessionState::Closed => write!(f, "closed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(SessionState::Connecting, SessionState::Streaming, true)]
    #[case(SessionState::Connecting, SessionState::Closed, true)]
    #[case(SessionState::Streaming, SessionState::Closed, true)]
    #[case(SessionState::Streaming, SessionState::Connecting, false)]
    #[case(SessionState::Closed, SessionState::Streaming, false)]
    #[case(SessionState::Closed, SessionState::Connecting, false)]
    fn test_transitions(
        #[case] from: SessionState,
        #[case] to: SessionState,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.can_transition_to(to), allowed);
        assert_eq!(from.transition_to(to).is_ok(), allowed);
    }

    #[test]
    fn test_closed_is_terminal() {
        assert!(SessionState::Closed.is_closed());
        assert!(!SessionState::Streaming.is_closed());
    }
}
