//! Endpoint lifecycle state.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of one endpoint runtime.
///
/// `Connecting → Open → Closed`, or `Connecting → Closed` when the connect
/// fails. `Closed` is terminal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointState {
    /// Transport connect in progress.
    #[default]
    Connecting,
    /// Transport connected; sends and dispatch are live.
    Open,
    /// Terminal. No sends succeed and no dispatch occurs.
    Closed,
}

impl EndpointState {
    /// Whether sends are currently accepted.
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }

    /// Whether the state is terminal.
    pub const fn is_closed(self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Whether `self → next` is a legal transition.
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Connecting, Self::Open | Self::Closed) | (Self::Open, Self::Closed)
        )
    }
}

impl fmt::Display for EndpointState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_connecting() {
        assert_eq!(EndpointState::default(), EndpointState::Connecting);
    }

    #[test]
    fn legal_transitions() {
        use EndpointState::{Closed, Connecting, Open};
        assert!(Connecting.can_transition_to(Open));
        assert!(Connecting.can_transition_to(Closed));
        assert!(Open.can_transition_to(Closed));
    }

    #[test]
    fn nothing_leaves_closed() {
        use EndpointState::{Closed, Connecting, Open};
        for next in [Connecting, Open, Closed] {
            assert!(!Closed.can_transition_to(next));
        }
    }

    #[test]
    fn no_reconnect_in_place() {
        assert!(!EndpointState::Open.can_transition_to(EndpointState::Connecting));
    }

    #[test]
    fn display_is_lowercase() {
        assert_eq!(EndpointState::Open.to_string(), "open");
        assert_eq!(
            serde_json::to_string(&EndpointState::Closed).unwrap(),
            "\"closed\""
        );
    }
}
