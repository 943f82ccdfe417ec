//! Device session lifecycle states

use serde::Serialize;

/// Why a session reached its final state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CloseReason {
    /// The device was detached or the relay shut down
    Detached,
    /// The transport reported end of stream
    EndOfStream,
    /// The transport could not be opened or configured
    OpenFailed,
    /// Read failures exhausted the restart policy
    ReadFailed,
    /// Nothing is left to receive fixes
    SinkClosed,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            CloseReason::Detached => "detached",
            CloseReason::EndOfStream => "end of stream",
            CloseReason::OpenFailed => "open failed",
            CloseReason::ReadFailed => "read failed",
            CloseReason::SinkClosed => "sink closed",
        };
        f.write_str(text)
    }
}

/// Lifecycle of one device session.
///
/// ```text
/// Closed -> Opening -> Streaming -> Restarting -> Opening -> ...
///              |           |            |
///              +-----------+------------+--> Terminated(reason)
/// ```
///
/// `Terminated` is final: a terminated session processes no further events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SessionState {
    Closed,
    Opening,
    Streaming,
    Restarting,
    Terminated(CloseReason),
}

impl SessionState {
    pub fn is_terminated(self) -> bool {
        matches!(self, SessionState::Terminated(_))
    }

    /// Whether the session holds (or is acquiring) the transport.
    pub fn is_active(self) -> bool {
        matches!(self, SessionState::Opening | SessionState::Streaming | SessionState::Restarting)
    }

    pub fn close_reason(self) -> Option<CloseReason> {
        match self {
            SessionState::Terminated(reason) => Some(reason),
            _ => None,
        }
    }

    /// Whether the lifecycle permits moving from `self` to `next`.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Terminated(_), _) => false,
            (_, Terminated(_)) => true,
            (Closed, Opening) => true,
            (Opening, Streaming) => true,
            (Streaming, Restarting) => true,
            (Restarting, Opening) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Closed => f.write_str("closed"),
            SessionState::Opening => f.write_str("opening"),
            SessionState::Streaming => f.write_str("streaming"),
            SessionState::Restarting => f.write_str("restarting"),
            SessionState::Terminated(reason) => write!(f, "terminated ({reason})"),
        }
    }
}
