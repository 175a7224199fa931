//! Events a session client emits to its owner.

use duet_protocol::{
    EndReason, ParticipantId, ParticipantNumber, SessionPhase,
};
use serde_json::Value;

/// Socket lifecycle state, tracked independently of the session phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// One event from the session client.
///
/// Framework frames update the client's mirrored state *before* the
/// event is emitted, so a handler reading
/// [`SessionClient::participant_id`](crate::SessionClient::participant_id)
/// inside `SessionJoin` already sees the latched identity. Anything
/// outside the framework vocabulary arrives as [`SessionEvent::App`].
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The socket changed state.
    ConnectionChanged(ConnectionState),
    /// `welcome` arrived; identity and phase are latched.
    SessionJoin {
        participant_id: ParticipantId,
        participant_number: ParticipantNumber,
        session_phase: SessionPhase,
        app_data: Option<Value>,
    },
    /// The second participant was admitted.
    OpponentJoined { app_data: Option<Value> },
    /// The other participant disconnected.
    OpponentLeft,
    /// The session entered the playing phase.
    SessionStart,
    /// The session ended.
    SessionEnd {
        reason: EndReason,
        winner_id: Option<ParticipantId>,
        winner_number: Option<ParticipantNumber>,
        app_data: Option<Value>,
    },
    /// A play-again vote was recorded.
    PlayAgainStatus { voted: usize, total: usize },
    /// The session reset back to waiting.
    SessionReset { app_data: Option<Value> },
    /// A non-fatal server diagnostic.
    ErrorMessage(String),
    /// An application message, shipped through unchanged.
    App(Value),
}
