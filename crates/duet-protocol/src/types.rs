//! Core protocol types for duet's wire format.
//!
//! Every message on the wire is a single JSON object carrying a `type`
//! tag. The framework vocabulary is closed and defined here; applications
//! extend it compositionally — their own client messages are any tags
//! outside [`ClientFrame::TYPES`], and their payloads ride inside the
//! `appData` field of specific framework frames, opaque to this layer.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A participant's identity within one session.
///
/// Opaque to the framework: the hosting application mints it from the
/// participant number at admission time. Stable for the life of that
/// participant's connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    /// Creates a participant id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for ParticipantId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A participant's slot number: exactly `1` or `2`.
///
/// The newtype validates on construction and on deserialization
/// (`try_from`), so a `ParticipantNumber` in hand is always in range.
/// Serializes as a bare number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct ParticipantNumber(u8);

impl ParticipantNumber {
    /// The first slot.
    pub const ONE: Self = Self(1);
    /// The second slot.
    pub const TWO: Self = Self(2);

    /// Returns the other slot's number.
    pub fn other(self) -> Self {
        if self.0 == 1 { Self::TWO } else { Self::ONE }
    }

    /// Returns the raw number (1 or 2).
    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for ParticipantNumber {
    type Error = ProtocolError;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        match n {
            1 | 2 => Ok(Self(n)),
            other => Err(ProtocolError::InvalidMessage(format!(
                "participant number must be 1 or 2, got {other}"
            ))),
        }
    }
}

impl From<ParticipantNumber> for u8 {
    fn from(n: ParticipantNumber) -> u8 {
        n.0
    }
}

impl fmt::Display for ParticipantNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Session phase
// ---------------------------------------------------------------------------

/// The session-global lifecycle phase.
///
/// Transitions form a cycle and nothing else:
///
/// ```text
/// waiting → playing → finished → waiting → …
/// ```
///
/// Anything that would produce a different edge is a no-op at the
/// runtime level (logged, never fatal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Fewer than two ready participants; admission is open.
    #[default]
    Waiting,
    /// Both participants ready; the application is live.
    Playing,
    /// The session ended; play-again votes are being collected.
    Finished,
}

impl SessionPhase {
    /// Returns `true` if moving to `target` follows an allowed edge.
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Waiting, Self::Playing)
                | (Self::Playing, Self::Finished)
                | (Self::Finished, Self::Waiting)
        )
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiting => write!(f, "waiting"),
            Self::Playing => write!(f, "playing"),
            Self::Finished => write!(f, "finished"),
        }
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// The application ran to its natural conclusion.
    Completed,
    /// A participant disconnected and the application chose to end.
    ParticipantLeft,
    /// The application's own clock ran out.
    Timeout,
    /// An application end condition reported by `check_session_end`.
    AppCondition,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::ParticipantLeft => write!(f, "participant_left"),
            Self::Timeout => write!(f, "timeout"),
            Self::AppCondition => write!(f, "app_condition"),
        }
    }
}

// ---------------------------------------------------------------------------
// Framework client → server frames
// ---------------------------------------------------------------------------

/// The closed set of framework messages a client sends.
///
/// On ingress the runtime first checks the `type` tag against
/// [`ClientFrame::TYPES`]; only tags outside that set reach the
/// application's own parser (composition rule A).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// The participant declares readiness (e.g. raised hand detected).
    ParticipantReady,
    /// The participant announces itself as a bot; implies readiness.
    BotIdentify,
    /// A yes-vote for resetting the session. Valid only while `finished`.
    PlayAgainVote,
}

impl ClientFrame {
    /// Canonical kind tags of the framework client set.
    pub const TYPES: [&'static str; 3] =
        ["participant_ready", "bot_identify", "play_again_vote"];

    /// Returns `true` if `tag` names a framework client message.
    pub fn is_framework_type(tag: &str) -> bool {
        Self::TYPES.contains(&tag)
    }
}

// ---------------------------------------------------------------------------
// Framework server → client frames
// ---------------------------------------------------------------------------

/// The closed set of framework messages the server sends.
///
/// `appData` fields carry application payloads the framework never
/// inspects. Emission is canonical-name only; legacy aliases are handled
/// on ingress by [`crate::alias::normalize`]. Unknown fields in any frame
/// are ignored on ingress for forward compatibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// First frame after admission; latches the participant's identity.
    #[serde(rename_all = "camelCase")]
    Welcome {
        participant_id: ParticipantId,
        participant_number: ParticipantNumber,
        session_phase: SessionPhase,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        app_data: Option<Value>,
    },

    /// Sent to the first participant when the second is admitted.
    #[serde(rename_all = "camelCase")]
    OpponentJoined {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        app_data: Option<Value>,
    },

    /// Sent to the remaining participant when the other disconnects.
    OpponentLeft,

    /// Broadcast exactly once per waiting → playing transition.
    SessionStarted,

    /// Broadcast when the session ends; at most once per started session.
    #[serde(rename_all = "camelCase")]
    SessionEnded {
        reason: EndReason,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        winner_id: Option<ParticipantId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        winner_number: Option<ParticipantNumber>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        app_data: Option<Value>,
    },

    /// Broadcast after each play-again vote is recorded.
    #[serde(rename_all = "camelCase")]
    PlayAgainStatus {
        voted_participant_ids: Vec<ParticipantId>,
        total_participants: usize,
    },

    /// Broadcast on the finished → waiting reset.
    #[serde(rename_all = "camelCase")]
    SessionReset {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        app_data: Option<Value>,
    },

    /// Non-fatal diagnostic; never changes phase.
    Error { message: String },
}

impl ServerFrame {
    /// Canonical kind tags of the framework server set.
    pub const TYPES: [&'static str; 8] = [
        "welcome",
        "opponent_joined",
        "opponent_left",
        "session_started",
        "session_ended",
        "play_again_status",
        "session_reset",
        "error",
    ];

    /// Returns `true` if `tag` names a framework server message.
    pub fn is_framework_type(tag: &str) -> bool {
        Self::TYPES.contains(&tag)
    }

    /// Shorthand for an [`ServerFrame::Error`] frame.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error { message: message.into() }
    }
}

// =========================================================================
// Tests
// =========================================================================
