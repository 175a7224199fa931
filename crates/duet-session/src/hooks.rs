//! The `AppHooks` trait — the extension point applications implement.
//!
//! The framework owns the session lifecycle; an application supplies one
//! implementation of this trait and the runtime calls it at well-defined
//! points. Everything application-specific (message schemas, welcome
//! payloads, per-message behavior, tick behavior, end conditions) lives
//! behind these hooks.

use duet_protocol::{EndReason, ParticipantId, ParticipantNumber, SessionPhase};
use duet_tick::TickConfig;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::Participant;

/// Where an application response should be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Only the connection that sent the triggering message.
    Sender,
    /// Every connection other than the sender.
    Opponent,
    /// Every live connection.
    All,
}

/// One application response: a message and who should receive it.
///
/// The message is the application's own server message as a JSON value;
/// the runtime ships it through unchanged.
#[derive(Debug, Clone)]
pub struct Outbound {
    pub target: Target,
    pub message: Value,
}

impl Outbound {
    /// A response to the sender only.
    pub fn to_sender(message: Value) -> Self {
        Self { target: Target::Sender, message }
    }

    /// A response to everyone except the sender.
    pub fn to_opponent(message: Value) -> Self {
        Self { target: Target::Opponent, message }
    }

    /// A response to every live connection.
    pub fn to_all(message: Value) -> Self {
        Self { target: Target::All, message }
    }
}

/// App payloads produced when a participant is admitted.
///
/// `welcome` is embedded in the new participant's `welcome` frame;
/// `opponent_joined` (if any) rides in the frame sent to the other slot.
#[derive(Debug, Clone, Default)]
pub struct JoinPayloads {
    pub welcome: Option<Value>,
    pub opponent_joined: Option<Value>,
}

impl JoinPayloads {
    /// Payloads with only a welcome value.
    pub fn welcome(value: Value) -> Self {
        Self { welcome: Some(value), opponent_joined: None }
    }
}

/// An application's directive to end the session.
///
/// Returned from [`AppHooks::check_session_end`]; the runtime folds it
/// into the `session_ended` broadcast. The reason is the application's
/// to choose — a leave-triggered end reports `participant_left`, a
/// normal win `completed`.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEnd {
    pub winner_id: Option<ParticipantId>,
    pub winner_number: Option<ParticipantNumber>,
    pub reason: EndReason,
    pub app_data: Option<Value>,
}

impl SessionEnd {
    /// A completed session won by the given participant.
    pub fn won(winner_id: ParticipantId, winner_number: ParticipantNumber) -> Self {
        Self {
            winner_id: Some(winner_id),
            winner_number: Some(winner_number),
            reason: EndReason::Completed,
            app_data: None,
        }
    }

    /// A completed session with no winner.
    pub fn draw() -> Self {
        Self {
            winner_id: None,
            winner_number: None,
            reason: EndReason::Completed,
            app_data: None,
        }
    }

    /// An end triggered by the other participant leaving.
    pub fn participant_left() -> Self {
        Self {
            winner_id: None,
            winner_number: None,
            reason: EndReason::ParticipantLeft,
            app_data: None,
        }
    }

    /// An end triggered by the application's own clock.
    pub fn timeout() -> Self {
        Self {
            winner_id: None,
            winner_number: None,
            reason: EndReason::Timeout,
            app_data: None,
        }
    }

    /// An end raised by a periodic application condition.
    pub fn app_condition() -> Self {
        Self {
            winner_id: None,
            winner_number: None,
            reason: EndReason::AppCondition,
            app_data: None,
        }
    }

    /// Attaches a winner to this end.
    pub fn with_winner(mut self, id: ParticipantId, number: ParticipantNumber) -> Self {
        self.winner_id = Some(id);
        self.winner_number = Some(number);
        self
    }

    /// Attaches an app payload to the `session_ended` broadcast.
    pub fn with_app_data(mut self, data: Value) -> Self {
        self.app_data = Some(data);
        self
    }
}

/// The capability bundle an application supplies to the runtime.
///
/// Only [`on_message`](Self::on_message) is required; every other hook
/// has a reasonable default. Hooks are plain `&mut self` callbacks — the
/// runtime invokes them from a single task, so there is no shared
/// mutable state to guard.
///
/// The runtime cannot hand hooks a reference to itself, so "the app ends
/// the session" is expressed as a returned directive:
/// [`check_session_end`](Self::check_session_end) is polled while the
/// session is playing after every `on_message`, `on_tick`, and
/// `on_participant_leave`.
pub trait AppHooks: Send + 'static {
    /// The application's client-message union. Parsed only for `type`
    /// tags outside the framework set (composition rule A); a parse
    /// failure earns the sender an `error` frame.
    type ClientMessage: DeserializeOwned + Send;

    /// Tick loop configuration for this application. Disabled by default;
    /// turn-based applications never need it.
    fn tick_config() -> TickConfig {
        TickConfig::disabled()
    }

    /// Mints the identity for a newly admitted participant.
    fn generate_participant_id(&self, number: ParticipantNumber) -> ParticipantId {
        ParticipantId::new(format!("p{number}"))
    }

    /// Called on admission, before the `welcome` frame is sent. The
    /// returned payloads ride inside `welcome` and `opponent_joined`.
    fn on_participant_join(&mut self, _participant: &Participant) -> JoinPayloads {
        JoinPayloads::default()
    }

    /// Called when a participant disconnects, after the slot is freed.
    fn on_participant_leave(&mut self, _participant: &Participant, _phase: SessionPhase) {}

    /// Handles one application client message. Returned responses are
    /// routed per their [`Target`].
    fn on_message(
        &mut self,
        message: Self::ClientMessage,
        sender: &ParticipantId,
        phase: SessionPhase,
    ) -> Vec<Outbound>;

    /// Called once per waiting → playing transition, before
    /// `session_started` is broadcast.
    fn on_session_start(&mut self, _participants: &[Participant]) {}

    /// Called on the finished → waiting reset. The returned value rides
    /// in the `session_reset` broadcast.
    fn on_reset(&mut self) -> Option<Value> {
        None
    }

    /// Called every tick while playing. `dt` is the seconds elapsed since
    /// the previous tick. Returned messages are broadcast to everyone,
    /// in order.
    fn on_tick(&mut self, _dt: f64) -> Vec<Value> {
        Vec::new()
    }

    /// Polled while playing after `on_message`, `on_tick`, and
    /// `on_participant_leave`. A non-`None` return ends the session.
    fn check_session_end(&mut self) -> Option<SessionEnd> {
        None
    }
}
