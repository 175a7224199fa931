//! The session state machine.
//!
//! `SessionRuntime` owns the two participant slots, the lifecycle phase,
//! and the application hooks, and implements admission, the ready gate,
//! framework message handling, app-message routing, the play-again reset
//! protocol, and end-of-session. It is a plain synchronous struct: the
//! actor in [`crate::handle`] gives it a task to live in, and tests
//! drive it directly with in-memory connections.
//!
//! Phase invariants enforced here:
//! - at most two slots; a third admission gets `error` + close
//! - transitions follow waiting → playing → finished → waiting only
//! - `playing` requires two ready participants
//! - ticks are dropped outside `playing`

use duet_protocol::{
    alias, ClientFrame, Codec, EndReason, JsonCodec, ParticipantId,
    ParticipantNumber, ServerFrame, SessionPhase,
};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::{
    AppHooks, Connection, Outbound, Participant, SessionEnd, Target,
};

/// One occupied slot: the participant record and its connection.
struct Slot<C> {
    participant: Participant,
    conn: C,
}

/// The server-side session state machine, parameterized by the
/// application's hooks and the transport's connection type.
pub struct SessionRuntime<A: AppHooks, C: Connection, K: Codec = JsonCodec> {
    hooks: A,
    codec: K,
    phase: SessionPhase,
    slots: Vec<Slot<C>>,
}

impl<A: AppHooks, C: Connection> SessionRuntime<A, C> {
    /// Creates a runtime using the contract's reference JSON codec.
    pub fn new(hooks: A) -> Self {
        Self::with_codec(hooks, JsonCodec)
    }
}

impl<A: AppHooks, C: Connection, K: Codec> SessionRuntime<A, C, K> {
    /// Creates a runtime with a custom codec. The codec pair must be
    /// inverses on valid inputs.
    pub fn with_codec(hooks: A, codec: K) -> Self {
        Self {
            hooks,
            codec,
            phase: SessionPhase::Waiting,
            slots: Vec::with_capacity(2),
        }
    }

    // -----------------------------------------------------------------
    // Public operations
    // -----------------------------------------------------------------

    /// Attempts to admit a connection.
    ///
    /// Assigns the lowest vacant number, mints the identity through the
    /// app hook, sends `welcome` to the newcomer and `opponent_joined`
    /// to the other slot. If both slots are taken the connection gets a
    /// single `error` frame and is closed; returns `None`.
    pub fn handle_connection(&mut self, conn: C) -> Option<Participant> {
        if self.slots.len() >= 2 {
            warn!("admission refused: session is full");
            self.send_frame(&conn, &ServerFrame::error("Session is full"));
            conn.close();
            return None;
        }

        let number = self.lowest_vacant_number();
        let id = self.hooks.generate_participant_id(number);
        let participant = Participant::new(id, number);
        let payloads = self.hooks.on_participant_join(&participant);

        self.send_frame(
            &conn,
            &ServerFrame::Welcome {
                participant_id: participant.id.clone(),
                participant_number: number,
                session_phase: self.phase,
                app_data: payloads.welcome,
            },
        );
        for slot in &self.slots {
            self.send_frame(
                &slot.conn,
                &ServerFrame::OpponentJoined {
                    app_data: payloads.opponent_joined.clone(),
                },
            );
        }

        info!(
            participant_id = %participant.id,
            number = %number,
            participants = self.slots.len() + 1,
            "participant admitted"
        );
        self.slots.push(Slot { participant: participant.clone(), conn });
        Some(participant)
    }

    /// Removes a departed participant and tells the remaining one.
    ///
    /// The phase is left alone — a session does not auto-terminate on
    /// departure. The app's leave hook runs first, then `opponent_left`
    /// is broadcast, then the app's end directive (if any) is honored,
    /// so an app-chosen `participant_left` end arrives after the
    /// departure notice.
    pub fn handle_disconnection(&mut self, id: &ParticipantId) {
        let Some(pos) = self.slots.iter().position(|s| &s.participant.id == id)
        else {
            debug!(participant_id = %id, "disconnect for unknown participant, ignoring");
            return;
        };
        let slot = self.slots.remove(pos);
        info!(
            participant_id = %slot.participant.id,
            remaining = self.slots.len(),
            "participant left"
        );

        self.hooks.on_participant_leave(&slot.participant, self.phase);
        self.broadcast_frame(&ServerFrame::OpponentLeft);
        self.poll_app_end();
    }

    /// Parses and dispatches one inbound text frame from `sender`.
    ///
    /// Framework kinds are consumed internally; anything else goes to
    /// the app parser and `on_message`. Unparseable input earns the
    /// sender an `error` frame and nothing more.
    pub fn handle_message(&mut self, sender: &ParticipantId, raw: &str) {
        let Ok(mut value) = serde_json::from_str::<Value>(raw) else {
            debug!(participant_id = %sender, "unparseable frame");
            self.send_error_to(sender, "Invalid message format");
            return;
        };
        alias::normalize(&mut value);

        let is_framework = value
            .get("type")
            .and_then(Value::as_str)
            .is_some_and(ClientFrame::is_framework_type);

        if is_framework {
            match serde_json::from_value::<ClientFrame>(value) {
                Ok(frame) => self.handle_framework(sender, frame),
                Err(err) => {
                    debug!(participant_id = %sender, %err, "malformed framework frame");
                    self.send_error_to(sender, "Invalid message format");
                }
            }
        } else {
            match serde_json::from_value::<A::ClientMessage>(value) {
                Ok(message) => {
                    let responses =
                        self.hooks.on_message(message, sender, self.phase);
                    self.route(sender, responses);
                    self.poll_app_end();
                }
                Err(err) => {
                    debug!(participant_id = %sender, %err, "unrecognized app message");
                    self.send_error_to(sender, "Invalid message format");
                }
            }
        }
    }

    /// Ends the session: `playing → finished` plus the `session_ended`
    /// broadcast. Idempotent in `finished`; refused (and logged) in
    /// `waiting`, which has nothing to end.
    pub fn end_session(
        &mut self,
        winner_id: Option<ParticipantId>,
        winner_number: Option<ParticipantNumber>,
        reason: EndReason,
    ) {
        self.end_with(SessionEnd { winner_id, winner_number, reason, app_data: None });
    }

    /// Advances the application by one tick. Dropped outside `playing`.
    ///
    /// Messages returned by `on_tick` are broadcast in order, then the
    /// app's end condition is polled.
    pub fn tick(&mut self, dt_seconds: f64) {
        if self.phase != SessionPhase::Playing {
            return;
        }
        for message in self.hooks.on_tick(dt_seconds) {
            self.broadcast(message);
        }
        self.poll_app_end();
    }

    /// Broadcasts an application message to every live connection.
    ///
    /// Out-of-band routing helper. Once the session has ended, app
    /// messages are dropped so nothing follows `session_ended`.
    pub fn broadcast(&self, message: Value) {
        if self.phase == SessionPhase::Finished {
            debug!("dropping app broadcast after session end");
            return;
        }
        for slot in self.open_slots() {
            self.send_value(&slot.conn, &message);
        }
    }

    /// Sends an application message to one participant, if present and
    /// open. Same post-end drop rule as [`broadcast`](Self::broadcast).
    pub fn send_to_participant(&self, id: &ParticipantId, message: Value) {
        if self.phase == SessionPhase::Finished {
            debug!(participant_id = %id, "dropping app message after session end");
            return;
        }
        if let Some(slot) = self.slot(id) {
            if slot.conn.is_open() {
                self.send_value(&slot.conn, &message);
            }
        }
    }

    // -----------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------

    /// The current lifecycle phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Snapshot of the current participants, ordered by slot number.
    pub fn participants(&self) -> Vec<Participant> {
        let mut list: Vec<Participant> =
            self.slots.iter().map(|s| s.participant.clone()).collect();
        list.sort_by_key(|p| p.number.get());
        list
    }

    /// Looks up one participant record.
    pub fn participant(&self, id: &ParticipantId) -> Option<&Participant> {
        self.slot(id).map(|s| &s.participant)
    }

    /// Number of occupied slots (0, 1, or 2).
    pub fn participant_count(&self) -> usize {
        self.slots.len()
    }

    /// Whether a participant has a standing play-again vote. Reads as
    /// `false` in any phase other than `finished`.
    pub fn wants_play_again(&self, id: &ParticipantId) -> bool {
        self.phase == SessionPhase::Finished
            && self.participant(id).is_some_and(|p| p.wants_play_again)
    }

    /// The application hooks.
    pub fn hooks(&self) -> &A {
        &self.hooks
    }

    /// Mutable access to the application hooks.
    pub fn hooks_mut(&mut self) -> &mut A {
        &mut self.hooks
    }

    // -----------------------------------------------------------------
    // Framework message handling
    // -----------------------------------------------------------------

    fn handle_framework(&mut self, sender: &ParticipantId, frame: ClientFrame) {
        match frame {
            ClientFrame::ParticipantReady => {
                let Some(slot) = self.slot_mut(sender) else {
                    return;
                };
                slot.participant.is_ready = true;
                debug!(participant_id = %sender, "participant ready");
                self.evaluate_start();
            }
            ClientFrame::BotIdentify => {
                let Some(slot) = self.slot_mut(sender) else {
                    return;
                };
                slot.participant.is_bot = true;
                slot.participant.is_ready = true;
                debug!(participant_id = %sender, "bot identified");
                self.evaluate_start();
            }
            ClientFrame::PlayAgainVote => self.handle_vote(sender),
        }
    }

    /// The ready gate: fires waiting → playing once both slots are
    /// occupied and ready. Re-evaluated whenever any input changes.
    fn evaluate_start(&mut self) {
        if self.phase != SessionPhase::Waiting {
            return;
        }
        if self.slots.len() != 2
            || !self.slots.iter().all(|s| s.participant.is_ready)
        {
            return;
        }

        let participants = self.participants();
        self.hooks.on_session_start(&participants);
        self.phase = SessionPhase::Playing;
        info!("session started");
        self.broadcast_frame(&ServerFrame::SessionStarted);
    }

    fn handle_vote(&mut self, sender: &ParticipantId) {
        if self.phase != SessionPhase::Finished {
            debug!(
                participant_id = %sender,
                phase = %self.phase,
                "play_again_vote outside finished, ignoring"
            );
            return;
        }
        let Some(slot) = self.slot_mut(sender) else {
            return;
        };
        if slot.participant.wants_play_again {
            debug!(participant_id = %sender, "repeat play_again_vote, ignoring");
            return;
        }
        slot.participant.wants_play_again = true;

        let voted_participant_ids: Vec<ParticipantId> = self
            .participants()
            .into_iter()
            .filter(|p| p.wants_play_again)
            .map(|p| p.id)
            .collect();
        let total_participants = self.slots.len();
        info!(
            participant_id = %sender,
            voted = voted_participant_ids.len(),
            total = total_participants,
            "play-again vote recorded"
        );
        self.broadcast_frame(&ServerFrame::PlayAgainStatus {
            voted_participant_ids,
            total_participants,
        });

        if self.slots.iter().all(|s| s.participant.wants_play_again) {
            self.reset();
        }
    }

    /// finished → waiting. Bots stay ready across the reset; humans
    /// must re-signal, so the start gate only re-fires immediately in
    /// an all-bot session.
    fn reset(&mut self) {
        let app_data = self.hooks.on_reset();
        for slot in &mut self.slots {
            let p = &mut slot.participant;
            p.wants_play_again = false;
            p.is_ready = p.is_bot;
        }
        self.phase = SessionPhase::Waiting;
        info!("session reset");
        self.broadcast_frame(&ServerFrame::SessionReset { app_data });
        self.evaluate_start();
    }

    fn end_with(&mut self, end: SessionEnd) {
        match self.phase {
            SessionPhase::Playing => {
                self.phase = SessionPhase::Finished;
                info!(
                    reason = %end.reason,
                    winner = end.winner_id.as_ref().map(|id| id.as_str()).unwrap_or("-"),
                    "session ended"
                );
                self.broadcast_frame(&ServerFrame::SessionEnded {
                    reason: end.reason,
                    winner_id: end.winner_id,
                    winner_number: end.winner_number,
                    app_data: end.app_data,
                });
            }
            SessionPhase::Finished => {
                debug!("end_session in finished phase, ignoring");
            }
            SessionPhase::Waiting => {
                debug!("refusing to end a session that has not started");
            }
        }
    }

    /// Honors a pending app end directive, if the session is playing.
    fn poll_app_end(&mut self) {
        if self.phase != SessionPhase::Playing {
            return;
        }
        if let Some(end) = self.hooks.check_session_end() {
            self.end_with(end);
        }
    }

    // -----------------------------------------------------------------
    // Routing
    // -----------------------------------------------------------------

    fn route(&self, sender: &ParticipantId, responses: Vec<Outbound>) {
        if responses.is_empty() {
            return;
        }
        if self.phase == SessionPhase::Finished {
            debug!(count = responses.len(), "dropping app responses after session end");
            return;
        }
        for response in responses {
            match response.target {
                Target::Sender => {
                    if let Some(slot) = self.slot(sender) {
                        if slot.conn.is_open() {
                            self.send_value(&slot.conn, &response.message);
                        }
                    }
                }
                Target::Opponent => {
                    for slot in self.open_slots() {
                        if &slot.participant.id != sender {
                            self.send_value(&slot.conn, &response.message);
                        }
                    }
                }
                Target::All => {
                    for slot in self.open_slots() {
                        self.send_value(&slot.conn, &response.message);
                    }
                }
            }
        }
    }

    fn open_slots(&self) -> impl Iterator<Item = &Slot<C>> {
        self.slots.iter().filter(|s| s.conn.is_open())
    }

    fn slot(&self, id: &ParticipantId) -> Option<&Slot<C>> {
        self.slots.iter().find(|s| &s.participant.id == id)
    }

    fn slot_mut(&mut self, id: &ParticipantId) -> Option<&mut Slot<C>> {
        self.slots.iter_mut().find(|s| &s.participant.id == id)
    }

    fn lowest_vacant_number(&self) -> ParticipantNumber {
        let one_taken = self
            .slots
            .iter()
            .any(|s| s.participant.number == ParticipantNumber::ONE);
        if one_taken { ParticipantNumber::TWO } else { ParticipantNumber::ONE }
    }

    // -----------------------------------------------------------------
    // Encoding
    // -----------------------------------------------------------------

    fn send_frame(&self, conn: &C, frame: &ServerFrame) {
        match self.codec.encode(frame) {
            Ok(text) => conn.send(&text),
            Err(err) => error!(%err, "failed to encode framework frame"),
        }
    }

    fn broadcast_frame(&self, frame: &ServerFrame) {
        for slot in self.open_slots() {
            self.send_frame(&slot.conn, frame);
        }
    }

    fn send_value(&self, conn: &C, message: &Value) {
        match self.codec.encode(message) {
            Ok(text) => conn.send(&text),
            Err(err) => error!(%err, "failed to encode app message"),
        }
    }

    fn send_error_to(&self, id: &ParticipantId, message: &str) {
        if let Some(slot) = self.slot(id) {
            self.send_frame(&slot.conn, &ServerFrame::error(message));
        }
    }
}
