//! The participant record: one occupied slot of a session.

use duet_protocol::{ParticipantId, ParticipantNumber};

/// A connected counterparty, human or bot, occupying one of the two
/// session slots.
///
/// Created on admission with all flags false. `is_ready` is set by an
/// explicit ready signal or implicitly by bot identification;
/// `wants_play_again` is only meaningful while the session is finished
/// and is cleared on reset. The record is destroyed on disconnect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    /// App-assigned identity, stable for the life of the connection.
    pub id: ParticipantId,
    /// Slot number. Reassigned from the free pool after a departure, so
    /// a late-joining replacement takes whichever number is vacant.
    pub number: ParticipantNumber,
    /// Passed the ready gate.
    pub is_ready: bool,
    /// Announced itself as a bot (implies ready).
    pub is_bot: bool,
    /// Voted for a reset. Only meaningful while the phase is finished.
    pub wants_play_again: bool,
}

impl Participant {
    /// A fresh record with all flags false.
    pub fn new(id: ParticipantId, number: ParticipantNumber) -> Self {
        Self {
            id,
            number,
            is_ready: false,
            is_bot: false,
            wants_play_again: false,
        }
    }
}
