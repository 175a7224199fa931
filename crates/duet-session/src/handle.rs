//! Session actor: an isolated task that owns a `SessionRuntime`.
//!
//! The runtime is single-threaded by contract — no two handlers run
//! concurrently, and phase transitions happen within one uninterrupted
//! turn. The actor delivers that guarantee: one task owns the runtime
//! and the tick scheduler, and the outside world talks to it through a
//! command channel via [`SessionHandle`].

use duet_protocol::{EndReason, ParticipantId, ParticipantNumber, SessionPhase};
use duet_tick::TickScheduler;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::{AppHooks, Connection, Participant, SessionError, SessionRuntime};

/// Command channel size for session actors.
const CHANNEL_SIZE: usize = 64;

/// Commands sent to a session actor through its channel.
enum SessionCommand<C: Connection> {
    /// Offer a connection for admission.
    Connect {
        conn: C,
        reply: oneshot::Sender<Option<Participant>>,
    },

    /// A participant's connection closed.
    Disconnect { id: ParticipantId },

    /// An inbound text frame from a participant.
    Message { id: ParticipantId, raw: String },

    /// End the session from outside the hook path.
    EndSession {
        winner_id: Option<ParticipantId>,
        winner_number: Option<ParticipantNumber>,
        reason: EndReason,
    },

    /// Halt the tick loop and stop processing. Connections are closed
    /// by the server wrapper, not here.
    Stop,
}

/// Handle to a running session actor. Cheap to clone.
pub struct SessionHandle<C: Connection> {
    sender: mpsc::Sender<SessionCommand<C>>,
}

impl<C: Connection> Clone for SessionHandle<C> {
    fn clone(&self) -> Self {
        Self { sender: self.sender.clone() }
    }
}

impl<C: Connection> SessionHandle<C> {
    /// Offers a connection for admission. Resolves to the new
    /// [`Participant`], or `None` if the session was full (the actor has
    /// already sent the error frame and closed the connection).
    pub async fn connect(&self, conn: C) -> Result<Option<Participant>, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(SessionCommand::Connect { conn, reply: reply_tx })
            .await
            .map_err(|_| SessionError::Unavailable)?;
        reply_rx.await.map_err(|_| SessionError::Unavailable)
    }

    /// Reports a participant's disconnection (fire-and-forget).
    pub async fn disconnect(&self, id: ParticipantId) -> Result<(), SessionError> {
        self.sender
            .send(SessionCommand::Disconnect { id })
            .await
            .map_err(|_| SessionError::Unavailable)
    }

    /// Delivers one inbound text frame (fire-and-forget).
    pub async fn message(&self, id: ParticipantId, raw: String) -> Result<(), SessionError> {
        self.sender
            .send(SessionCommand::Message { id, raw })
            .await
            .map_err(|_| SessionError::Unavailable)
    }

    /// Requests an end-of-session from outside the hook path.
    pub async fn end_session(
        &self,
        winner_id: Option<ParticipantId>,
        winner_number: Option<ParticipantNumber>,
        reason: EndReason,
    ) -> Result<(), SessionError> {
        self.sender
            .send(SessionCommand::EndSession { winner_id, winner_number, reason })
            .await
            .map_err(|_| SessionError::Unavailable)
    }

    /// Stops the actor. The tick loop halts; open connections are left
    /// for the server wrapper to close.
    pub async fn stop(&self) -> Result<(), SessionError> {
        self.sender
            .send(SessionCommand::Stop)
            .await
            .map_err(|_| SessionError::Unavailable)
    }
}

/// Spawns a session actor for the given application hooks and returns
/// its handle. The tick scheduler is built from the app's
/// [`AppHooks::tick_config`] and gated on the phase by the actor.
pub fn spawn_session<A, C>(hooks: A) -> SessionHandle<C>
where
    A: AppHooks,
    C: Connection,
{
    let (tx, rx) = mpsc::channel(CHANNEL_SIZE);
    let runtime = SessionRuntime::new(hooks);
    let scheduler = TickScheduler::new(A::tick_config());
    tokio::spawn(session_task(runtime, scheduler, rx));
    SessionHandle { sender: tx }
}

async fn session_task<A, C>(
    mut runtime: SessionRuntime<A, C>,
    mut scheduler: TickScheduler,
    mut commands: mpsc::Receiver<SessionCommand<C>>,
) where
    A: AppHooks,
    C: Connection,
{
    debug!("session task started");

    loop {
        tokio::select! {
            cmd = commands.recv() => match cmd {
                Some(SessionCommand::Connect { conn, reply }) => {
                    let _ = reply.send(runtime.handle_connection(conn));
                }
                Some(SessionCommand::Disconnect { id }) => {
                    runtime.handle_disconnection(&id);
                }
                Some(SessionCommand::Message { id, raw }) => {
                    runtime.handle_message(&id, &raw);
                }
                Some(SessionCommand::EndSession { winner_id, winner_number, reason }) => {
                    runtime.end_session(winner_id, winner_number, reason);
                }
                Some(SessionCommand::Stop) | None => break,
            },
            info = scheduler.wait_for_tick() => {
                runtime.tick(info.dt_seconds);
                scheduler.record_tick_end();
            }
        }

        // The tick loop runs exactly while the session is playing. The
        // stop happens in the same turn as the phase change, so no tick
        // can land between `session_ended` and here.
        if runtime.phase() == SessionPhase::Playing {
            scheduler.start();
        } else {
            scheduler.stop();
        }
    }

    scheduler.stop();
    debug!("session task stopped");
}
