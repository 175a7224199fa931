//! The session client: a thin handle over a background socket task.
//!
//! [`SessionClient::connect`] spawns the task and returns the handle
//! plus a bounded event channel. The task owns the socket; the handle
//! owns a mirror of the session state (connection state, phase, latched
//! identity) that the task updates before emitting each event.
//!
//! Outbound sends are never queued: a session is too short-lived for
//! offline buffering to mean anything, so sends while not connected are
//! dropped with a warning.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use duet_protocol::{
    alias, ClientFrame, ParticipantId, ParticipantNumber, ServerFrame,
    SessionDescriptor, SessionPhase,
};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::{ConnectionState, SessionEvent};

/// Default capacity of the bounded event channel.
const DEFAULT_EVENT_CAPACITY: usize = 256;

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Auto-reconnect policy. Disabled unless set on the [`ClientConfig`].
///
/// The server keeps no state across a reconnection: the client will
/// re-receive `welcome`, possibly under a different participant number,
/// and must rebuild app state from it. Reconnection is therefore only
/// safe while the session is waiting; applications for which mid-play
/// reconnection is unsafe should leave it disabled.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before each reconnect attempt.
    pub delay: Duration,
    /// Attempts before giving up. The counter clears on every
    /// successful open.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self { delay: Duration::from_secs(2), max_attempts: 5 }
    }
}

/// Configuration for a [`SessionClient`] connection.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// The WebSocket URL to connect to.
    pub url: String,
    /// Auto-reconnect policy; `None` (the default) disables it.
    pub reconnect: Option<ReconnectConfig>,
    /// Capacity of the bounded event channel. When the consumer falls
    /// behind, events are dropped with a warning rather than blocking
    /// the socket task.
    pub event_capacity: usize,
}

impl ClientConfig {
    /// Config for a direct URL with reconnection disabled.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect: None,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Config from a fetched bootstrap descriptor.
    pub fn from_descriptor(descriptor: &SessionDescriptor) -> Self {
        Self::new(descriptor.ws_url.clone())
    }

    /// Enables auto-reconnect.
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = Some(reconnect);
        self
    }

    /// Overrides the event channel capacity (clamped to at least 1).
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }
}

// ---------------------------------------------------------------------------
// Client handle
// ---------------------------------------------------------------------------

/// Mirrored session state, updated by the socket task.
#[derive(Default)]
struct Mirror {
    connection: ConnectionState,
    phase: SessionPhase,
    participant_id: Option<ParticipantId>,
    participant_number: Option<ParticipantNumber>,
}

enum Command {
    Frame(String),
    Close,
}

/// Handle to a running session client. Cheap to clone.
#[derive(Clone)]
pub struct SessionClient {
    mirror: Arc<Mutex<Mirror>>,
    outbound: mpsc::UnboundedSender<Command>,
    shutdown: Arc<AtomicBool>,
}

impl SessionClient {
    /// Spawns the socket task and returns the handle plus the event
    /// stream. The task connects immediately; watch for
    /// [`SessionEvent::ConnectionChanged`] to track progress.
    pub fn connect(config: ClientConfig) -> (Self, mpsc::Receiver<SessionEvent>) {
        let capacity = config.event_capacity.max(1);
        let (events_tx, events_rx) = mpsc::channel(capacity);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let mirror = Arc::new(Mutex::new(Mirror::default()));
        let shutdown = Arc::new(AtomicBool::new(false));

        tokio::spawn(run_client(
            config,
            Arc::clone(&mirror),
            outbound_rx,
            events_tx,
            Arc::clone(&shutdown),
        ));

        (Self { mirror, outbound: outbound_tx, shutdown }, events_rx)
    }

    /// Signals readiness (the ready gate input).
    pub fn send_ready(&self) {
        self.send_framework(&ClientFrame::ParticipantReady);
    }

    /// Announces this participant as a bot (implies readiness).
    pub fn send_bot_identify(&self) {
        self.send_framework(&ClientFrame::BotIdentify);
    }

    /// Votes to play again. Only meaningful while the session is
    /// finished; the server ignores it otherwise.
    pub fn send_play_again_vote(&self) {
        self.send_framework(&ClientFrame::PlayAgainVote);
    }

    /// Sends an application message verbatim.
    pub fn send_app_message(&self, message: Value) {
        self.send_text(message.to_string(), "app message");
    }

    /// Cancels any pending reconnect, closes the socket, resets the
    /// phase to waiting, and clears the latched identity.
    pub fn disconnect(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let _ = self.outbound.send(Command::Close);

        let mut m = self.mirror.lock().unwrap();
        m.connection = ConnectionState::Disconnected;
        m.phase = SessionPhase::Waiting;
        m.participant_id = None;
        m.participant_number = None;
    }

    /// Current socket state.
    pub fn connection_state(&self) -> ConnectionState {
        self.mirror.lock().unwrap().connection
    }

    /// Mirrored session phase.
    pub fn phase(&self) -> SessionPhase {
        self.mirror.lock().unwrap().phase
    }

    /// Identity latched from the last `welcome`, if any.
    pub fn participant_id(&self) -> Option<ParticipantId> {
        self.mirror.lock().unwrap().participant_id.clone()
    }

    /// Slot number latched from the last `welcome`, if any.
    pub fn participant_number(&self) -> Option<ParticipantNumber> {
        self.mirror.lock().unwrap().participant_number
    }

    fn send_framework(&self, frame: &ClientFrame) {
        let text = serde_json::to_string(frame)
            .expect("framework client frames always serialize");
        self.send_text(text, "framework message");
    }

    fn send_text(&self, text: String, what: &str) {
        if self.connection_state() != ConnectionState::Connected {
            warn!(message = what, "not connected; dropping outbound message");
            return;
        }
        let _ = self.outbound.send(Command::Frame(text));
    }
}

// ---------------------------------------------------------------------------
// Socket task
// ---------------------------------------------------------------------------

async fn run_client(
    config: ClientConfig,
    mirror: Arc<Mutex<Mirror>>,
    mut outbound: mpsc::UnboundedReceiver<Command>,
    events: mpsc::Sender<SessionEvent>,
    shutdown: Arc<AtomicBool>,
) {
    let mut attempts: u32 = 0;

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        set_connection(&mirror, &events, ConnectionState::Connecting);
        match tokio_tungstenite::connect_async(&config.url).await {
            Ok((ws, _)) => {
                info!(url = %config.url, "session socket open");
                attempts = 0;
                set_connection(&mirror, &events, ConnectionState::Connected);
                drive_socket(ws, &mirror, &mut outbound, &events).await;
                set_connection(&mirror, &events, ConnectionState::Disconnected);
            }
            Err(err) => {
                warn!(url = %config.url, %err, "connect failed");
                set_connection(&mirror, &events, ConnectionState::Error);
            }
        }

        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        let Some(reconnect) = &config.reconnect else {
            break;
        };
        attempts += 1;
        if attempts > reconnect.max_attempts {
            warn!(attempts, "reconnect attempts exhausted");
            break;
        }
        debug!(attempt = attempts, delay_ms = reconnect.delay.as_millis() as u64, "scheduling reconnect");
        tokio::time::sleep(reconnect.delay).await;
    }

    debug!("session client task stopped");
}

/// Pumps one open socket until it closes.
async fn drive_socket(
    ws: WsStream,
    mirror: &Arc<Mutex<Mirror>>,
    outbound: &mut mpsc::UnboundedReceiver<Command>,
    events: &mpsc::Sender<SessionEvent>,
) {
    let (mut sink, mut stream): (SplitSink<WsStream, Message>, SplitStream<WsStream>) =
        ws.split();

    loop {
        tokio::select! {
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    dispatch(text.as_str(), mirror, events);
                }
                Some(Ok(Message::Binary(data))) => {
                    if let Ok(text) = String::from_utf8(data.to_vec()) {
                        dispatch(&text, mirror, events);
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {} // ping/pong
                Some(Err(err)) => {
                    debug!(%err, "socket error");
                    break;
                }
            },
            command = outbound.recv() => match command {
                Some(Command::Frame(text)) => {
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Some(Command::Close) | None => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    }
}

/// The dispatch rule: normalize aliases, update the mirror for framework
/// frames, then emit the event; unknown kinds pass through as `App`.
fn dispatch(raw: &str, mirror: &Arc<Mutex<Mirror>>, events: &mpsc::Sender<SessionEvent>) {
    let Ok(mut value) = serde_json::from_str::<Value>(raw) else {
        debug!("unparseable frame from server, ignoring");
        return;
    };
    alias::normalize(&mut value);

    let is_framework = value
        .get("type")
        .and_then(Value::as_str)
        .is_some_and(ServerFrame::is_framework_type);
    if !is_framework {
        emit(events, SessionEvent::App(value));
        return;
    }

    let frame = match serde_json::from_value::<ServerFrame>(value) {
        Ok(frame) => frame,
        Err(err) => {
            debug!(%err, "malformed framework frame, ignoring");
            return;
        }
    };

    let event = {
        let mut m = mirror.lock().unwrap();
        match frame {
            ServerFrame::Welcome {
                participant_id,
                participant_number,
                session_phase,
                app_data,
            } => {
                m.participant_id = Some(participant_id.clone());
                m.participant_number = Some(participant_number);
                m.phase = session_phase;
                SessionEvent::SessionJoin {
                    participant_id,
                    participant_number,
                    session_phase,
                    app_data,
                }
            }
            ServerFrame::OpponentJoined { app_data } => {
                SessionEvent::OpponentJoined { app_data }
            }
            ServerFrame::OpponentLeft => SessionEvent::OpponentLeft,
            ServerFrame::SessionStarted => {
                m.phase = SessionPhase::Playing;
                SessionEvent::SessionStart
            }
            ServerFrame::SessionEnded { reason, winner_id, winner_number, app_data } => {
                m.phase = SessionPhase::Finished;
                SessionEvent::SessionEnd { reason, winner_id, winner_number, app_data }
            }
            ServerFrame::PlayAgainStatus {
                voted_participant_ids,
                total_participants,
            } => SessionEvent::PlayAgainStatus {
                voted: voted_participant_ids.len(),
                total: total_participants,
            },
            ServerFrame::SessionReset { app_data } => {
                m.phase = SessionPhase::Waiting;
                SessionEvent::SessionReset { app_data }
            }
            ServerFrame::Error { message } => SessionEvent::ErrorMessage(message),
        }
    };
    emit(events, event);
}

fn set_connection(
    mirror: &Arc<Mutex<Mirror>>,
    events: &mpsc::Sender<SessionEvent>,
    state: ConnectionState,
) {
    mirror.lock().unwrap().connection = state;
    emit(events, SessionEvent::ConnectionChanged(state));
}

/// Emits without blocking the socket task; a saturated consumer loses
/// events rather than stalling the connection.
fn emit(events: &mpsc::Sender<SessionEvent>, event: SessionEvent) {
    if let Err(err) = events.try_send(event) {
        warn!(%err, "event channel saturated, dropping event");
    }
}
