//! End-to-end tests for the server wrapper: real WebSocket clients
//! driving a small tap-duel application through the full lifecycle.

use std::collections::HashMap;
use std::time::Duration;

use duet::prelude::*;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::Message;

// =========================================================================
// Test application: first participant to three taps wins; hand positions
// are relayed to the opponent.
// =========================================================================

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum TapMsg {
    Tap,
    HandPos { x: f64, y: f64 },
}

#[derive(Default)]
struct TapDuel {
    taps: HashMap<ParticipantId, u32>,
    roster: Vec<Participant>,
    winner: Option<(ParticipantId, ParticipantNumber)>,
}

impl AppHooks for TapDuel {
    type ClientMessage = TapMsg;

    fn on_participant_join(&mut self, participant: &Participant) -> JoinPayloads {
        JoinPayloads::welcome(json!({ "target": 3, "slot": participant.number.get() }))
    }

    fn on_session_start(&mut self, participants: &[Participant]) {
        self.roster = participants.to_vec();
        self.taps.clear();
    }

    fn on_message(
        &mut self,
        message: TapMsg,
        sender: &ParticipantId,
        phase: SessionPhase,
    ) -> Vec<Outbound> {
        match message {
            TapMsg::Tap => {
                if phase != SessionPhase::Playing {
                    return Vec::new();
                }
                let count = self.taps.entry(sender.clone()).or_insert(0);
                *count += 1;
                if *count >= 3 {
                    let number = self
                        .roster
                        .iter()
                        .find(|p| &p.id == sender)
                        .map(|p| p.number)
                        .unwrap_or(ParticipantNumber::ONE);
                    self.winner = Some((sender.clone(), number));
                }
                vec![Outbound::to_all(
                    json!({ "type": "tap_count", "participantId": sender.as_str(), "count": *count }),
                )]
            }
            TapMsg::HandPos { x, y } => vec![Outbound::to_opponent(
                json!({ "type": "opponent_hand", "x": x, "y": y }),
            )],
        }
    }

    fn check_session_end(&mut self) -> Option<SessionEnd> {
        self.winner.take().map(|(id, number)| SessionEnd::won(id, number))
    }
}

// =========================================================================
// Helpers
// =========================================================================

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn start_server() -> String {
    let server = DuetServer::builder()
        .bind("127.0.0.1:0")
        .build(TapDuel::default())
        .await
        .expect("server should build");
    let addr = server.local_addr().expect("local addr").to_string();

    tokio::spawn(async move {
        let _ = server.run().await;
    });

    // Give the accept loop a moment to start.
    tokio::time::sleep(Duration::from_millis(10)).await;
    addr
}

async fn connect(addr: &str) -> ClientWs {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .expect("should connect");
    ws
}

async fn send_json(ws: &mut ClientWs, value: Value) {
    ws.send(Message::Text(value.to_string().into()))
        .await
        .expect("send");
}

/// Receives the next text frame, parsed, within two seconds.
async fn recv_json(ws: &mut ClientWs) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("frame within deadline")
            .expect("stream open")
            .expect("frame ok");
        match msg {
            Message::Text(text) => {
                return serde_json::from_str(text.as_str()).expect("valid JSON")
            }
            Message::Close(_) => panic!("unexpected close"),
            _ => continue,
        }
    }
}

/// True if no text frame arrives within the window.
async fn silent_for(ws: &mut ClientWs, window: Duration) -> bool {
    tokio::time::timeout(window, ws.next()).await.is_err()
}

/// Connects both participants, consuming the join frames.
async fn join_two(addr: &str) -> (ClientWs, ClientWs) {
    let mut c1 = connect(addr).await;
    let welcome1 = recv_json(&mut c1).await;
    assert_eq!(welcome1["type"], "welcome");

    let mut c2 = connect(addr).await;
    let welcome2 = recv_json(&mut c2).await;
    assert_eq!(welcome2["type"], "welcome");
    let joined = recv_json(&mut c1).await;
    assert_eq!(joined["type"], "opponent_joined");

    (c1, c2)
}

/// Connects both participants and walks them through the ready gate.
async fn start_playing(addr: &str) -> (ClientWs, ClientWs) {
    let (mut c1, mut c2) = join_two(addr).await;
    send_json(&mut c1, json!({ "type": "participant_ready" })).await;
    send_json(&mut c2, json!({ "type": "participant_ready" })).await;
    assert_eq!(recv_json(&mut c1).await["type"], "session_started");
    assert_eq!(recv_json(&mut c2).await["type"], "session_started");
    (c1, c2)
}

// =========================================================================
// Lifecycle
// =========================================================================

#[tokio::test]
async fn test_first_connection_receives_welcome() {
    let addr = start_server().await;
    let mut c1 = connect(&addr).await;

    let welcome = recv_json(&mut c1).await;

    assert_eq!(welcome["type"], "welcome");
    assert_eq!(welcome["participantId"], "p1");
    assert_eq!(welcome["participantNumber"], 1);
    assert_eq!(welcome["sessionPhase"], "waiting");
    assert_eq!(welcome["appData"]["target"], 3);
}

#[tokio::test]
async fn test_two_humans_ready_up_and_start() {
    let addr = start_server().await;
    let (mut c1, mut c2) = join_two(&addr).await;

    // One ready vote is not enough.
    send_json(&mut c1, json!({ "type": "participant_ready" })).await;
    assert!(silent_for(&mut c1, Duration::from_millis(200)).await);

    send_json(&mut c2, json!({ "type": "participant_ready" })).await;
    assert_eq!(recv_json(&mut c1).await["type"], "session_started");
    assert_eq!(recv_json(&mut c2).await["type"], "session_started");
}

#[tokio::test]
async fn test_bot_identify_counts_as_ready() {
    let addr = start_server().await;
    let (mut c1, mut c2) = join_two(&addr).await;

    send_json(&mut c1, json!({ "type": "bot_identify" })).await;
    send_json(&mut c2, json!({ "type": "participant_ready" })).await;

    assert_eq!(recv_json(&mut c1).await["type"], "session_started");
    assert_eq!(recv_json(&mut c2).await["type"], "session_started");
}

#[tokio::test]
async fn test_third_connection_is_rejected() {
    let addr = start_server().await;
    let (_c1, _c2) = join_two(&addr).await;

    let mut c3 = connect(&addr).await;
    let error = recv_json(&mut c3).await;
    assert_eq!(error["type"], "error");
    assert_eq!(error["message"], "Session is full");

    // The server closes the rejected connection.
    let next = tokio::time::timeout(Duration::from_secs(2), c3.next())
        .await
        .expect("close within deadline");
    match next {
        Some(Ok(Message::Close(_))) | None => {}
        Some(Err(_)) => {}
        other => panic!("expected close, got {other:?}"),
    }
}

#[tokio::test]
async fn test_slot_reopens_after_departure() {
    let addr = start_server().await;
    let (mut c1, c2) = join_two(&addr).await;

    drop(c2);
    assert_eq!(recv_json(&mut c1).await["type"], "opponent_left");

    let mut c3 = connect(&addr).await;
    let welcome = recv_json(&mut c3).await;
    assert_eq!(welcome["type"], "welcome");
    assert_eq!(welcome["participantNumber"], 2);
    assert_eq!(recv_json(&mut c1).await["type"], "opponent_joined");
}

// =========================================================================
// App messages and errors
// =========================================================================

#[tokio::test]
async fn test_hand_pos_is_relayed_to_opponent_only() {
    let addr = start_server().await;
    let (mut c1, mut c2) = start_playing(&addr).await;

    send_json(&mut c1, json!({ "type": "hand_pos", "x": 0.4, "y": 0.6 })).await;

    let relayed = recv_json(&mut c2).await;
    assert_eq!(relayed["type"], "opponent_hand");
    assert_eq!(relayed["x"], 0.4);
    assert!(silent_for(&mut c1, Duration::from_millis(200)).await);
}

#[tokio::test]
async fn test_malformed_message_errors_sender_only() {
    let addr = start_server().await;
    let (mut c1, mut c2) = start_playing(&addr).await;

    c1.send(Message::Text("{not-json".into())).await.expect("send");

    let error = recv_json(&mut c1).await;
    assert_eq!(error["type"], "error");
    assert_eq!(error["message"], "Invalid message format");
    assert!(silent_for(&mut c2, Duration::from_millis(200)).await);

    // The session is unharmed: app traffic still flows.
    send_json(&mut c1, json!({ "type": "tap" })).await;
    assert_eq!(recv_json(&mut c1).await["type"], "tap_count");
    assert_eq!(recv_json(&mut c2).await["type"], "tap_count");
}

// =========================================================================
// Full round with play-again reset
// =========================================================================

#[tokio::test]
async fn test_win_then_unanimous_play_again_resets() {
    let addr = start_server().await;
    let (mut c1, mut c2) = start_playing(&addr).await;

    // Three taps from participant 1 win the round.
    for expected in 1..=3 {
        send_json(&mut c1, json!({ "type": "tap" })).await;
        let count = recv_json(&mut c1).await;
        assert_eq!(count["type"], "tap_count");
        assert_eq!(count["count"], expected);
        assert_eq!(recv_json(&mut c2).await["count"], expected);
    }

    for ws in [&mut c1, &mut c2] {
        let ended = recv_json(ws).await;
        assert_eq!(ended["type"], "session_ended");
        assert_eq!(ended["reason"], "completed");
        assert_eq!(ended["winnerId"], "p1");
        assert_eq!(ended["winnerNumber"], 1);
    }

    // First vote: status on both connections.
    send_json(&mut c1, json!({ "type": "play_again_vote" })).await;
    for ws in [&mut c1, &mut c2] {
        let status = recv_json(ws).await;
        assert_eq!(status["type"], "play_again_status");
        assert_eq!(status["votedParticipantIds"], json!(["p1"]));
        assert_eq!(status["totalParticipants"], 2);
    }

    // Second vote: full status, then the reset.
    send_json(&mut c2, json!({ "type": "play_again_vote" })).await;
    for ws in [&mut c1, &mut c2] {
        let status = recv_json(ws).await;
        assert_eq!(status["votedParticipantIds"], json!(["p1", "p2"]));
        assert_eq!(recv_json(ws).await["type"], "session_reset");
    }

    // Humans must re-ready; the gate works again after the reset.
    send_json(&mut c1, json!({ "type": "participant_ready" })).await;
    send_json(&mut c2, json!({ "type": "participant_ready" })).await;
    assert_eq!(recv_json(&mut c1).await["type"], "session_started");
    assert_eq!(recv_json(&mut c2).await["type"], "session_started");
}

// =========================================================================
// Legacy vocabulary
// =========================================================================

#[tokio::test]
async fn test_legacy_player_ready_is_accepted_on_ingress() {
    let addr = start_server().await;
    let (mut c1, mut c2) = join_two(&addr).await;

    send_json(&mut c1, json!({ "type": "player_ready" })).await;
    send_json(&mut c2, json!({ "type": "player_ready" })).await;

    assert_eq!(recv_json(&mut c1).await["type"], "session_started");
    assert_eq!(recv_json(&mut c2).await["type"], "session_started");
}
