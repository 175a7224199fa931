//! Integration tests for the session client against scripted servers.

use std::future::Future;
use std::time::Duration;

use duet_client::{
    ClientConfig, ConnectionState, ReconnectConfig, SessionClient, SessionEvent,
};
use duet_protocol::{ParticipantNumber, SessionPhase};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

type ServerWs = WebSocketStream<TcpStream>;

// =========================================================================
// Helpers
// =========================================================================

/// Binds a one-shot scripted server and returns its ws:// URL.
async fn scripted<F, Fut>(script: F) -> String
where
    F: FnOnce(ServerWs) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        if let Ok((stream, _)) = listener.accept().await {
            if let Ok(ws) = tokio_tungstenite::accept_async(stream).await {
                script(ws).await;
            }
        }
    });
    format!("ws://{addr}")
}

async fn send_frame(ws: &mut ServerWs, value: Value) {
    ws.send(Message::Text(value.to_string().into()))
        .await
        .expect("server send");
}

/// Next event within two seconds.
async fn next_event(events: &mut mpsc::Receiver<SessionEvent>) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("event within deadline")
        .expect("event stream open")
}

/// Next non-connection event within the deadline.
async fn next_session_event(events: &mut mpsc::Receiver<SessionEvent>) -> SessionEvent {
    loop {
        match next_event(events).await {
            SessionEvent::ConnectionChanged(_) => continue,
            other => return other,
        }
    }
}

/// Keeps the scripted connection open until the client goes away.
async fn hold_open(mut ws: ServerWs) {
    while let Some(Ok(_)) = ws.next().await {}
}

// =========================================================================
// Connection lifecycle
// =========================================================================

#[tokio::test]
async fn test_connect_emits_connecting_then_connected() {
    let url = scripted(hold_open).await;
    let (client, mut events) = SessionClient::connect(ClientConfig::new(url));

    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::ConnectionChanged(ConnectionState::Connecting)
    );
    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::ConnectionChanged(ConnectionState::Connected)
    );
    assert_eq!(client.connection_state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_unreachable_server_transitions_to_error() {
    // Nothing listens on this port; the connect fails fast.
    let (client, mut events) =
        SessionClient::connect(ClientConfig::new("ws://127.0.0.1:9"));

    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::ConnectionChanged(ConnectionState::Connecting)
    );
    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::ConnectionChanged(ConnectionState::Error)
    );

    // Sends while not connected are dropped, never queued.
    client.send_ready();
    client.send_app_message(json!({ "type": "pinch" }));
    assert_eq!(client.connection_state(), ConnectionState::Error);
}

#[tokio::test]
async fn test_disconnect_resets_phase_and_identity() {
    let url = scripted(|mut ws| async move {
        send_frame(
            &mut ws,
            json!({
                "type": "welcome",
                "participantId": "p1",
                "participantNumber": 1,
                "sessionPhase": "waiting",
            }),
        )
        .await;
        hold_open(ws).await;
    })
    .await;

    let (client, mut events) = SessionClient::connect(ClientConfig::new(url));
    assert!(matches!(
        next_session_event(&mut events).await,
        SessionEvent::SessionJoin { .. }
    ));
    assert!(client.participant_id().is_some());

    client.disconnect();

    assert_eq!(client.connection_state(), ConnectionState::Disconnected);
    assert_eq!(client.phase(), SessionPhase::Waiting);
    assert_eq!(client.participant_id(), None);
    assert_eq!(client.participant_number(), None);
}

// =========================================================================
// Dispatch rule
// =========================================================================

#[tokio::test]
async fn test_welcome_latches_identity_before_event() {
    let url = scripted(|mut ws| async move {
        send_frame(
            &mut ws,
            json!({
                "type": "welcome",
                "participantId": "p2",
                "participantNumber": 2,
                "sessionPhase": "waiting",
                "appData": { "target": 3 },
            }),
        )
        .await;
        hold_open(ws).await;
    })
    .await;

    let (client, mut events) = SessionClient::connect(ClientConfig::new(url));

    match next_session_event(&mut events).await {
        SessionEvent::SessionJoin {
            participant_id,
            participant_number,
            session_phase,
            app_data,
        } => {
            assert_eq!(participant_id, "p2".into());
            assert_eq!(participant_number, ParticipantNumber::TWO);
            assert_eq!(session_phase, SessionPhase::Waiting);
            assert_eq!(app_data.unwrap()["target"], 3);
        }
        other => panic!("expected SessionJoin, got {other:?}"),
    }
    // The mirror was updated before the event was emitted.
    assert_eq!(client.participant_id(), Some("p2".into()));
    assert_eq!(client.participant_number(), Some(ParticipantNumber::TWO));
}

#[tokio::test]
async fn test_legacy_game_started_sets_phase_playing() {
    let url = scripted(|mut ws| async move {
        send_frame(&mut ws, json!({ "type": "game_started" })).await;
        hold_open(ws).await;
    })
    .await;

    let (client, mut events) = SessionClient::connect(ClientConfig::new(url));

    assert_eq!(next_session_event(&mut events).await, SessionEvent::SessionStart);
    assert_eq!(client.phase(), SessionPhase::Playing);
}

#[tokio::test]
async fn test_session_ended_carries_winner_and_reason() {
    let url = scripted(|mut ws| async move {
        send_frame(
            &mut ws,
            json!({
                "type": "session_ended",
                "reason": "completed",
                "winnerId": "p1",
                "winnerNumber": 1,
            }),
        )
        .await;
        hold_open(ws).await;
    })
    .await;

    let (client, mut events) = SessionClient::connect(ClientConfig::new(url));

    match next_session_event(&mut events).await {
        SessionEvent::SessionEnd { reason, winner_id, winner_number, .. } => {
            assert_eq!(reason, duet_protocol::EndReason::Completed);
            assert_eq!(winner_id, Some("p1".into()));
            assert_eq!(winner_number, Some(ParticipantNumber::ONE));
        }
        other => panic!("expected SessionEnd, got {other:?}"),
    }
    assert_eq!(client.phase(), SessionPhase::Finished);
}

#[tokio::test]
async fn test_play_again_status_reports_counts() {
    let url = scripted(|mut ws| async move {
        send_frame(
            &mut ws,
            json!({
                "type": "play_again_status",
                "votedParticipantIds": ["p1", "p2"],
                "totalParticipants": 2,
            }),
        )
        .await;
        hold_open(ws).await;
    })
    .await;

    let (_client, mut events) = SessionClient::connect(ClientConfig::new(url));

    assert_eq!(
        next_session_event(&mut events).await,
        SessionEvent::PlayAgainStatus { voted: 2, total: 2 }
    );
}

#[tokio::test]
async fn test_unknown_kind_passes_through_as_app_event() {
    let payload = json!({ "type": "target_spawned", "x": 0.3, "y": 0.9 });
    let sent = payload.clone();
    let url = scripted(move |mut ws| async move {
        send_frame(&mut ws, sent).await;
        hold_open(ws).await;
    })
    .await;

    let (_client, mut events) = SessionClient::connect(ClientConfig::new(url));

    assert_eq!(next_session_event(&mut events).await, SessionEvent::App(payload));
}

// =========================================================================
// Outbound
// =========================================================================

#[tokio::test]
async fn test_send_ready_emits_canonical_frame() {
    let (seen_tx, mut seen_rx) = mpsc::channel::<String>(4);
    let url = scripted(move |mut ws| async move {
        while let Some(Ok(Message::Text(text))) = ws.next().await {
            let _ = seen_tx.send(text.as_str().to_owned()).await;
        }
    })
    .await;

    let (client, mut events) = SessionClient::connect(ClientConfig::new(url));
    // Wait for the open socket before sending.
    loop {
        if next_event(&mut events).await
            == SessionEvent::ConnectionChanged(ConnectionState::Connected)
        {
            break;
        }
    }

    client.send_ready();
    client.send_play_again_vote();

    let first: Value = serde_json::from_str(
        &tokio::time::timeout(Duration::from_secs(2), seen_rx.recv())
            .await
            .expect("frame deadline")
            .expect("frame"),
    )
    .expect("json");
    assert_eq!(first, json!({ "type": "participant_ready" }));

    let second: Value = serde_json::from_str(
        &tokio::time::timeout(Duration::from_secs(2), seen_rx.recv())
            .await
            .expect("frame deadline")
            .expect("frame"),
    )
    .expect("json");
    assert_eq!(second, json!({ "type": "play_again_vote" }));
}

// =========================================================================
// Reconnection
// =========================================================================

#[tokio::test]
async fn test_reconnect_reissues_welcome() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        // First connection: accept and drop immediately (unexpected close).
        if let Ok((stream, _)) = listener.accept().await {
            let _ = tokio_tungstenite::accept_async(stream).await;
        }
        // Second connection: behave like a fresh session process.
        if let Ok((stream, _)) = listener.accept().await {
            if let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await {
                send_frame(
                    &mut ws,
                    json!({
                        "type": "welcome",
                        "participantId": "p1",
                        "participantNumber": 1,
                        "sessionPhase": "waiting",
                    }),
                )
                .await;
                hold_open(ws).await;
            }
        }
    });

    let config = ClientConfig::new(format!("ws://{addr}")).with_reconnect(
        ReconnectConfig { delay: Duration::from_millis(50), max_attempts: 3 },
    );
    let (client, mut events) = SessionClient::connect(config);

    // Skip connection churn; the reconnected session re-issues welcome.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        assert!(
            tokio::time::Instant::now() < deadline,
            "no SessionJoin after reconnect"
        );
        if let SessionEvent::SessionJoin { .. } = next_event(&mut events).await {
            break;
        }
    }
    assert_eq!(client.participant_id(), Some("p1".into()));
}
