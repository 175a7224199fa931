//! Per-connection handler.
//!
//! Each accepted connection gets its own task running this handler:
//! offer the connection to the session actor for admission, then pump
//! inbound frames into it and activity into the watchdog until the peer
//! goes away. The wrapper never interprets message contents — the one
//! peek it takes is the `type` tag, which the watchdog needs to apply
//! its ignore set.

use duet_monitor::InactivityMonitor;
use duet_session::{Connection, SessionHandle};
use tracing::{debug, info};

use crate::ws::{WsConnection, WsInbound};

/// Drives one connection from admission to close.
pub(crate) async fn drive_connection(
    conn: WsConnection,
    mut inbound: WsInbound,
    session: SessionHandle<WsConnection>,
    monitor: InactivityMonitor,
) {
    monitor.record_connect();

    let participant = match session.connect(conn.clone()).await {
        Ok(Some(participant)) => participant,
        Ok(None) => {
            // Session full: the runtime already sent the error and
            // closed the connection.
            monitor.record_disconnect();
            return;
        }
        Err(err) => {
            debug!(%err, "session gone during admission");
            conn.close();
            monitor.record_disconnect();
            return;
        }
    };
    info!(
        conn = conn.id(),
        participant_id = %participant.id,
        "connection bound to participant"
    );

    while let Some(text) = inbound.next_text().await {
        monitor.record_activity(message_kind(&text).as_deref().unwrap_or(""));
        if session.message(participant.id.clone(), text).await.is_err() {
            break;
        }
    }

    debug!(participant_id = %participant.id, "connection closed");
    let _ = session.disconnect(participant.id.clone()).await;
    monitor.record_disconnect();
    conn.close();
}

/// Extracts the `type` tag of a frame, if it parses at all. Used only
/// for the watchdog's ignore set.
fn message_kind(raw: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(raw).ok()?;
    value.get("type")?.as_str().map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_kind_extracts_type_tag() {
        assert_eq!(
            message_kind(r#"{"type":"hand_pos","x":1}"#),
            Some("hand_pos".to_owned())
        );
    }

    #[test]
    fn test_message_kind_tolerates_garbage() {
        assert_eq!(message_kind("{not-json"), None);
        assert_eq!(message_kind(r#"{"no_type":1}"#), None);
        assert_eq!(message_kind(r#"{"type":7}"#), None);
    }
}
