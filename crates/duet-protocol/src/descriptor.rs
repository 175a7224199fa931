//! The client bootstrap document.
//!
//! The lobby (or whatever static surface fronts a session process)
//! publishes a small JSON document — by convention `session.json` — that
//! tells a client where and what it is connecting to. The format is
//! advisory; any mechanism carrying the same fields works.

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// The `session.json` bootstrap document: `{ appId, sessionId, wsUrl, lobbyUrl }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDescriptor {
    /// Which application this session hosts.
    pub app_id: String,
    /// The lobby-assigned session identifier. Uninterpreted.
    pub session_id: String,
    /// The WebSocket URL the client should connect to.
    pub ws_url: String,
    /// Where the client's "return to lobby" link points.
    pub lobby_url: String,
}

impl SessionDescriptor {
    /// Parses a descriptor from its JSON text.
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::Decode)
    }

    /// The same-host fallback used when no descriptor is available:
    /// a WebSocket on `/ws` at the given host.
    pub fn fallback_ws_url(host: &str) -> String {
        format!("ws://{host}/ws")
    }
}
