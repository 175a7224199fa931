//! Unified error type for the duet server wrapper.

/// Top-level error wrapping the layer-specific errors.
///
/// The `#[from]` variants let `?` convert sub-crate errors automatically,
/// so applications deal with one error type.
#[derive(Debug, thiserror::Error)]
pub enum DuetError {
    /// Binding the listen socket failed.
    #[error("bind failed: {0}")]
    Bind(#[source] std::io::Error),

    /// Accepting a TCP connection failed.
    #[error("accept failed: {0}")]
    Accept(#[source] std::io::Error),

    /// The WebSocket upgrade handshake failed.
    #[error("websocket handshake failed: {0}")]
    Handshake(#[source] tokio_tungstenite::tungstenite::Error),

    /// A session-layer error (the session task is gone).
    #[error(transparent)]
    Session(#[from] duet_session::SessionError),

    /// A protocol-layer error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] duet_protocol::ProtocolError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_session_error() {
        let err: DuetError = duet_session::SessionError::Unavailable.into();
        assert!(matches!(err, DuetError::Session(_)));
        assert!(err.to_string().contains("unavailable"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err: DuetError =
            duet_protocol::ProtocolError::InvalidMessage("bad".into()).into();
        assert!(matches!(err, DuetError::Protocol(_)));
    }
}
