//! Codec trait and implementations for serializing/deserializing frames.
//!
//! The contract requires one self-delimited *text* frame per logical
//! message, so codecs here produce and consume `String`s rather than raw
//! bytes. The runtime and client accept any serializer/parser pair that
//! are inverses on valid inputs; [`JsonCodec`] is the reference pair.

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// Encodes Rust types to text frames and decodes frames back.
///
/// `Send + Sync + 'static` so a codec can live inside long-running async
/// tasks on either side of the wire.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into a single text frame.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError>;

    /// Deserializes a text frame back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the frame is malformed or does
    /// not match the expected shape.
    fn decode<T: DeserializeOwned>(&self, text: &str) -> Result<T, ProtocolError>;
}

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// JSON is the reference serialization of the contract: human-readable,
/// inspectable in browser DevTools, and self-delimited per WebSocket text
/// frame. Behind the `json` feature flag (enabled by default).
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError> {
        serde_json::to_string(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, text: &str) -> Result<T, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::Decode)
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;
    use crate::{ParticipantNumber, ServerFrame, SessionPhase};

    #[test]
    fn test_json_codec_round_trips_server_frame() {
        let codec = JsonCodec;
        let frame = ServerFrame::Welcome {
            participant_id: "p1".into(),
            participant_number: ParticipantNumber::ONE,
            session_phase: SessionPhase::Waiting,
            app_data: None,
        };
        let text = codec.encode(&frame).unwrap();
        let decoded: ServerFrame = codec.decode(&text).unwrap();
        assert_eq!(frame, decoded);
    }

    #[test]
    fn test_json_codec_decode_garbage_returns_error() {
        let codec = JsonCodec;
        let result: Result<ServerFrame, _> = codec.decode("{not-json");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }
}
