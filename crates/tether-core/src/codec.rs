//! JSON framing for the realtime channel.
//!
//! One frame per WebSocket message. The service sends JSON either as text or
//! as binary frames, so decoding accepts raw bytes.

use crate::error::TetherResult;
use crate::messages::{ClientFrame, RealtimeInput, ServerMessage};

/// Encode a serializable frame as a JSON string.
pub fn encode_frame<T: serde::Serialize>(value: &T) -> TetherResult<String> {
    Ok(serde_json::to_string(value)?)
}

/// Encode one realtime input as a `realtimeInput` frame.
pub fn encode_input(input: &RealtimeInput) -> TetherResult<String> {
    encode_frame(&ClientFrame::RealtimeInput(input.into()))
}

/// Decode a JSON payload into a server message.
pub fn decode_message(data: &[u8]) -> TetherResult<ServerMessage> {
    Ok(serde_json::from_slice(data)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TetherError;

    #[test]
    fn encode_text_input() {
        let encoded = encode_input(&RealtimeInput::Text("ping".into())).unwrap();
        assert_eq!(encoded, r#"{"realtimeInput":{"text":"ping"}}"#);
    }

    #[test]
    fn decode_valid_message() {
        let msg = decode_message(br#"{"setupComplete":{}}"#).unwrap();
        assert!(msg.is_setup_complete());
    }

    #[test]
    fn decode_invalid_message() {
        let err = decode_message(b"not json").unwrap_err();
        assert!(matches!(err, TetherError::Codec(_)));
    }
}
