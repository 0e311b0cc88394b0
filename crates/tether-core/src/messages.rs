//! Realtime message shapes.
//!
//! Outbound frames follow the Live API JSON layout (`setup`, `realtimeInput`).
//! Inbound frames are kept opaque: [`ServerMessage`] wraps the raw JSON and
//! exposes accessors for the handful of fields the session manager and the
//! CLI look at.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Model used when the configuration does not name one.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-live-001";

/// Response modality requested when the configuration does not name one.
pub const DEFAULT_RESPONSE_MODALITY: &str = "TEXT";

/// Everything a connector needs to open one transport handle.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectParams {
    pub model: String,
    pub credential: String,
    pub system_instruction: String,
    pub language_code: String,
    pub response_modality: String,
    /// Resumption token carried over from the previous handle, if any.
    pub resumption_token: Option<String>,
}

impl std::fmt::Debug for ConnectParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectParams")
            .field("model", &self.model)
            .field("credential", &"<redacted>")
            .field("language_code", &self.language_code)
            .field("response_modality", &self.response_modality)
            .field("resumption_token", &self.resumption_token.is_some())
            .finish()
    }
}

/// A base64 payload with its MIME type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    pub data: String,
    pub mime_type: String,
}

/// One outbound user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RealtimeInput {
    Text(String),
    Audio(Blob),
    Media(Blob),
}

impl RealtimeInput {
    /// Short label used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Audio(_) => "audio",
            Self::Media(_) => "media",
        }
    }
}

// ── Client frames ────────────────────────────────────────────────────

/// Top-level client frame: `{"setup": ...}` or `{"realtimeInput": ...}`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientFrame {
    Setup(SetupFrame),
    RealtimeInput(RealtimeInputFrame),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupFrame {
    pub model: String,
    pub generation_config: GenerationConfig,
    pub system_instruction: Content,
    pub context_window_compression: ContextWindowCompression,
    pub session_resumption: SessionResumption,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
    pub speech_config: SpeechConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub language_code: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Content {
    pub parts: Vec<TextPart>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TextPart {
    pub text: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextWindowCompression {
    pub sliding_window: SlidingWindow,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SlidingWindow {}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionResumption {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInputFrame {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<Blob>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_chunks: Option<Vec<Blob>>,
}

impl From<&ConnectParams> for SetupFrame {
    fn from(params: &ConnectParams) -> Self {
        let model = if params.model.starts_with("models/") {
            params.model.clone()
        } else {
            format!("models/{}", params.model)
        };
        Self {
            model,
            generation_config: GenerationConfig {
                response_modalities: vec![params.response_modality.clone()],
                speech_config: SpeechConfig {
                    language_code: params.language_code.clone(),
                },
            },
            system_instruction: Content {
                parts: vec![TextPart {
                    text: params.system_instruction.clone(),
                }],
            },
            context_window_compression: ContextWindowCompression::default(),
            session_resumption: SessionResumption {
                handle: params.resumption_token.clone(),
            },
        }
    }
}

impl From<&RealtimeInput> for RealtimeInputFrame {
    fn from(input: &RealtimeInput) -> Self {
        match input {
            RealtimeInput::Text(text) => Self {
                text: Some(text.clone()),
                ..Default::default()
            },
            RealtimeInput::Audio(blob) => Self {
                audio: Some(blob.clone()),
                ..Default::default()
            },
            RealtimeInput::Media(blob) => Self {
                media_chunks: Some(vec![blob.clone()]),
                ..Default::default()
            },
        }
    }
}

// ── Server messages ──────────────────────────────────────────────────

/// An inbound message, passed through to callers unmodified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerMessage(Value);

impl ServerMessage {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn raw(&self) -> &Value {
        &self.0
    }

    pub fn into_raw(self) -> Value {
        self.0
    }

    /// New resumption token carried by a `sessionResumptionUpdate`, if any.
    pub fn resumption_token(&self) -> Option<&str> {
        self.0
            .get("sessionResumptionUpdate")?
            .get("newHandle")?
            .as_str()
            .filter(|h| !h.is_empty())
    }

    /// Whether the service announced it is about to terminate the connection.
    pub fn is_go_away(&self) -> bool {
        self.0.get("goAway").is_some_and(|v| !v.is_null())
    }

    /// Remaining time announced in a `goAway` message (e.g. `"10s"`).
    pub fn go_away_time_left(&self) -> Option<&str> {
        self.0.get("goAway")?.get("timeLeft")?.as_str()
    }

    pub fn is_setup_complete(&self) -> bool {
        self.0.get("setupComplete").is_some()
    }

    /// Text fragments of the model turn in this message.
    pub fn text_parts(&self) -> Vec<&str> {
        self.0
            .pointer("/serverContent/modelTurn/parts")
            .and_then(Value::as_array)
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| p.get("text").and_then(Value::as_str))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn generation_complete(&self) -> bool {
        self.server_content_flag("generationComplete")
    }

    pub fn turn_complete(&self) -> bool {
        self.server_content_flag("turnComplete")
    }

    fn server_content_flag(&self, name: &str) -> bool {
        self.0
            .get("serverContent")
            .and_then(|c| c.get(name))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

impl From<Value> for ServerMessage {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(token: Option<&str>) -> ConnectParams {
        ConnectParams {
            model: DEFAULT_MODEL.into(),
            credential: "AIzaSecret".into(),
            system_instruction: "be brief".into(),
            language_code: "en-US".into(),
            response_modality: DEFAULT_RESPONSE_MODALITY.into(),
            resumption_token: token.map(str::to_string),
        }
    }

    #[test]
    fn setup_frame_layout() {
        let frame = ClientFrame::Setup(SetupFrame::from(&params(Some("h-1"))));
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["setup"]["model"], "models/gemini-2.0-flash-live-001");
        assert_eq!(value["setup"]["generationConfig"]["responseModalities"][0], "TEXT");
        assert_eq!(value["setup"]["generationConfig"]["speechConfig"]["languageCode"], "en-US");
        assert_eq!(value["setup"]["systemInstruction"]["parts"][0]["text"], "be brief");
        assert_eq!(value["setup"]["contextWindowCompression"]["slidingWindow"], json!({}));
        assert_eq!(value["setup"]["sessionResumption"]["handle"], "h-1");
    }

    #[test]
    fn setup_frame_without_token_omits_handle() {
        let frame = ClientFrame::Setup(SetupFrame::from(&params(None)));
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["setup"]["sessionResumption"], json!({}));
    }

    #[test]
    fn realtime_input_frames() {
        let text = ClientFrame::RealtimeInput((&RealtimeInput::Text("hi".into())).into());
        assert_eq!(serde_json::to_value(&text).unwrap(), json!({"realtimeInput": {"text": "hi"}}));

        let media = RealtimeInput::Media(Blob {
            data: "AAAA".into(),
            mime_type: "image/jpeg".into(),
        });
        let frame = ClientFrame::RealtimeInput((&media).into());
        assert_eq!(
            serde_json::to_value(&frame).unwrap(),
            json!({"realtimeInput": {"mediaChunks": [{"data": "AAAA", "mimeType": "image/jpeg"}]}})
        );
    }

    #[test]
    fn server_message_accessors() {
        let msg = ServerMessage::new(json!({
            "sessionResumptionUpdate": {"newHandle": "tok-7", "resumable": true}
        }));
        assert_eq!(msg.resumption_token(), Some("tok-7"));
        assert!(!msg.is_go_away());

        let msg = ServerMessage::new(json!({"goAway": {"timeLeft": "10s"}}));
        assert!(msg.is_go_away());
        assert_eq!(msg.go_away_time_left(), Some("10s"));
        assert_eq!(msg.resumption_token(), None);

        let msg = ServerMessage::new(json!({
            "serverContent": {
                "modelTurn": {"parts": [{"text": "Hel"}, {"inlineData": {}}, {"text": "lo"}]},
                "generationComplete": true
            }
        }));
        assert_eq!(msg.text_parts(), vec!["Hel", "lo"]);
        assert!(msg.generation_complete());
        assert!(!msg.turn_complete());
    }

    #[test]
    fn connect_params_debug_redacts_credential() {
        let rendered = format!("{:?}", params(None));
        assert!(!rendered.contains("AIzaSecret"));
        assert!(rendered.contains("<redacted>"));
    }
}
