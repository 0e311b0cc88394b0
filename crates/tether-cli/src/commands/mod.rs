//! CLI subcommand implementations.

pub mod chat;
pub mod send;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::info;

use tether_client::{
    LifecycleOptions, ServerMessage, SessionConfig, SessionEvent, SessionManager,
    WebSocketConnector,
};

/// Effective settings after merging flags, environment and config file.
#[derive(Clone)]
pub struct Settings {
    pub credential: String,
    pub system_instruction: String,
    pub language: String,
    pub model: String,
    pub endpoint: String,
    pub options: LifecycleOptions,
}

/// Build a manager over the WebSocket transport and open the first handle.
pub async fn open_session(
    settings: &Settings,
) -> Result<(SessionManager, mpsc::UnboundedReceiver<SessionEvent>)> {
    let manager = SessionManager::new(
        WebSocketConnector::new(&settings.endpoint),
        settings.options.clone(),
    );

    let (events_tx, events) = mpsc::unbounded_channel();
    let config = SessionConfig::new(
        &settings.credential,
        &settings.system_instruction,
        &settings.language,
        events_tx,
    )
    .with_model(&settings.model);

    manager.initialize(config).await?;
    info!(model = %settings.model, language = %settings.language, "connecting");
    manager
        .start()
        .await
        .context("failed to connect to the realtime service")?;

    Ok((manager, events))
}

/// Accumulates model text across messages until a generation completes.
#[derive(Debug, Default)]
pub struct ResponseBuffer {
    text: String,
}

impl ResponseBuffer {
    /// Feed one message; returns the finished response if this message ended one.
    ///
    /// Text is flushed on `generationComplete`, or on `turnComplete` when the
    /// service skipped the generation marker.
    pub fn push(&mut self, message: &ServerMessage) -> Option<String> {
        for part in message.text_parts() {
            self.text.push_str(part);
        }

        let done = message.generation_complete() || message.turn_complete();
        if done && !self.text.is_empty() {
            Some(std::mem::take(&mut self.text))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn model_text(text: &str) -> ServerMessage {
        ServerMessage::new(json!({
            "serverContent": {"modelTurn": {"parts": [{"text": text}]}}
        }))
    }

    #[test]
    fn buffers_until_generation_complete() {
        let mut buffer = ResponseBuffer::default();
        assert_eq!(buffer.push(&model_text("Tell them ")), None);
        assert_eq!(buffer.push(&model_text("about the migration.")), None);

        let done = ServerMessage::new(json!({"serverContent": {"generationComplete": true}}));
        assert_eq!(
            buffer.push(&done).as_deref(),
            Some("Tell them about the migration.")
        );

        // The turnComplete that follows has nothing left to flush.
        let turn = ServerMessage::new(json!({"serverContent": {"turnComplete": true}}));
        assert_eq!(buffer.push(&turn), None);
    }

    #[test]
    fn turn_complete_flushes_without_generation_marker() {
        let mut buffer = ResponseBuffer::default();
        let msg = ServerMessage::new(json!({
            "serverContent": {
                "modelTurn": {"parts": [{"text": "Yes."}]},
                "turnComplete": true
            }
        }));
        assert_eq!(buffer.push(&msg).as_deref(), Some("Yes."));
    }

    #[test]
    fn ignores_non_text_messages() {
        let mut buffer = ResponseBuffer::default();
        let msg = ServerMessage::new(json!({"sessionResumptionUpdate": {"newHandle": "h"}}));
        assert_eq!(buffer.push(&msg), None);
    }
}
