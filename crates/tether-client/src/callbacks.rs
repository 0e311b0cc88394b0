//! Lifecycle callbacks delivered to the caller.

use tokio::sync::mpsc;

use tether_core::{ServerMessage, TetherError};

/// Why a handle went away, as reported to `on_close`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    pub reason: String,
    /// `true` when the caller asked for the close.
    pub initiated_by_client: bool,
}

impl CloseReason {
    pub fn remote(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            initiated_by_client: false,
        }
    }

    pub fn client() -> Self {
        Self {
            reason: "closed by client".to_string(),
            initiated_by_client: true,
        }
    }
}

/// Receives lifecycle notifications from the session manager.
///
/// Called from the manager task; implementations should hand work off rather
/// than block.
pub trait SessionCallbacks: Send + Sync {
    fn on_open(&self) {}
    fn on_message(&self, _message: &ServerMessage) {}
    fn on_error(&self, _error: &TetherError) {}
    fn on_close(&self, _reason: &CloseReason) {}
    fn on_max_reconnect_attempts_reached(&self) {}
    fn on_auth_error(&self, _error: &TetherError) {}
}

/// Callback set that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCallbacks;

impl SessionCallbacks for NoopCallbacks {}

/// Lifecycle notification as a value, for callers that prefer a channel.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Open,
    Message(ServerMessage),
    Error(String),
    Closed(CloseReason),
    MaxReconnectAttemptsReached,
    AuthError(String),
}

impl SessionCallbacks for mpsc::UnboundedSender<SessionEvent> {
    fn on_open(&self) {
        let _ = self.send(SessionEvent::Open);
    }

    fn on_message(&self, message: &ServerMessage) {
        let _ = self.send(SessionEvent::Message(message.clone()));
    }

    fn on_error(&self, error: &TetherError) {
        let _ = self.send(SessionEvent::Error(error.to_string()));
    }

    fn on_close(&self, reason: &CloseReason) {
        let _ = self.send(SessionEvent::Closed(reason.clone()));
    }

    fn on_max_reconnect_attempts_reached(&self) {
        let _ = self.send(SessionEvent::MaxReconnectAttemptsReached);
    }

    fn on_auth_error(&self, error: &TetherError) {
        let _ = self.send(SessionEvent::AuthError(error.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn channel_adapter_forwards_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.on_open();
        tx.on_message(&ServerMessage::new(json!({"x": 1})));
        tx.on_auth_error(&TetherError::Auth("API key not valid".into()));
        tx.on_close(&CloseReason::client());

        assert_eq!(rx.try_recv().unwrap(), SessionEvent::Open);
        assert!(matches!(rx.try_recv().unwrap(), SessionEvent::Message(_)));
        assert_eq!(
            rx.try_recv().unwrap(),
            SessionEvent::AuthError("authentication failed: API key not valid".into())
        );
        assert_eq!(rx.try_recv().unwrap(), SessionEvent::Closed(CloseReason::client()));
    }
}
