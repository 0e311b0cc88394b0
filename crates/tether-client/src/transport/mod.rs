//! Transport boundary of the session manager.
//!
//! A [`Connector`] opens one [`TransportHandle`] per connect call. The handle
//! is disposable: the manager replaces it wholesale on every refresh and
//! reconnect. Inbound traffic and connection loss are reported through the
//! [`EventSink`] the connector receives, tagged with the handle generation so
//! the manager can ignore events from handles it has already replaced.

#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod websocket;

#[cfg(any(test, feature = "test-util"))]
pub use mock::{ConnectRecord, MockConnector, MockController};
pub use websocket::{WebSocketConnector, WebSocketSession, DEFAULT_ENDPOINT};

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;

use tether_core::{ConnectParams, RealtimeInput, ServerMessage, TetherError, TetherResult};

/// Boxed, sendable future returned by the transport traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Something a live handle reports back to the manager.
#[derive(Debug)]
pub enum TransportEvent {
    /// An inbound message, in arrival order.
    Message(ServerMessage),
    /// The connection failed. The handle is considered dead afterwards.
    Error(TetherError),
    /// The remote side (or the network) closed the connection.
    Closed { reason: String },
}

/// A transport event together with the generation of the handle that sent it.
#[derive(Debug)]
pub(crate) struct TaggedEvent {
    pub generation: u64,
    pub event: TransportEvent,
}

/// Callback shim handed to a connector for one handle.
///
/// Cloneable so transports can move it into their read loops. All methods
/// return `false` once the manager has gone away.
#[derive(Debug, Clone)]
pub struct EventSink {
    generation: u64,
    tx: mpsc::UnboundedSender<TaggedEvent>,
}

impl EventSink {
    pub(crate) fn new(generation: u64, tx: mpsc::UnboundedSender<TaggedEvent>) -> Self {
        Self { generation, tx }
    }

    /// Generation of the handle this sink belongs to.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn message(&self, message: ServerMessage) -> bool {
        self.emit(TransportEvent::Message(message))
    }

    pub fn error(&self, error: TetherError) -> bool {
        self.emit(TransportEvent::Error(error))
    }

    pub fn closed(&self, reason: impl Into<String>) -> bool {
        self.emit(TransportEvent::Closed {
            reason: reason.into(),
        })
    }

    fn emit(&self, event: TransportEvent) -> bool {
        self.tx
            .send(TaggedEvent {
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}

/// One open bidirectional channel to the realtime service.
pub trait TransportHandle: Send {
    /// Write one realtime input.
    fn send<'a>(&'a mut self, input: &'a RealtimeInput) -> BoxFuture<'a, TetherResult<()>>;

    /// Close the channel. Errors are reported but the handle is unusable either way.
    fn close(&mut self) -> BoxFuture<'_, TetherResult<()>>;
}

/// Opens transport handles.
///
/// `connect` resolves only once the handle is open and ready for input; that
/// resolution is the open signal the manager acts on.
pub trait Connector: Send + Sync {
    fn connect(
        &self,
        params: ConnectParams,
        events: EventSink,
    ) -> BoxFuture<'_, TetherResult<Box<dyn TransportHandle>>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sink_tags_events_with_generation() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(7, tx);
        assert!(sink.message(ServerMessage::new(json!({"a": 1}))));
        assert!(sink.closed("bye"));

        let first = rx.try_recv().unwrap();
        assert_eq!(first.generation, 7);
        assert!(matches!(first.event, TransportEvent::Message(_)));

        let second = rx.try_recv().unwrap();
        assert!(matches!(second.event, TransportEvent::Closed { ref reason } if reason == "bye"));
    }

    #[test]
    fn sink_reports_dropped_manager() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(1, tx);
        drop(rx);
        assert!(!sink.error(TetherError::Timeout));
    }
}
