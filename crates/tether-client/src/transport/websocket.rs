//! WebSocket transport for the realtime service.
//!
//! One WebSocket per handle. The connect sequence is:
//!
//! 1. open `{endpoint}?key={credential}`
//! 2. send the `setup` frame (model, modalities, instruction, resumption handle)
//! 3. wait for `setupComplete`, then hand the session to the manager
//!
//! After setup a read loop forwards every JSON frame to the manager's event
//! sink and reports close frames and read errors.

use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use tether_core::{
    classify_message, decode_message, encode_frame, encode_input, ClientFrame, ConnectParams,
    ErrorClass, RealtimeInput, SetupFrame, TetherError, TetherResult,
};

use super::{BoxFuture, Connector, EventSink, TransportHandle};

/// Live API bidirectional streaming endpoint.
pub const DEFAULT_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsRead = SplitStream<WsStream>;

/// Opens [`WebSocketSession`]s against a fixed endpoint.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    endpoint: String,
}

impl WebSocketConnector {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self::new(DEFAULT_ENDPOINT)
    }
}

impl Connector for WebSocketConnector {
    fn connect(
        &self,
        params: ConnectParams,
        events: EventSink,
    ) -> BoxFuture<'_, TetherResult<Box<dyn TransportHandle>>> {
        Box::pin(async move {
            let session = WebSocketSession::connect(&self.endpoint, &params, events).await?;
            Ok(Box::new(session) as Box<dyn TransportHandle>)
        })
    }
}

/// Map a transport failure to `Auth` or `Transport` by its message.
fn transport_error(message: String) -> TetherError {
    match classify_message(&message) {
        ErrorClass::Auth => TetherError::Auth(message),
        _ => TetherError::Transport(message),
    }
}

/// One open WebSocket to the realtime service.
pub struct WebSocketSession {
    sink: Arc<Mutex<WsSink>>,
    read_handle: tokio::task::JoinHandle<()>,
}

impl WebSocketSession {
    /// Connect, perform the setup exchange and start the read loop.
    pub async fn connect(
        endpoint: &str,
        params: &ConnectParams,
        events: EventSink,
    ) -> TetherResult<Self> {
        let url = format!("{endpoint}?key={}", params.credential);
        let (ws, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| transport_error(format!("WebSocket connect error: {e}")))?;

        debug!(generation = events.generation(), "WebSocket connected");

        let (mut sink, mut read) = ws.split();

        let setup = encode_frame(&ClientFrame::Setup(SetupFrame::from(params)))?;
        sink.send(Message::Text(setup))
            .await
            .map_err(|e| transport_error(format!("WS setup send error: {e}")))?;

        Self::await_setup_complete(&mut read, &mut sink, &events).await?;
        info!(
            generation = events.generation(),
            model = %params.model,
            resumed = params.resumption_token.is_some(),
            "realtime session ready"
        );

        let sink = Arc::new(Mutex::new(sink));
        let read_handle = {
            let sink = Arc::clone(&sink);
            tokio::spawn(async move {
                Self::read_loop(read, sink, events).await;
            })
        };

        Ok(Self { sink, read_handle })
    }

    /// Read frames until `setupComplete`. Anything else is forwarded as-is.
    async fn await_setup_complete(
        read: &mut WsRead,
        sink: &mut WsSink,
        events: &EventSink,
    ) -> TetherResult<()> {
        while let Some(msg) = read.next().await {
            let data = match msg {
                Ok(Message::Text(text)) => text.into_bytes(),
                Ok(Message::Binary(data)) => data,
                Ok(Message::Ping(payload)) => {
                    let _ = sink.send(Message::Pong(payload)).await;
                    continue;
                }
                Ok(Message::Close(frame)) => {
                    let reason = frame.map(|f| f.reason.to_string()).unwrap_or_default();
                    return Err(transport_error(format!(
                        "connection closed during setup: {reason}"
                    )));
                }
                Ok(_) => continue,
                Err(e) => {
                    return Err(transport_error(format!("WebSocket read error: {e}")));
                }
            };

            let message = decode_message(&data)?;
            if message.is_setup_complete() {
                return Ok(());
            }
            events.message(message);
        }

        Err(TetherError::Transport(
            "connection ended during setup".into(),
        ))
    }

    async fn read_loop(mut read: WsRead, sink: Arc<Mutex<WsSink>>, events: EventSink) {
        while let Some(msg) = read.next().await {
            let data = match msg {
                Ok(Message::Text(text)) => text.into_bytes(),
                Ok(Message::Binary(data)) => data,
                Ok(Message::Ping(payload)) => {
                    let mut sink = sink.lock().await;
                    let _ = sink.send(Message::Pong(payload)).await;
                    continue;
                }
                Ok(Message::Close(frame)) => {
                    let reason = frame.map(|f| f.reason.to_string()).unwrap_or_default();
                    debug!(reason = %reason, "WebSocket close frame received");
                    events.closed(reason);
                    return;
                }
                Ok(_) => continue,
                Err(e) => {
                    events.error(transport_error(format!("WebSocket read error: {e}")));
                    return;
                }
            };

            match decode_message(&data) {
                Ok(message) => {
                    if !events.message(message) {
                        debug!("session manager gone, stopping read loop");
                        return;
                    }
                }
                Err(e) => warn!(error = %e, "failed to decode server message"),
            }
        }

        events.closed("connection ended");
    }
}

impl TransportHandle for WebSocketSession {
    fn send<'a>(&'a mut self, input: &'a RealtimeInput) -> BoxFuture<'a, TetherResult<()>> {
        Box::pin(async move {
            let frame = encode_input(input)?;
            let mut sink = self.sink.lock().await;
            sink.send(Message::Text(frame))
                .await
                .map_err(|e| TetherError::Send(format!("WS send error: {e}")))
        })
    }

    fn close(&mut self) -> BoxFuture<'_, TetherResult<()>> {
        Box::pin(async move {
            let result = {
                let mut sink = self.sink.lock().await;
                sink.send(Message::Close(None)).await
            };
            self.read_handle.abort();
            result.map_err(|e| TetherError::Transport(format!("WS close error: {e}")))
        })
    }
}

impl Drop for WebSocketSession {
    fn drop(&mut self) {
        self.read_handle.abort();
    }
}
