//! In-memory transport for exercising the session manager without a network.
//!
//! [`MockConnector`] hands out handles that record what was sent to them;
//! the paired [`MockController`] inspects those records, scripts connect,
//! send and close failures, and injects inbound messages, errors and closes
//! into the newest handle.
//!
//! ```no_run
//! use tether_client::{LifecycleOptions, MockConnector, SessionConfig, SessionManager, NoopCallbacks};
//!
//! # async fn example() -> tether_core::TetherResult<()> {
//! let (connector, controller) = MockConnector::new();
//! let manager = SessionManager::new(connector, LifecycleOptions::default());
//! manager.initialize(SessionConfig::new("AIza-test", "", "en-US", NoopCallbacks)).await?;
//! manager.start().await?;
//! manager.send_text("hello").await?;
//! assert_eq!(controller.sent(0).len(), 1);
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tokio::sync::watch;
use tokio::time::Instant;

use tether_core::{ConnectParams, RealtimeInput, ServerMessage, TetherError, TetherResult};

use super::{BoxFuture, Connector, EventSink, TransportHandle};
use crate::state::SessionStatus;

/// One connect call as seen by the mock.
#[derive(Debug, Clone)]
pub struct ConnectRecord {
    pub params: ConnectParams,
    pub at: Instant,
    /// `is_reconnecting` as published by the manager when the connect was issued.
    pub reconnecting: Option<bool>,
    /// `reconnect_attempts` as published by the manager when the connect was issued.
    pub attempts: Option<u32>,
    /// Whether the connect produced a handle.
    pub succeeded: bool,
}

struct HandleRecord {
    sink: EventSink,
    sent: Vec<RealtimeInput>,
    closed: bool,
}

#[derive(Default)]
struct MockState {
    connects: Vec<ConnectRecord>,
    handles: Vec<HandleRecord>,
    connect_failures: VecDeque<TetherError>,
    refuse_connects: Option<String>,
    send_failures: VecDeque<TetherError>,
    fail_closes: bool,
    stall_sends: bool,
    status_view: Option<watch::Receiver<SessionStatus>>,
}

type Shared = Arc<Mutex<MockState>>;

fn lock(shared: &Shared) -> MutexGuard<'_, MockState> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Connector half of the mock transport.
pub struct MockConnector {
    shared: Shared,
}

impl MockConnector {
    pub fn new() -> (Self, MockController) {
        let shared: Shared = Arc::new(Mutex::new(MockState::default()));
        (
            Self {
                shared: Arc::clone(&shared),
            },
            MockController { shared },
        )
    }
}

impl Connector for MockConnector {
    fn connect(
        &self,
        params: ConnectParams,
        events: EventSink,
    ) -> BoxFuture<'_, TetherResult<Box<dyn TransportHandle>>> {
        let shared = Arc::clone(&self.shared);
        Box::pin(async move {
            let mut state = lock(&shared);
            let (reconnecting, attempts) = state
                .status_view
                .as_ref()
                .map(|rx| {
                    let status = rx.borrow();
                    (status.is_reconnecting, status.reconnect_attempts)
                })
                .unzip();

            let failure = match state.connect_failures.pop_front() {
                Some(err) => Some(err),
                None => state
                    .refuse_connects
                    .as_ref()
                    .map(|reason| TetherError::Transport(reason.clone())),
            };

            state.connects.push(ConnectRecord {
                params,
                at: Instant::now(),
                reconnecting,
                attempts,
                succeeded: failure.is_none(),
            });

            if let Some(err) = failure {
                return Err(err);
            }

            let index = state.handles.len();
            state.handles.push(HandleRecord {
                sink: events,
                sent: Vec::new(),
                closed: false,
            });

            Ok(Box::new(MockHandle {
                index,
                shared: Arc::clone(&shared),
            }) as Box<dyn TransportHandle>)
        })
    }
}

struct MockHandle {
    index: usize,
    shared: Shared,
}

impl TransportHandle for MockHandle {
    fn send<'a>(&'a mut self, input: &'a RealtimeInput) -> BoxFuture<'a, TetherResult<()>> {
        Box::pin(async move {
            let stalled = lock(&self.shared).stall_sends;
            if stalled {
                return std::future::pending::<TetherResult<()>>().await;
            }

            let mut state = lock(&self.shared);
            if let Some(err) = state.send_failures.pop_front() {
                return Err(err);
            }
            let record = &mut state.handles[self.index];
            if record.closed {
                return Err(TetherError::Send("handle already closed".into()));
            }
            record.sent.push(input.clone());
            Ok(())
        })
    }

    fn close(&mut self) -> BoxFuture<'_, TetherResult<()>> {
        Box::pin(async move {
            let mut state = lock(&self.shared);
            state.handles[self.index].closed = true;
            if state.fail_closes {
                return Err(TetherError::Transport("close failed".into()));
            }
            Ok(())
        })
    }
}

/// Test-side half of the mock transport.
#[derive(Clone)]
pub struct MockController {
    shared: Shared,
}

impl MockController {
    /// Every connect attempt so far, successful or not.
    pub fn connects(&self) -> Vec<ConnectRecord> {
        lock(&self.shared).connects.clone()
    }

    pub fn connect_count(&self) -> usize {
        lock(&self.shared).connects.len()
    }

    /// Number of handles successfully opened.
    pub fn handle_count(&self) -> usize {
        lock(&self.shared).handles.len()
    }

    /// Inputs written to handle `index` (0-based, in open order).
    pub fn sent(&self, index: usize) -> Vec<RealtimeInput> {
        lock(&self.shared)
            .handles
            .get(index)
            .map(|h| h.sent.clone())
            .unwrap_or_default()
    }

    pub fn is_closed(&self, index: usize) -> bool {
        lock(&self.shared)
            .handles
            .get(index)
            .is_some_and(|h| h.closed)
    }

    /// Handles that were opened and not yet closed by the manager.
    pub fn live_handles(&self) -> usize {
        lock(&self.shared).handles.iter().filter(|h| !h.closed).count()
    }

    pub fn fail_next_connect(&self, error: TetherError) {
        lock(&self.shared).connect_failures.push_back(error);
    }

    /// Make every connect fail with a transient error until [`allow_connects`](Self::allow_connects).
    pub fn refuse_connects(&self, reason: impl Into<String>) {
        lock(&self.shared).refuse_connects = Some(reason.into());
    }

    pub fn allow_connects(&self) {
        lock(&self.shared).refuse_connects = None;
    }

    pub fn fail_next_send(&self, error: TetherError) {
        lock(&self.shared).send_failures.push_back(error);
    }

    pub fn fail_closes(&self, fail: bool) {
        lock(&self.shared).fail_closes = fail;
    }

    /// While set, every write on every handle waits forever.
    pub fn stall_sends(&self, stall: bool) {
        lock(&self.shared).stall_sends = stall;
    }

    /// Record `is_reconnecting` from this receiver on every connect.
    pub fn observe_status(&self, status: watch::Receiver<SessionStatus>) {
        lock(&self.shared).status_view = Some(status);
    }

    /// Deliver an inbound message on the newest handle.
    pub fn push_message(&self, value: Value) -> bool {
        self.with_latest_sink(|sink| sink.message(ServerMessage::new(value)))
    }

    /// Report a transport error on the newest handle.
    pub fn push_error(&self, error: TetherError) -> bool {
        self.with_latest_sink(|sink| sink.error(error))
    }

    /// Report a remote close on the newest handle.
    pub fn push_close(&self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        self.with_latest_sink(|sink| sink.closed(reason))
    }

    /// Report a remote close on a specific (possibly superseded) handle.
    pub fn push_close_on(&self, index: usize, reason: impl Into<String>) -> bool {
        let sink = lock(&self.shared).handles.get(index).map(|h| h.sink.clone());
        sink.is_some_and(|sink| sink.closed(reason))
    }

    fn with_latest_sink(&self, f: impl FnOnce(&EventSink) -> bool) -> bool {
        let sink = lock(&self.shared).handles.last().map(|h| h.sink.clone());
        sink.as_ref().is_some_and(f)
    }
}
