//! The session lifecycle manager.
//!
//! `SessionManager` keeps one logical realtime session alive across many
//! transport handles. It opens a handle on `start`, replaces it before the
//! service's lifetime cap, reopens it when a send finds it stale or idle,
//! carries the resumption token from handle to handle, and reconnects with
//! exponential backoff after an unexpected close.
//!
//! All state lives in a single task. Caller requests, transport events and
//! timer deadlines are serialized through one `select!` loop, so at most one
//! handle exists at any instant and a send that needs a fresh handle simply
//! waits for it.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, error, info, trace, warn};

use tether_core::{
    classify_message, Blob, ErrorClass, RealtimeInput, ServerMessage, TetherError, TetherResult,
};

use crate::backoff::Backoff;
use crate::callbacks::{CloseReason, NoopCallbacks, SessionCallbacks};
use crate::config::{LifecycleOptions, SessionConfig};
use crate::state::{CloseCause, SessionState, SessionStatus};
use crate::transport::{Connector, EventSink, TaggedEvent, TransportEvent, TransportHandle};

/// Depth of the caller request queue.
const COMMAND_QUEUE_DEPTH: usize = 256;

/// Requests from the public handle to the manager task.
enum Command {
    Initialize {
        config: SessionConfig,
        reply: oneshot::Sender<()>,
    },
    Start {
        reply: oneshot::Sender<TetherResult<()>>,
    },
    Send {
        input: RealtimeInput,
        reply: oneshot::Sender<TetherResult<()>>,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Owner-facing handle to a running session manager.
///
/// Every method is a request to the manager task and resolves once the task
/// has handled it. Dropping the handle shuts the task down and closes any open
/// transport handle.
pub struct SessionManager {
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<SessionStatus>,
    task: Option<JoinHandle<()>>,
}

impl SessionManager {
    /// Spawn a manager on the current tokio runtime.
    pub fn new<C: Connector + 'static>(connector: C, options: LifecycleOptions) -> Self {
        Self::with_connector(Arc::new(connector), options)
    }

    pub fn with_connector(connector: Arc<dyn Connector>, options: LifecycleOptions) -> Self {
        let (commands, command_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (status_tx, status) = watch::channel(SessionStatus::default());

        let actor = Actor::new(connector, options, events_tx, status_tx);
        let task = tokio::spawn(actor.run(command_rx, events_rx));

        Self {
            commands,
            status,
            task: Some(task),
        }
    }

    /// Set (or replace) the configuration. Does not connect.
    pub async fn initialize(&self, config: SessionConfig) -> TetherResult<()> {
        self.request(|reply| Command::Initialize { config, reply }).await
    }

    /// Open a fresh handle, closing any existing one first.
    pub async fn start(&self) -> TetherResult<()> {
        self.request(|reply| Command::Start { reply }).await?
    }

    pub async fn send_text(&self, message: impl Into<String>) -> TetherResult<()> {
        self.send(RealtimeInput::Text(message.into())).await
    }

    /// Send raw audio bytes (base64-encoded on the wire).
    pub async fn send_audio(
        &self,
        data: impl AsRef<[u8]>,
        mime_type: impl Into<String>,
    ) -> TetherResult<()> {
        self.send(RealtimeInput::Audio(blob(data.as_ref(), mime_type.into())))
            .await
    }

    /// Send raw media bytes such as a JPEG frame (base64-encoded on the wire).
    pub async fn send_media(
        &self,
        data: impl AsRef<[u8]>,
        mime_type: impl Into<String>,
    ) -> TetherResult<()> {
        self.send(RealtimeInput::Media(blob(data.as_ref(), mime_type.into())))
            .await
    }

    /// Send a prepared input.
    pub async fn send(&self, input: RealtimeInput) -> TetherResult<()> {
        self.request(|reply| Command::Send { input, reply }).await?
    }

    /// Close the current handle. Never fails; transport errors are logged.
    pub async fn close_current_session(&self) {
        if self.request(|reply| Command::Close { reply }).await.is_err() {
            debug!("close requested after manager stopped");
        }
    }

    /// Latest published status.
    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    /// Receiver that observes every status change.
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    /// Close the session, discard the resumption token and stop the task.
    pub async fn shutdown(mut self) {
        let _ = self.request(|reply| Command::Shutdown { reply }).await;
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> TetherResult<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| TetherError::Other("session manager stopped".into()))?;
        rx.await
            .map_err(|_| TetherError::Other("session manager stopped".into()))
    }
}

fn blob(data: &[u8], mime_type: String) -> Blob {
    Blob {
        data: base64::engine::general_purpose::STANDARD.encode(data),
        mime_type,
    }
}

/// What prompted a handle replacement.
#[derive(Debug, Clone, Copy)]
enum RefreshTrigger {
    Scheduled,
    GoAway,
    Stale,
    SendFailure,
}

impl RefreshTrigger {
    fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::GoAway => "go_away",
            Self::Stale => "stale",
            Self::SendFailure => "send_failure",
        }
    }
}

/// The manager task. Sole owner of all session state.
struct Actor {
    connector: Arc<dyn Connector>,
    options: LifecycleOptions,
    backoff: Backoff,
    config: Option<SessionConfig>,
    handle: Option<Box<dyn TransportHandle>>,
    /// Generation of the newest connect; events tagged otherwise are stale.
    generation: u64,
    events_tx: mpsc::UnboundedSender<TaggedEvent>,
    status_tx: watch::Sender<SessionStatus>,
    state: SessionState,
    close_cause: Option<CloseCause>,
    resumption_token: Option<String>,
    started_at: Option<Instant>,
    last_activity_at: Option<Instant>,
    reconnect_attempts: u32,
    is_reconnecting: bool,
    handles_opened: u64,
    refresh_at: Option<Instant>,
    reconnect_at: Option<Instant>,
}

impl Actor {
    fn new(
        connector: Arc<dyn Connector>,
        options: LifecycleOptions,
        events_tx: mpsc::UnboundedSender<TaggedEvent>,
        status_tx: watch::Sender<SessionStatus>,
    ) -> Self {
        Self {
            connector,
            backoff: options.backoff(),
            options,
            config: None,
            handle: None,
            generation: 0,
            events_tx,
            status_tx,
            state: SessionState::Uninitialized,
            close_cause: None,
            resumption_token: None,
            started_at: None,
            last_activity_at: None,
            reconnect_attempts: 0,
            is_reconnecting: false,
            handles_opened: 0,
            refresh_at: None,
            reconnect_at: None,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut events: mpsc::UnboundedReceiver<TaggedEvent>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown { reply }) => {
                        self.shutdown().await;
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command).await,
                    None => {
                        self.shutdown().await;
                        break;
                    }
                },

                Some(tagged) = events.recv() => self.handle_event(tagged).await,

                _ = sleep_until(self.refresh_at), if self.refresh_at.is_some() => {
                    self.refresh_at = None;
                    if self.handle.is_some() {
                        info!("scheduled session refresh triggered");
                        let _ = self.refresh(RefreshTrigger::Scheduled).await;
                    }
                }

                _ = sleep_until(self.reconnect_at), if self.reconnect_at.is_some() => {
                    self.reconnect_at = None;
                    let _ = self.reconnect().await;
                }
            }
        }

        debug!("session manager loop ended");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Initialize { config, reply } => {
                self.initialize(config);
                let _ = reply.send(());
            }
            Command::Start { reply } => {
                let result = self.start().await;
                let _ = reply.send(result);
            }
            Command::Send { input, reply } => {
                let result = self.send(input).await;
                let _ = reply.send(result);
            }
            Command::Close { reply } => {
                self.close_current_session().await;
                let _ = reply.send(());
            }
            Command::Shutdown { reply } => {
                self.shutdown().await;
                let _ = reply.send(());
            }
        }
    }

    // ── Caller operations ────────────────────────────────────────────

    fn initialize(&mut self, config: SessionConfig) {
        info!(model = %config.model, language = %config.language_code, "session manager initialized");
        self.config = Some(config);
    }

    async fn start(&mut self) -> TetherResult<()> {
        if self.config.is_none() {
            return Err(TetherError::NotInitialized);
        }

        self.reconnect_at = None;
        self.is_reconnecting = false;

        match self.open_session().await {
            Ok(()) => Ok(()),
            Err(e) => {
                if e.class() == ErrorClass::Auth {
                    self.auth_rejected(&e);
                } else {
                    self.enter_closed(CloseCause::StartFailed);
                }
                Err(e)
            }
        }
    }

    async fn send(&mut self, input: RealtimeInput) -> TetherResult<()> {
        if self.config.is_none() {
            return Err(TetherError::NotInitialized);
        }
        if self.state == SessionState::Closed {
            return Err(match self.close_cause {
                Some(CloseCause::ReconnectExhausted) => TetherError::ReconnectExhausted,
                _ => TetherError::SessionClosed,
            });
        }

        self.ensure_healthy().await?;

        match self.write(&input).await {
            Ok(()) => {
                self.touch();
                debug!(kind = input.kind(), "input sent");
                Ok(())
            }
            Err(e) => self.recover_send(input, e).await,
        }
    }

    async fn close_current_session(&mut self) {
        self.refresh_at = None;
        self.reconnect_at = None;
        self.reconnect_attempts = 0;
        self.is_reconnecting = false;

        let closed = self.teardown_handle().await;

        // An already-closed manager keeps the cause that closed it.
        let settled = matches!(self.state, SessionState::Uninitialized | SessionState::Closed);
        if closed || !settled {
            self.enter_closed(CloseCause::Client);
        } else {
            self.publish();
        }

        if closed {
            self.callbacks().on_close(&CloseReason::client());
        }
    }

    async fn shutdown(&mut self) {
        self.close_current_session().await;
        self.resumption_token = None;
        self.publish();
        info!("session manager shut down");
    }

    // ── Handle lifecycle ─────────────────────────────────────────────

    /// Close whatever handle is live and connect a new one carrying the latest token.
    async fn open_session(&mut self) -> TetherResult<()> {
        self.teardown_handle().await;

        let params = self
            .config
            .as_ref()
            .ok_or(TetherError::NotInitialized)?
            .connect_params(self.resumption_token.clone());

        self.generation += 1;
        let generation = self.generation;
        self.set_state(SessionState::Connecting);
        info!(
            generation,
            resumed = params.resumption_token.is_some(),
            "starting new session"
        );

        let sink = EventSink::new(generation, self.events_tx.clone());
        let connector = Arc::clone(&self.connector);
        let handle = match time::timeout(
            self.options.connect_timeout,
            connector.connect(params, sink),
        )
        .await
        {
            Ok(Ok(handle)) => handle,
            Ok(Err(e)) => {
                error!(generation, error = %e, "failed to start new session");
                return Err(e);
            }
            Err(_) => {
                error!(generation, "connect timed out");
                return Err(TetherError::Timeout);
            }
        };

        let now = Instant::now();
        self.handle = Some(handle);
        self.started_at = Some(now);
        self.last_activity_at = Some(now);
        self.reconnect_attempts = 0;
        self.is_reconnecting = false;
        self.handles_opened += 1;
        self.close_cause = None;
        self.refresh_at = Some(deadline_after(now, self.options.refresh_after()));
        self.set_state(SessionState::Open);

        info!(generation, "new session started successfully");
        self.callbacks().on_open();
        Ok(())
    }

    /// Best-effort close of the live handle. Returns whether there was one.
    async fn teardown_handle(&mut self) -> bool {
        let Some(mut handle) = self.handle.take() else {
            return false;
        };
        self.refresh_at = None;

        match time::timeout(self.options.connect_timeout, handle.close()).await {
            Ok(Ok(())) => debug!(generation = self.generation, "session closed successfully"),
            Ok(Err(e)) => warn!(generation = self.generation, error = %e, "error closing session"),
            Err(_) => warn!(generation = self.generation, "timed out closing session"),
        }
        true
    }

    /// Replace a live handle before it expires. Never counts as a reconnect.
    async fn refresh(&mut self, trigger: RefreshTrigger) -> TetherResult<()> {
        if self.is_reconnecting {
            debug!(trigger = trigger.as_str(), "refresh already in progress");
            return Ok(());
        }

        self.is_reconnecting = true;
        self.reconnect_attempts = 0;
        self.set_state(SessionState::Refreshing);
        info!(trigger = trigger.as_str(), "refreshing session");

        let result = self.open_session().await;
        self.is_reconnecting = false;

        if let Err(e) = &result {
            error!(trigger = trigger.as_str(), error = %e, "failed to refresh session");
            self.connect_failed(e);
        }
        result
    }

    /// Connect after a backoff delay (or on demand from a send).
    async fn reconnect(&mut self) -> TetherResult<()> {
        self.reconnect_at = None;
        info!(attempt = self.reconnect_attempts, "reconnecting");

        let result = self.open_session().await;
        if let Err(e) = &result {
            self.connect_failed(e);
        }
        result
    }

    fn connect_failed(&mut self, error: &TetherError) {
        match error.class() {
            ErrorClass::Auth => self.auth_rejected(error),
            _ => self.unexpected_close(&error.to_string()),
        }
    }

    /// Schedule the next reconnect, or give up once the budget is spent.
    fn unexpected_close(&mut self, reason: &str) {
        if self.is_reconnecting {
            debug!(reason, "close during refresh ignored");
            return;
        }

        self.refresh_at = None;

        if self.reconnect_attempts < self.options.max_reconnect_attempts {
            let delay = self.backoff.delay(self.reconnect_attempts);
            self.reconnect_attempts += 1;
            self.reconnect_at = Some(deadline_after(Instant::now(), delay));
            warn!(
                attempt = self.reconnect_attempts,
                delay_ms = millis(delay),
                reason,
                "handling unexpected session close"
            );
            self.set_state(SessionState::Reconnecting);
        } else {
            error!(attempts = self.reconnect_attempts, "max reconnection attempts reached");
            self.reconnect_at = None;
            self.enter_closed(CloseCause::ReconnectExhausted);
            self.callbacks().on_max_reconnect_attempts_reached();
        }
    }

    fn auth_rejected(&mut self, error: &TetherError) {
        error!(error = %error, "credential rejected, not reconnecting");
        self.refresh_at = None;
        self.reconnect_at = None;
        self.enter_closed(CloseCause::AuthRejected);
        self.callbacks().on_auth_error(error);
    }

    fn enter_closed(&mut self, cause: CloseCause) {
        self.close_cause = Some(cause);
        self.started_at = None;
        self.set_state(SessionState::Closed);
    }

    // ── Send path ────────────────────────────────────────────────────

    /// Why the current handle must not take input, if it must not.
    fn staleness(&self) -> Option<&'static str> {
        if self.handle.is_none() {
            return Some("no open session");
        }
        let now = Instant::now();
        let too_old = self
            .started_at
            .map_or(true, |t| now.duration_since(t) >= self.options.refresh_after());
        if too_old {
            return Some("session age limit");
        }
        let idle = self
            .last_activity_at
            .map_or(true, |t| now.duration_since(t) >= self.options.inactivity_timeout);
        if idle {
            return Some("inactivity timeout");
        }
        None
    }

    async fn ensure_healthy(&mut self) -> TetherResult<()> {
        let Some(reason) = self.staleness() else {
            return Ok(());
        };
        info!(reason, "session needs refresh");

        // Before the first handle a failed open is final, like `start`.
        let result = if self.state == SessionState::Uninitialized {
            self.start().await
        } else if self.handle.is_some() {
            self.refresh(RefreshTrigger::Stale).await
        } else {
            self.reconnect().await
        };

        result.map_err(|e| match e {
            TetherError::Auth(_) => e,
            other => TetherError::Send(format!("session unavailable: {other}")),
        })
    }

    /// Write to the live handle, bounded by `send_timeout`.
    async fn write(&mut self, input: &RealtimeInput) -> TetherResult<()> {
        let Some(handle) = self.handle.as_mut() else {
            return Err(TetherError::SessionClosed);
        };
        match time::timeout(self.options.send_timeout, handle.send(input)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(generation = self.generation, kind = input.kind(), "send timed out");
                Err(TetherError::Timeout)
            }
        }
    }

    /// A write failed on a handle that looked healthy: replace it and retry once.
    async fn recover_send(&mut self, input: RealtimeInput, err: TetherError) -> TetherResult<()> {
        error!(kind = input.kind(), error = %err, "error sending");

        if err.is_auth() {
            self.teardown_handle().await;
            self.auth_rejected(&err);
            return Err(TetherError::Send(err.to_string()));
        }

        if let Err(e) = self.refresh(RefreshTrigger::SendFailure).await {
            return Err(TetherError::Send(format!("session unavailable: {e}")));
        }

        match self.write(&input).await {
            Ok(()) => {
                self.touch();
                info!(kind = input.kind(), "input sent after reopening session");
                Ok(())
            }
            Err(retry_err) => {
                error!(kind = input.kind(), error = %retry_err, "retry after reopen failed");
                self.teardown_handle().await;
                self.connect_failed(&retry_err);
                Err(TetherError::Send(retry_err.to_string()))
            }
        }
    }

    fn touch(&mut self) {
        self.last_activity_at = Some(Instant::now());
        self.publish();
    }

    // ── Transport events ─────────────────────────────────────────────

    async fn handle_event(&mut self, tagged: TaggedEvent) {
        if tagged.generation != self.generation || self.handle.is_none() {
            trace!(
                generation = tagged.generation,
                current = self.generation,
                "dropping event from superseded handle"
            );
            return;
        }

        match tagged.event {
            TransportEvent::Message(message) => self.dispatch_message(message).await,

            TransportEvent::Error(error) => {
                error!(error = %error, "connection error");
                let callbacks = self.callbacks();
                callbacks.on_error(&error);
                self.teardown_handle().await;
                callbacks.on_close(&CloseReason::remote(error.to_string()));
                self.connect_failed(&error);
            }

            TransportEvent::Closed { reason } => {
                info!(reason = %reason, "session closed by remote");
                self.handle = None;
                self.refresh_at = None;
                self.callbacks().on_close(&CloseReason::remote(reason.clone()));

                if classify_message(&reason) == ErrorClass::Auth {
                    self.auth_rejected(&TetherError::Auth(reason));
                } else {
                    self.unexpected_close(&reason);
                }
            }
        }
    }

    async fn dispatch_message(&mut self, message: ServerMessage) {
        if let Some(token) = message.resumption_token() {
            self.resumption_token = Some(token.to_string());
            info!("received new session handle");
            self.publish();
        }

        let go_away = message.is_go_away();
        if go_away {
            info!(
                time_left = message.go_away_time_left().unwrap_or("unknown"),
                "received session expiry warning"
            );
        }

        self.callbacks().on_message(&message);

        if go_away {
            let _ = self.refresh(RefreshTrigger::GoAway).await;
        }
    }

    // ── Helpers ──────────────────────────────────────────────────────

    fn callbacks(&self) -> Arc<dyn SessionCallbacks> {
        match &self.config {
            Some(config) => Arc::clone(&config.callbacks),
            None => Arc::new(NoopCallbacks),
        }
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            debug!(from = ?self.state, to = ?state, "state transition");
        }
        self.state = state;
        self.publish();
    }

    fn publish(&self) {
        self.status_tx.send_replace(SessionStatus {
            state: self.state,
            close_cause: self.close_cause,
            reconnect_attempts: self.reconnect_attempts,
            is_reconnecting: self.is_reconnecting,
            has_resumption_token: self.resumption_token.is_some(),
            started_at: self.started_at,
            last_activity_at: self.last_activity_at,
            handles_opened: self.handles_opened,
        });
    }
}

/// `now + delay`, saturating at roughly thirty years out.
fn deadline_after(now: Instant, delay: Duration) -> Instant {
    now.checked_add(delay)
        .unwrap_or_else(|| now + Duration::from_secs(86400 * 365 * 30))
}

/// Whole milliseconds for log fields, saturating at `u64::MAX`.
fn millis(delay: Duration) -> u64 {
    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
