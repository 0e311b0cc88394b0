//! Observable session state.

use tokio::time::Instant;

/// Lifecycle state of the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No handle has been opened yet.
    #[default]
    Uninitialized,
    /// A connect is in flight.
    Connecting,
    /// A handle is open and accepting input.
    Open,
    /// The open handle is being replaced before it expires.
    Refreshing,
    /// Waiting out a backoff delay before the next connect.
    Reconnecting,
    /// No handle and no retry scheduled. Left only through `start`.
    Closed,
}

/// What put the manager into [`SessionState::Closed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCause {
    Client,
    ReconnectExhausted,
    AuthRejected,
    StartFailed,
}

/// Snapshot published on every state change.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionStatus {
    /// Current lifecycle state.
    pub state: SessionState,
    /// Set while `state` is `Closed`; cleared by the next successful open.
    pub close_cause: Option<CloseCause>,
    /// Backoff reconnects since the last successful open.
    pub reconnect_attempts: u32,
    /// A refresh is replacing the handle; closes seen meanwhile are ignored.
    pub is_reconnecting: bool,
    /// Whether the next connect will resume the previous session.
    pub has_resumption_token: bool,
    /// When the current handle was opened.
    pub started_at: Option<Instant>,
    /// Last successful outbound send (or the open, if nothing was sent yet).
    pub last_activity_at: Option<Instant>,
    /// Total handles opened over the manager's lifetime.
    pub handles_opened: u64,
}

impl SessionStatus {
    pub fn is_open(&self) -> bool {
        self.state == SessionState::Open
    }
}
