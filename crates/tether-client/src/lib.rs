//! tether-client: realtime session lifecycle manager.
//!
//! Keeps one logical streaming session with a realtime inference service
//! alive across many transport connections: refreshes the connection before
//! the service's lifetime cap, reopens it when a send finds it idle or stale,
//! carries the resumption token across connections, and reconnects with
//! exponential backoff after unexpected closes.
//!
//! # Quick Start
//!
//! ```no_run
//! use tether_client::{LifecycleOptions, SessionConfig, SessionEvent, SessionManager, WebSocketConnector};
//!
//! # async fn example() -> tether_core::TetherResult<()> {
//! let (events_tx, mut events) = tokio::sync::mpsc::unbounded_channel::<SessionEvent>();
//!
//! let manager = SessionManager::new(WebSocketConnector::default(), LifecycleOptions::default());
//! manager
//!     .initialize(SessionConfig::new("AIza...", "You are a helpful assistant.", "en-US", events_tx))
//!     .await?;
//! manager.start().await?;
//! manager.send_text("What should be the next step here?").await?;
//!
//! while let Some(event) = events.recv().await {
//!     if let SessionEvent::Message(message) = event {
//!         print!("{}", message.text_parts().concat());
//!         if message.turn_complete() {
//!             break;
//!         }
//!     }
//! }
//!
//! manager.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod callbacks;
pub mod config;
pub mod manager;
pub mod state;
pub mod transport;

// Re-export primary public types.
pub use backoff::Backoff;
pub use callbacks::{CloseReason, NoopCallbacks, SessionCallbacks, SessionEvent};
pub use config::{LifecycleOptions, SessionConfig};
pub use manager::SessionManager;
pub use state::{CloseCause, SessionState, SessionStatus};
pub use transport::{Connector, EventSink, TransportEvent, TransportHandle, WebSocketConnector};

#[cfg(any(test, feature = "test-util"))]
pub use transport::{MockConnector, MockController};

// Re-export tether-core types for convenience.
pub use tether_core::{RealtimeInput, ServerMessage, TetherError, TetherResult};
