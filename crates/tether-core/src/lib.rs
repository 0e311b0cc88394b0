//! tether-core: shared types for the tether realtime session stack.
//!
//! Provides the error taxonomy and classification used by the session
//! manager, the outbound/inbound message shapes, and the JSON frame codec.

pub mod codec;
pub mod error;
pub mod messages;

// Re-export commonly used items at crate root.
pub use codec::{decode_message, encode_frame, encode_input};
pub use error::{classify_message, ErrorClass, TetherError, TetherResult};
pub use messages::{
    Blob, ClientFrame, ConnectParams, RealtimeInput, ServerMessage, SetupFrame, DEFAULT_MODEL,
    DEFAULT_RESPONSE_MODALITY,
};
