use thiserror::Error;

/// Errors produced by the tether session layer.
#[derive(Debug, Error)]
pub enum TetherError {
    #[error("session manager not initialized")]
    NotInitialized,

    #[error("session is closed; call start() to reconnect")]
    SessionClosed,

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("send failed: {0}")]
    Send(String),

    #[error("maximum reconnect attempts reached")]
    ReconnectExhausted,

    #[error("codec error: {0}")]
    Codec(String),

    #[error("timeout")]
    Timeout,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for TetherError {
    fn from(e: serde_json::Error) -> Self {
        TetherError::Codec(e.to_string())
    }
}

pub type TetherResult<T> = Result<T, TetherError>;

/// How the session manager reacts to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Caller misuse (not initialized, closed). Surfaced, never retried.
    Configuration,
    /// Rejected credential. Surfaced via the auth callback, never retried.
    Auth,
    /// Anything else. Absorbed into the reconnect loop.
    Transient,
}

/// Substrings (lowercase) that mark a transport message as a credential problem.
const AUTH_MARKERS: &[&str] = &[
    "api key",
    "unauthorized",
    "unauthenticated",
    "permission denied",
];

/// Classify a free-form transport error or close reason.
pub fn classify_message(message: &str) -> ErrorClass {
    let lower = message.to_lowercase();
    if AUTH_MARKERS.iter().any(|m| lower.contains(m)) {
        ErrorClass::Auth
    } else {
        ErrorClass::Transient
    }
}

impl TetherError {
    /// Classify this error for the reconnect policy.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NotInitialized | Self::SessionClosed | Self::ReconnectExhausted => {
                ErrorClass::Configuration
            }
            Self::Auth(_) => ErrorClass::Auth,
            Self::Transport(msg) | Self::Send(msg) | Self::Other(msg) => classify_message(msg),
            Self::Codec(_) | Self::Timeout | Self::Io(_) => ErrorClass::Transient,
        }
    }

    pub fn is_auth(&self) -> bool {
        self.class() == ErrorClass::Auth
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_auth_messages() {
        assert_eq!(classify_message("API key not valid. Please pass a valid API key."), ErrorClass::Auth);
        assert_eq!(classify_message("401 Unauthorized"), ErrorClass::Auth);
        assert_eq!(classify_message("PERMISSION DENIED for model"), ErrorClass::Auth);
    }

    #[test]
    fn classify_transient_messages() {
        assert_eq!(classify_message("connection reset by peer"), ErrorClass::Transient);
        assert_eq!(classify_message(""), ErrorClass::Transient);
    }

    #[test]
    fn error_classes() {
        assert_eq!(TetherError::NotInitialized.class(), ErrorClass::Configuration);
        assert_eq!(TetherError::Auth("bad".into()).class(), ErrorClass::Auth);
        assert_eq!(TetherError::Timeout.class(), ErrorClass::Transient);
        assert!(TetherError::Transport("unauthorized".into()).is_auth());
        assert!(!TetherError::Send("broken pipe".into()).is_auth());
    }
}
