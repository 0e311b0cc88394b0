//! Session configuration and lifecycle timing options.

use std::sync::Arc;
use std::time::Duration;

use tether_core::{ConnectParams, DEFAULT_MODEL, DEFAULT_RESPONSE_MODALITY};

use crate::backoff::Backoff;
use crate::callbacks::SessionCallbacks;

/// Caller-supplied configuration, replaced wholesale by `initialize`.
#[derive(Clone)]
pub struct SessionConfig {
    /// API credential for the realtime service.
    pub credential: String,
    /// Instruction sent in every setup frame, unchanged across handles.
    pub system_instruction: String,
    /// BCP-47 language code for speech input.
    pub language_code: String,
    /// Model identifier, without the `models/` prefix.
    pub model: String,
    /// Response modality requested in setup (`TEXT` by default).
    pub response_modality: String,
    /// Lifecycle callbacks.
    pub callbacks: Arc<dyn SessionCallbacks>,
}

impl SessionConfig {
    pub fn new(
        credential: impl Into<String>,
        system_instruction: impl Into<String>,
        language_code: impl Into<String>,
        callbacks: impl SessionCallbacks + 'static,
    ) -> Self {
        Self {
            credential: credential.into(),
            system_instruction: system_instruction.into(),
            language_code: language_code.into(),
            model: DEFAULT_MODEL.to_string(),
            response_modality: DEFAULT_RESPONSE_MODALITY.to_string(),
            callbacks: Arc::new(callbacks),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_response_modality(mut self, modality: impl Into<String>) -> Self {
        self.response_modality = modality.into();
        self
    }

    pub(crate) fn connect_params(&self, resumption_token: Option<String>) -> ConnectParams {
        ConnectParams {
            model: self.model.clone(),
            credential: self.credential.clone(),
            system_instruction: self.system_instruction.clone(),
            language_code: self.language_code.clone(),
            response_modality: self.response_modality.clone(),
            resumption_token,
        }
    }
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("credential", &"<redacted>")
            .field("language_code", &self.language_code)
            .field("model", &self.model)
            .field("response_modality", &self.response_modality)
            .finish_non_exhaustive()
    }
}

/// Timing constants of the lifecycle state machine.
#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleOptions {
    /// Hard cap the service puts on one connection.
    pub session_lifetime: Duration,
    /// How long before the cap the handle is replaced.
    pub refresh_margin: Duration,
    /// Idle time after which the next send reopens the session.
    pub inactivity_timeout: Duration,
    /// Backoff reconnects allowed after an unexpected close before giving up.
    pub max_reconnect_attempts: u32,
    /// First backoff delay; each later attempt doubles it.
    pub base_reconnect_delay: Duration,
    /// Optional cap on a single backoff delay.
    pub max_reconnect_delay: Option<Duration>,
    /// Fractional backoff jitter, `0.0` disables it.
    pub reconnect_jitter: f64,
    /// Bound on a single connect (including the setup handshake).
    pub connect_timeout: Duration,
    /// Bound on a single write. Expiry counts as a failed send.
    pub send_timeout: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            session_lifetime: Duration::from_secs(15 * 60),
            refresh_margin: Duration::from_secs(60),
            inactivity_timeout: Duration::from_secs(60),
            max_reconnect_attempts: 5,
            base_reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: None,
            reconnect_jitter: 0.0,
            connect_timeout: Duration::from_secs(10),
            send_timeout: Duration::from_secs(10),
        }
    }
}

impl LifecycleOptions {
    /// Age at which a handle is refreshed and considered stale for sends.
    pub fn refresh_after(&self) -> Duration {
        self.session_lifetime.saturating_sub(self.refresh_margin)
    }

    /// Backoff schedule built from the reconnect fields.
    pub fn backoff(&self) -> Backoff {
        Backoff::new(self.base_reconnect_delay)
            .with_max(self.max_reconnect_delay)
            .with_jitter(self.reconnect_jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::NoopCallbacks;

    #[test]
    fn default_refresh_is_fourteen_minutes() {
        let opts = LifecycleOptions::default();
        assert_eq!(opts.refresh_after(), Duration::from_secs(14 * 60));
        assert_eq!(opts.backoff().delay(4), Duration::from_secs(16));
        assert_eq!(opts.send_timeout, Duration::from_secs(10));
    }

    #[test]
    fn margin_larger_than_lifetime_saturates() {
        let opts = LifecycleOptions {
            session_lifetime: Duration::from_secs(10),
            refresh_margin: Duration::from_secs(30),
            ..Default::default()
        };
        assert_eq!(opts.refresh_after(), Duration::ZERO);
    }

    #[test]
    fn config_builds_connect_params() {
        let config = SessionConfig::new("AIzaKey", "be helpful", "de-DE", NoopCallbacks)
            .with_model("custom-model");
        let params = config.connect_params(Some("tok".into()));
        assert_eq!(params.model, "custom-model");
        assert_eq!(params.language_code, "de-DE");
        assert_eq!(params.response_modality, "TEXT");
        assert_eq!(params.resumption_token.as_deref(), Some("tok"));
        assert!(!format!("{config:?}").contains("AIzaKey"));
    }
}
