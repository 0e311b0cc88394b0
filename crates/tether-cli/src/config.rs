//! Client configuration at `~/.tether/config.toml`.
//!
//! `[session]` holds model, language and profile defaults; `[lifecycle]`
//! tunes refresh and reconnect timing. CLI flags always override file values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use tether_client::transport::DEFAULT_ENDPOINT;
use tether_client::LifecycleOptions;
use tether_core::DEFAULT_MODEL;

use crate::profiles::Profile;

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub session: SessionSection,

    #[serde(default)]
    pub lifecycle: LifecycleSection,
}

/// Session defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSection {
    #[serde(default = "default_model")]
    pub model: String,

    /// BCP-47 language code for speech input.
    #[serde(default = "default_language")]
    pub language: String,

    #[serde(default)]
    pub profile: Profile,

    /// Extra context appended to the profile's instruction.
    #[serde(default)]
    pub prompt: String,

    /// WebSocket endpoint of the realtime service.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            model: default_model(),
            language: default_language(),
            profile: Profile::default(),
            prompt: String::new(),
            endpoint: default_endpoint(),
        }
    }
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_language() -> String {
    "en-US".to_string()
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

/// Refresh and reconnect timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleSection {
    #[serde(default = "default_session_lifetime_secs")]
    pub session_lifetime_secs: u64,

    #[serde(default = "default_refresh_margin_secs")]
    pub refresh_margin_secs: u64,

    #[serde(default = "default_inactivity_timeout_secs")]
    pub inactivity_timeout_secs: u64,

    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    #[serde(default = "default_base_reconnect_delay_ms")]
    pub base_reconnect_delay_ms: u64,

    /// Upper bound on one backoff delay (unbounded if absent).
    #[serde(default)]
    pub max_reconnect_delay_ms: Option<u64>,

    /// Fraction of each backoff delay to randomize, 0.0 to 1.0.
    #[serde(default)]
    pub reconnect_jitter: f64,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Bound on one outbound write before the handle is replaced.
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,
}

impl Default for LifecycleSection {
    fn default() -> Self {
        Self {
            session_lifetime_secs: default_session_lifetime_secs(),
            refresh_margin_secs: default_refresh_margin_secs(),
            inactivity_timeout_secs: default_inactivity_timeout_secs(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            base_reconnect_delay_ms: default_base_reconnect_delay_ms(),
            max_reconnect_delay_ms: None,
            reconnect_jitter: 0.0,
            connect_timeout_secs: default_connect_timeout_secs(),
            send_timeout_secs: default_send_timeout_secs(),
        }
    }
}

fn default_session_lifetime_secs() -> u64 {
    LifecycleOptions::default().session_lifetime.as_secs()
}

fn default_refresh_margin_secs() -> u64 {
    LifecycleOptions::default().refresh_margin.as_secs()
}

fn default_inactivity_timeout_secs() -> u64 {
    LifecycleOptions::default().inactivity_timeout.as_secs()
}

fn default_max_reconnect_attempts() -> u32 {
    LifecycleOptions::default().max_reconnect_attempts
}

fn default_base_reconnect_delay_ms() -> u64 {
    u64::try_from(LifecycleOptions::default().base_reconnect_delay.as_millis()).unwrap_or(u64::MAX)
}

fn default_connect_timeout_secs() -> u64 {
    LifecycleOptions::default().connect_timeout.as_secs()
}

fn default_send_timeout_secs() -> u64 {
    LifecycleOptions::default().send_timeout.as_secs()
}

impl LifecycleSection {
    pub fn to_options(&self) -> LifecycleOptions {
        LifecycleOptions {
            session_lifetime: Duration::from_secs(self.session_lifetime_secs),
            refresh_margin: Duration::from_secs(self.refresh_margin_secs),
            inactivity_timeout: Duration::from_secs(self.inactivity_timeout_secs),
            max_reconnect_attempts: self.max_reconnect_attempts,
            base_reconnect_delay: Duration::from_millis(self.base_reconnect_delay_ms),
            max_reconnect_delay: self.max_reconnect_delay_ms.map(Duration::from_millis),
            reconnect_jitter: self.reconnect_jitter,
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            send_timeout: Duration::from_secs(self.send_timeout_secs),
        }
    }
}

impl Config {
    /// `~/.tether/config.toml`.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_default()
            .join(".tether")
            .join("config.toml")
    }

    /// Load configuration from a TOML file, returning defaults if the file
    /// does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config at {}", path.display()))?;

        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_values() {
        let cfg = Config::default();
        assert_eq!(cfg.session.model, DEFAULT_MODEL);
        assert_eq!(cfg.session.language, "en-US");
        assert_eq!(cfg.session.profile, Profile::Interview);
        assert!(cfg.session.prompt.is_empty());
        assert_eq!(cfg.lifecycle.to_options(), LifecycleOptions::default());
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[session]
language = "de-DE"
profile = "meeting"
prompt = "Weekly sync with the platform team."

[lifecycle]
session_lifetime_secs = 600
refresh_margin_secs = 30
max_reconnect_attempts = 3
base_reconnect_delay_ms = 500
max_reconnect_delay_ms = 4000
reconnect_jitter = 0.2
send_timeout_secs = 5
"#;
        let cfg: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.session.language, "de-DE");
        assert_eq!(cfg.session.profile, Profile::Meeting);
        assert_eq!(cfg.session.model, DEFAULT_MODEL); // default

        let options = cfg.lifecycle.to_options();
        assert_eq!(options.session_lifetime, Duration::from_secs(600));
        assert_eq!(options.refresh_after(), Duration::from_secs(570));
        assert_eq!(options.max_reconnect_attempts, 3);
        assert_eq!(options.base_reconnect_delay, Duration::from_millis(500));
        assert_eq!(options.max_reconnect_delay, Some(Duration::from_secs(4)));
        assert_eq!(options.send_timeout, Duration::from_secs(5));
        assert_eq!(options.inactivity_timeout, Duration::from_secs(60)); // default
    }

    #[test]
    fn load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.session.endpoint, DEFAULT_ENDPOINT);
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[session]\nmodel = \"gemini-live-preview\"").unwrap();

        let cfg = Config::load(file.path()).unwrap();
        assert_eq!(cfg.session.model, "gemini-live-preview");
        assert_eq!(cfg.lifecycle.max_reconnect_attempts, 5);
    }

    #[test]
    fn load_rejects_bad_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[session\nmodel = ").unwrap();

        let err = Config::load(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("failed to parse config"));
    }
}
