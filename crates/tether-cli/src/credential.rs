//! API credential lookup and validation.

use anyhow::{bail, Result};

/// Environment variables consulted, in order, when `--api-key` is absent.
pub const ENV_VARS: [&str; 2] = ["TETHER_API_KEY", "GEMINI_API_KEY"];

/// Resolve the credential from the flag or the environment and validate it.
pub fn resolve(flag: Option<&str>, env: impl Fn(&str) -> Option<String>) -> Result<String> {
    let raw = match flag {
        Some(key) => key.to_string(),
        None => match ENV_VARS.iter().find_map(|name| env(name)) {
            Some(key) => key,
            None => bail!(
                "no API key: pass --api-key or set {}",
                ENV_VARS.join(" / ")
            ),
        },
    };
    validate(&raw)
}

/// Trim and check the key format. Gemini keys start with `AIza`.
pub fn validate(raw: &str) -> Result<String> {
    let key = raw.trim();
    if key.is_empty() {
        bail!("API key is empty");
    }
    if !key.starts_with("AIza") {
        bail!(
            "API key should start with \"AIza\"; use a Gemini API key from \
             https://aistudio.google.com/apikey"
        );
    }
    Ok(key.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn flag_wins_over_env() {
        let key = resolve(Some("AIza-flag"), |_| Some("AIza-env".into())).unwrap();
        assert_eq!(key, "AIza-flag");
    }

    #[test]
    fn env_order() {
        let key = resolve(None, |name| match name {
            "GEMINI_API_KEY" => Some("AIza-gemini".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(key, "AIza-gemini");

        let key = resolve(None, |_| Some("AIza-any".into())).unwrap();
        assert_eq!(key, "AIza-any");
    }

    #[test]
    fn missing_key() {
        let err = resolve(None, no_env).unwrap_err();
        assert!(err.to_string().contains("--api-key"));
    }

    #[test]
    fn key_is_trimmed() {
        assert_eq!(validate("  AIzaSyTest\n").unwrap(), "AIzaSyTest");
    }

    #[test]
    fn rejects_bad_keys() {
        assert!(validate("   ").is_err());
        assert!(validate("sk-not-a-gemini-key").is_err());
    }
}
