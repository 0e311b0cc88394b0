//! `tether chat`: interactive session.
//!
//! Each stdin line is sent as text. Responses are printed as they complete;
//! lifecycle changes appear as status lines on stderr. The session survives
//! refreshes and reconnects underneath the prompt.

use std::path::Path;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

use tether_client::{SessionEvent, SessionManager};

use super::{open_session, ResponseBuffer, Settings};

/// Smallest image accepted by `/image`; anything shorter is not a real frame.
pub const MIN_IMAGE_BYTES: usize = 1000;

const IMAGE_MIME: &str = "image/jpeg";
const AUDIO_MIME: &str = "audio/pcm;rate=24000";

/// One line of user input.
#[derive(Debug, PartialEq, Eq)]
pub enum Input<'a> {
    Empty,
    Quit,
    Text(&'a str),
    Image(&'a str),
    Audio(&'a str),
    Unknown(&'a str),
}

impl<'a> Input<'a> {
    pub fn parse(line: &'a str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }
        let Some(command) = line.strip_prefix('/') else {
            return Self::Text(line);
        };

        let (name, arg) = command
            .split_once(char::is_whitespace)
            .map(|(n, a)| (n, a.trim()))
            .unwrap_or((command, ""));
        match (name, arg) {
            ("quit" | "exit", _) => Self::Quit,
            ("image", path) if !path.is_empty() => Self::Image(path),
            ("audio", path) if !path.is_empty() => Self::Audio(path),
            _ => Self::Unknown(line),
        }
    }
}

pub async fn run(settings: &Settings) -> Result<()> {
    let (manager, mut events) = open_session(settings).await?;
    eprintln!("Type a message, /image <path>, /audio <path>, or /quit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut buffer = ResponseBuffer::default();

    let result = loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line.context("failed to read stdin") {
                    Ok(Some(line)) => line,
                    Ok(None) => break Ok(()),
                    Err(e) => break Err(e),
                };
                match Input::parse(&line) {
                    Input::Empty => {}
                    Input::Quit => break Ok(()),
                    Input::Text(text) => report(manager.send_text(text).await),
                    Input::Image(path) => {
                        if let Err(e) = send_image(&manager, Path::new(path)).await {
                            eprintln!("tether: {e:#}");
                        }
                    }
                    Input::Audio(path) => {
                        if let Err(e) = send_audio(&manager, Path::new(path)).await {
                            eprintln!("tether: {e:#}");
                        }
                    }
                    Input::Unknown(command) => eprintln!("tether: unknown command '{command}'"),
                }
            }

            event = events.recv() => {
                let Some(event) = event else {
                    break Ok(());
                };
                if let Err(e) = show_event(event, &mut buffer) {
                    break Err(e);
                }
            }
        }
    };

    manager.shutdown().await;
    result
}

fn report(result: tether_core::TetherResult<()>) {
    if let Err(e) = result {
        warn!(error = %e, "send failed");
        eprintln!("tether: {e}");
    }
}

/// Print one lifecycle event. Fatal events end the chat.
fn show_event(event: SessionEvent, buffer: &mut ResponseBuffer) -> Result<()> {
    match event {
        SessionEvent::Open => eprintln!("· connected"),
        SessionEvent::Message(message) => {
            if let Some(text) = buffer.push(&message) {
                println!("{text}");
            }
            if message.turn_complete() {
                eprintln!("· listening...");
            }
        }
        SessionEvent::Error(e) => eprintln!("· error: {e}"),
        SessionEvent::Closed(reason) if reason.initiated_by_client => {
            debug!("session closed by client");
        }
        SessionEvent::Closed(reason) => eprintln!("· connection lost: {}", reason.reason),
        SessionEvent::AuthError(e) => bail!("credential rejected: {e}"),
        SessionEvent::MaxReconnectAttemptsReached => {
            bail!("connection lost and could not be re-established")
        }
    }
    Ok(())
}

/// Reject images too small to be a real capture.
pub fn check_image(bytes: &[u8]) -> Result<()> {
    if bytes.len() < MIN_IMAGE_BYTES {
        bail!("image too small: {} bytes", bytes.len());
    }
    Ok(())
}

async fn send_image(manager: &SessionManager, path: &Path) -> Result<()> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    check_image(&bytes)?;
    manager.send_media(&bytes, IMAGE_MIME).await?;
    eprintln!("· sent {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}

async fn send_audio(manager: &SessionManager, path: &Path) -> Result<()> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    if bytes.is_empty() {
        bail!("audio file {} is empty", path.display());
    }
    manager.send_audio(&bytes, AUDIO_MIME).await?;
    eprintln!("· sent {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_inputs() {
        assert_eq!(Input::parse("   "), Input::Empty);
        assert_eq!(Input::parse(" What next? "), Input::Text("What next?"));
        assert_eq!(Input::parse("/quit"), Input::Quit);
        assert_eq!(Input::parse("/exit"), Input::Quit);
        assert_eq!(Input::parse("/image  shot.jpg "), Input::Image("shot.jpg"));
        assert_eq!(Input::parse("/audio clip.pcm"), Input::Audio("clip.pcm"));
        assert_eq!(Input::parse("/image"), Input::Unknown("/image"));
        assert_eq!(Input::parse("/help"), Input::Unknown("/help"));
    }

    #[test]
    fn small_images_rejected() {
        assert!(check_image(&[0u8; 999]).is_err());
        assert!(check_image(&[0u8; MIN_IMAGE_BYTES]).is_ok());
    }

    #[test]
    fn fatal_events_end_chat() {
        let mut buffer = ResponseBuffer::default();
        assert!(show_event(SessionEvent::Open, &mut buffer).is_ok());
        assert!(show_event(SessionEvent::AuthError("bad key".into()), &mut buffer).is_err());
        assert!(show_event(SessionEvent::MaxReconnectAttemptsReached, &mut buffer).is_err());
    }
}
