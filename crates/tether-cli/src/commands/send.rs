//! `tether send <text>`: one question, one answer.
//!
//! Opens a session, sends the text, prints the response of that turn and
//! shuts the session down.

use std::io::Write;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use tokio::sync::mpsc;
use tracing::debug;

use tether_client::SessionEvent;

use super::{open_session, ResponseBuffer, Settings};

pub async fn run(settings: &Settings, text: &str, timeout: Duration, raw: bool) -> Result<()> {
    let text = text.trim();
    if text.is_empty() {
        bail!("refusing to send an empty message");
    }

    let (manager, mut events) = open_session(settings).await?;

    let result = async {
        manager
            .send_text(text)
            .await
            .context("failed to send message")?;
        tokio::time::timeout(timeout, read_turn(&mut events, raw))
            .await
            .map_err(|_| anyhow!("no complete response within {}s", timeout.as_secs()))?
    }
    .await;

    manager.shutdown().await;
    result
}

/// Print events until the model's turn completes.
async fn read_turn(events: &mut mpsc::UnboundedReceiver<SessionEvent>, raw: bool) -> Result<()> {
    let mut buffer = ResponseBuffer::default();
    let mut stdout = std::io::stdout();

    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::Message(message) => {
                if raw {
                    writeln!(stdout, "{}", serde_json::to_string(message.raw())?)?;
                } else if let Some(text) = buffer.push(&message) {
                    writeln!(stdout, "{text}")?;
                }
                stdout.flush()?;
                if message.turn_complete() {
                    return Ok(());
                }
            }
            SessionEvent::AuthError(e) => bail!("credential rejected: {e}"),
            SessionEvent::MaxReconnectAttemptsReached => {
                bail!("connection lost and could not be re-established")
            }
            other => debug!(event = ?other, "session event"),
        }
    }

    bail!("session ended before the response completed")
}
