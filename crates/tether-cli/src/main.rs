//! tether: realtime assistant session from the terminal.
//!
//! Keeps one streaming session with the Gemini Live API open across the
//! service's connection limits. `chat` is interactive; `send` asks one
//! question and prints the answer.

mod commands;
mod config;
mod credential;
mod profiles;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::error;

use commands::Settings;
use config::Config;
use profiles::Profile;

/// tether: realtime assistant session
#[derive(Parser)]
#[command(name = "tether", version, about = "Realtime assistant session that survives connection limits")]
struct Cli {
    /// API key (defaults to $TETHER_API_KEY, then $GEMINI_API_KEY)
    #[arg(long = "api-key", global = true)]
    api_key: Option<String>,

    /// Assistant profile
    #[arg(short, long, global = true, value_enum)]
    profile: Option<Profile>,

    /// Extra context appended to the profile's instruction
    #[arg(long, global = true)]
    prompt: Option<String>,

    /// Speech language (BCP-47)
    #[arg(short, long, global = true)]
    language: Option<String>,

    /// Model identifier
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Service endpoint
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Config file path
    #[arg(long = "config", global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive session: one message per line
    Chat,

    /// Send one message and print the response
    Send {
        /// Message text
        #[arg(required = true, trailing_var_arg = true)]
        text: Vec<String>,

        /// Seconds to wait for the response
        #[arg(long, default_value_t = 60)]
        timeout: u64,

        /// Print every server message as raw JSON
        #[arg(long)]
        raw: bool,
    },
}

/// Merge flags, environment and config file. Flags win.
fn settings(cli: &Cli, cfg: &Config) -> Result<Settings> {
    let credential = credential::resolve(cli.api_key.as_deref(), |name| std::env::var(name).ok())?;

    let profile = cli.profile.unwrap_or(cfg.session.profile);
    let prompt = cli.prompt.as_deref().unwrap_or(&cfg.session.prompt);

    Ok(Settings {
        credential,
        system_instruction: profiles::system_prompt(profile, prompt),
        language: cli
            .language
            .clone()
            .unwrap_or_else(|| cfg.session.language.clone()),
        model: cli.model.clone().unwrap_or_else(|| cfg.session.model.clone()),
        endpoint: cli
            .endpoint
            .clone()
            .unwrap_or_else(|| cfg.session.endpoint.clone()),
        options: cfg.lifecycle.to_options(),
    })
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing. Responses go to stdout, so logs go to stderr.
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("tether=debug,tether_cli=debug,tether_client=debug,tether_core=debug")
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter("tether=warn,tether_cli=warn")
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    let result = run(&cli).await;

    if let Err(e) = result {
        error!("{:#}", e);
        eprintln!("tether: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: &Cli) -> Result<()> {
    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let cfg = Config::load(&config_path)?;
    let settings = settings(cli, &cfg)?;

    match &cli.command {
        Command::Chat => commands::chat::run(&settings).await,
        Command::Send { text, timeout, raw } => {
            commands::send::run(
                &settings,
                &text.join(" "),
                Duration::from_secs(*timeout),
                *raw,
            )
            .await
        }
    }
}
