//! Assistant Stream CLI - chat with an assistant server from the terminal.
//!
//! This is the main binary entry point. See the `assistant_stream` library
//! for the core functionality.

use anyhow::{Context, Result};
use assistant_stream::{
    pump, Config, ConnectionSupervisor, NetworkTransport, SessionId, StdinSource,
    TerminalRenderer,
};
use mimalloc::MiMalloc;

/// Global allocator configured per M-MIMALLOC-APPS guideline.
/// mimalloc provides better multi-threaded performance than the system allocator.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;
use clap::{Parser, Subcommand};
use std::sync::Arc;

/// Version of this binary.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build the supervisor for `config`, optionally resuming `session`.
fn start_supervisor(
    config: Config,
    session: Option<String>,
) -> Result<assistant_stream::SupervisorHandle> {
    let transport = NetworkTransport::new(&config.server_url)?;
    let mut supervisor = ConnectionSupervisor::new(
        config,
        Arc::new(transport),
        Box::new(TerminalRenderer::new()),
    );
    if let Some(id) = session {
        supervisor = supervisor.with_session_id(SessionId::from(id));
    }
    Ok(supervisor.spawn())
}

/// Interactive chat: one message per stdin line until EOF or Ctrl-C.
async fn run_chat(config: Config, session: Option<String>) -> Result<()> {
    println!(
        "Assistant Stream v{} connected to {}",
        VERSION, config.server_url
    );
    let handle = start_supervisor(config, session)?;
    println!("Session {} (Ctrl-D to quit)", handle.session_id());
    log::info!("Chat started for session {}", handle.session_id());

    let mut source = StdinSource::new();
    tokio::select! {
        sent = pump(&mut source, &handle) => {
            log::info!("Input closed after {} message(s)", sent);
        }
        _ = tokio::signal::ctrl_c() => {
            println!();
            log::info!("Interrupted");
        }
    }

    handle.shutdown().await;
    Ok(())
}

/// Send one message, wait for the response to end, and exit.
async fn run_send(config: Config, session: Option<String>, message: &str) -> Result<()> {
    if message.trim().is_empty() {
        anyhow::bail!("Message is empty");
    }

    let handle = start_supervisor(config, session)?;
    let settled = handle.status().settled;
    if !handle.send(message) {
        anyhow::bail!("Supervisor stopped before the message was sent");
    }
    handle
        .wait_for(|s| s.settled > settled)
        .await
        .context("Supervisor stopped before the response ended")?;

    handle.shutdown().await;
    Ok(())
}

// CLI
#[derive(Parser)]
#[command(name = "assistant-stream")]
#[command(version = VERSION)]
#[command(about = "Streaming assistant chat client with reconnect and HTTP fallback")]
struct Cli {
    /// Override the server URL for this run
    #[arg(long, global = true)]
    server_url: Option<String>,

    /// Reuse an existing session id instead of generating one
    #[arg(long, global = true)]
    session: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive chat reading messages from stdin
    Chat,
    /// Send a single message and print the response
    Send {
        /// Message text
        message: String,
    },
    /// Show or change configuration
    Config {
        /// Key to show or set
        key: Option<String>,
        /// New value for the key
        value: Option<String>,
    },
}

fn main() -> Result<()> {
    // Log to a file when asked so streamed output stays readable
    let mut logger =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if let Ok(path) = std::env::var("ASSISTANT_STREAM_LOG_FILE") {
        let log_file = std::fs::File::create(&path)
            .with_context(|| format!("Failed to create log file at {path}"))?;
        logger
            .target(env_logger::Target::Pipe(Box::new(log_file)))
            .filter_level(log::LevelFilter::Info);
    } else {
        logger.target(env_logger::Target::Stderr);
    }
    logger.format_timestamp_secs().init();

    let cli = Cli::parse();

    let mut config = Config::load()?;

    match cli.command {
        Commands::Chat => {
            if let Some(url) = cli.server_url {
                config.server_url = url;
            }
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(run_chat(config, cli.session))?;
        }
        Commands::Send { message } => {
            if let Some(url) = cli.server_url {
                config.server_url = url;
            }
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(run_send(config, cli.session, &message))?;
        }
        Commands::Config { key, value } => match (key, value) {
            (None, _) => println!("{}", serde_json::to_string_pretty(&config)?),
            (Some(k), None) => {
                let json = serde_json::to_value(&config)?;
                match json.get(&k) {
                    Some(v) => println!("{}", v),
                    None => anyhow::bail!("Unknown config key '{k}'"),
                }
            }
            (Some(k), Some(v)) => {
                config.set(&k, &v)?;
                config.save()?;
                println!("Set {} = {}", k, v);
            }
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_send_with_global_flags() {
        let cli = Cli::try_parse_from([
            "assistant-stream",
            "send",
            "hello there",
            "--server-url",
            "http://example.com",
        ])
        .expect("parses");
        assert_eq!(cli.server_url.as_deref(), Some("http://example.com"));
        assert!(matches!(cli.command, Commands::Send { ref message } if message == "hello there"));
    }
}
