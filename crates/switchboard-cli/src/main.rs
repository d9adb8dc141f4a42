//! Switchboard CLI — entry point.
//!
//! # Commands
//!
//! - `switchboard chat [-m MESSAGE] [--model ALIAS]` — chat (single-shot or REPL)
//! - `switchboard status` — show configuration and provider status
//! - `switchboard probe` — run one health sweep
//! - `switchboard pending` / `switchboard retry` — inspect and replay queued requests
//! - `switchboard transcribe FILE` — speech to text
//! - `switchboard serve` — health monitor plus periodic replay until Ctrl+C
//! - `switchboard init` — write a default config

mod helpers;
mod init;
mod pending_cmd;
mod repl;
mod serve;
mod status;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use switchboard_core::config::load_config;
use switchboard_core::types::Message;
use switchboard_providers::{ChatOptions, Router};

// ─────────────────────────────────────────────
// CLI definition
// ─────────────────────────────────────────────

/// Switchboard — multi-provider LLM router with failover
#[derive(Parser)]
#[command(name = "switchboard", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a chat request (single-shot or interactive REPL)
    Chat {
        /// Single message (non-interactive). Omit for REPL mode.
        #[arg(short, long)]
        message: Option<String>,

        /// Model alias or concrete model id
        #[arg(long)]
        model: Option<String>,

        /// System prompt sent before the conversation
        #[arg(long)]
        system: Option<String>,

        /// Sampling temperature (router default when omitted)
        #[arg(long)]
        temperature: Option<f64>,

        /// Enable debug logging
        #[arg(long, default_value_t = false)]
        logs: bool,
    },

    /// Show configuration and provider status
    Status {
        /// Print provider stats as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Probe every provider once and show the result
    Probe,

    /// List requests queued for replay
    Pending,

    /// Replay queued requests once
    Retry {
        /// Enable debug logging
        #[arg(long, default_value_t = false)]
        logs: bool,
    },

    /// Transcribe an audio file
    Transcribe {
        /// Path to the audio file
        file: String,

        /// Whisper model (provider default when omitted)
        #[arg(long)]
        model: Option<String>,

        /// Spoken language hint, ISO 639-1
        #[arg(long)]
        language: Option<String>,
    },

    /// Run health monitoring and pending replay until Ctrl+C
    Serve {
        /// Enable debug logging
        #[arg(long, default_value_t = false)]
        logs: bool,
    },

    /// Write a default configuration file
    Init {
        /// Overwrite an existing config
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}

// ─────────────────────────────────────────────
// Entrypoint
// ─────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Chat {
            message,
            model,
            system,
            temperature,
            logs,
        } => {
            init_logging(logs);
            let options = ChatOptions {
                model,
                temperature,
                max_tokens: None,
            };
            run_chat(message, system, options).await
        }
        Commands::Status { json } => {
            init_logging(false);
            status::run(json).await
        }
        Commands::Probe => {
            init_logging(false);
            status::probe().await
        }
        Commands::Pending => {
            init_logging(false);
            pending_cmd::list().await
        }
        Commands::Retry { logs } => {
            init_logging(logs);
            pending_cmd::retry().await
        }
        Commands::Transcribe {
            file,
            model,
            language,
        } => {
            init_logging(false);
            run_transcribe(&file, model.as_deref(), language.as_deref()).await
        }
        Commands::Serve { logs } => {
            init_logging(logs);
            serve::run().await
        }
        Commands::Init { force } => init::run(None, force),
    }
}

/// Build a router from the loaded configuration and restore queued requests.
pub async fn build_router() -> Result<Router> {
    let config = load_config(None);
    let router = Router::from_config(&config);

    let restored = router
        .load_pending()
        .await
        .context("failed to load pending tasks")?;
    if restored > 0 {
        info!(count = restored, "restored pending tasks");
    }

    Ok(router)
}

// ─────────────────────────────────────────────
// Chat command
// ─────────────────────────────────────────────

async fn run_chat(
    message: Option<String>,
    system: Option<String>,
    options: ChatOptions,
) -> Result<()> {
    let router = build_router().await?;

    match message {
        Some(msg) => {
            let mut messages = Vec::with_capacity(2);
            if let Some(ref system) = system {
                messages.push(Message::system(system.as_str()));
            }
            messages.push(Message::user(msg));

            info!(model = ?options.model, "sending single message");
            match router.chat(messages, options).await {
                Ok(response) => helpers::print_response(&response),
                Err(e) => {
                    helpers::print_router_error(&e);
                    anyhow::bail!("request failed");
                }
            }
        }
        None => {
            repl::run(&router, system.as_deref(), options).await?;
        }
    }

    Ok(())
}

// ─────────────────────────────────────────────
// Transcribe command
// ─────────────────────────────────────────────

async fn run_transcribe(file: &str, model: Option<&str>, language: Option<&str>) -> Result<()> {
    let path = helpers::expand_tilde(file);
    if !path.exists() {
        anyhow::bail!("audio file not found: {}", path.display());
    }

    let router = build_router().await?;
    match router.transcribe_audio(&path, model, language).await {
        Ok(text) => {
            if text.is_empty() {
                println!("{}", helpers::dim("(no speech detected)"));
            } else {
                println!("{text}");
            }
            Ok(())
        }
        Err(e) => {
            helpers::print_router_error(&e);
            anyhow::bail!("transcription failed");
        }
    }
}

/// Initialize tracing/logging.
fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("switchboard=debug,info")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
