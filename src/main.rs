//! club-chat - terminal client for the club messaging service
//!
//! Conversation list, history, realtime push and an interactive chat view.

mod api;
mod chat;
mod config;
mod models;
mod realtime;
mod tui;

use std::fs::OpenOptions;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::Config;

#[derive(Parser)]
#[command(name = "club-chat")]
#[command(about = "Terminal client for club conversations", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Store endpoints and identity in the config file
    Configure {
        /// Base URL of the messaging REST API
        #[arg(long)]
        api_url: Option<String>,

        /// Base URL of the realtime server (defaults to the API origin)
        #[arg(long)]
        socket_url: Option<String>,

        /// Session token
        #[arg(long)]
        token: Option<String>,

        /// Your user id
        #[arg(long)]
        user_id: Option<String>,

        /// Display name shown to others while you type
        #[arg(long)]
        user_name: Option<String>,

        /// Arabic display name
        #[arg(long)]
        user_name_ar: Option<String>,
    },

    /// List your conversations
    Conversations,

    /// Read messages from a conversation
    Read {
        /// Conversation ID (from `conversations` output)
        conversation_id: String,

        /// Maximum number of messages to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },

    /// Send a message
    Send {
        /// Conversation ID (from `conversations` output)
        #[arg(short, long)]
        to: String,

        /// Message content
        message: String,

        /// Message ID to reply to
        #[arg(long)]
        reply_to: Option<String>,
    },

    /// Stream realtime events for a conversation
    Watch {
        /// Conversation ID (from `conversations` output)
        conversation_id: String,
    },

    /// Launch the terminal user interface
    Tui,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose, matches!(cli.command, Commands::Tui))?;

    match cli.command {
        Commands::Configure {
            api_url,
            socket_url,
            token,
            user_id,
            user_name,
            user_name_ar,
        } => {
            let mut config = Config::load()?;
            let updates = [
                (&mut config.api_url, api_url),
                (&mut config.socket_url, socket_url),
                (&mut config.token, token),
                (&mut config.user_id, user_id),
                (&mut config.user_name, user_name),
                (&mut config.user_name_ar, user_name_ar),
            ];
            for (field, value) in updates {
                if value.is_some() {
                    *field = value;
                }
            }
            config.save()?;

            match config.require_session() {
                Ok(session) => println!(
                    "Configured as {} ({}) against {}",
                    session.user_name, session.user_id, session.api_url
                ),
                Err(e) => println!("Saved. Still missing: {:#}", e),
            }
        }
        Commands::Conversations => {
            tracing::info!("Fetching conversations...");
            api::list_conversations().await?;
        }
        Commands::Read {
            conversation_id,
            limit,
        } => {
            api::read_messages(&conversation_id, limit).await?;
        }
        Commands::Send {
            to,
            message,
            reply_to,
        } => {
            tracing::info!("Sending message...");
            api::send_message(&to, &message, reply_to.as_deref()).await?;
        }
        Commands::Watch { conversation_id } => {
            realtime::watch(&conversation_id).await?;
        }
        Commands::Tui => {
            tui::run().await?;
        }
    }

    Ok(())
}

/// Install the tracing subscriber. The TUI owns the terminal, so its logs
/// go to a file in the data directory instead of stderr.
fn init_logging(verbose: bool, to_file: bool) -> Result<()> {
    let filter = if verbose { "debug" } else { "info" };
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    if to_file {
        let path = Config::data_dir()?.join("club-chat.log");
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open log file {}", path.display()))?;
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .init();
    }

    Ok(())
}
