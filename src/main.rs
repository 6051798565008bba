mod api;
mod error;
mod listener;
mod notifier;
mod store;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api::{BotApi, ParseMode, DEFAULT_API_URL};
use crate::listener::{Listener, Outcome, DEFAULT_WAIT_SECS};
use crate::notifier::Notifier;
use crate::store::ChatStore;

const TEST_MESSAGE: &str = "Hello from tgrelay 🚀";

#[derive(Parser)]
#[command(name = "tgrelay")]
#[command(about = "Relay notifications and wait for replies via a Telegram bot")]
struct Cli {
    /// Bot token; falls back to the TELEGRAM_BOT_TOKEN environment variable
    #[arg(long, global = true)]
    token: Option<String>,

    /// Bot API base URL
    #[arg(long, global = true, default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Chat store path (default: telegram_chat.json beside the executable)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a test message to the stored or discovered chat
    Test,

    /// Send a custom message
    Send {
        /// Message text
        text: String,

        /// Rich-text formatting mode
        #[arg(long, value_enum)]
        parse_mode: Option<ParseMode>,
    },

    /// Wait for a reply from a chat, or discover the next chat that writes in
    Listen {
        /// Only accept replies from this chat id; omit to discover one
        #[arg(long)]
        from: Option<String>,

        /// Long-poll wait per request, in seconds
        #[arg(long, default_value_t = DEFAULT_WAIT_SECS)]
        wait: u64,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Diagnostics go to stderr; stdout carries the chat id or reply text.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Exit 1 on bad arguments, same as every other failure.
            let _ = e.print();
            return ExitCode::FAILURE;
        }
    };

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let token = cli
        .token
        .or_else(|| std::env::var("TELEGRAM_BOT_TOKEN").ok())
        .filter(|t| !t.is_empty())
        .context("no bot token: pass --token or set TELEGRAM_BOT_TOKEN")?;

    let api = BotApi::new(token, cli.api_url);
    let store = ChatStore::new(cli.store.unwrap_or_else(ChatStore::default_path));

    match cli.command {
        Commands::Test => {
            send(&api, &store, TEST_MESSAGE, None).await?;
            println!("Test message sent.");
        }
        Commands::Send { text, parse_mode } => {
            send(&api, &store, &text, parse_mode).await?;
            println!("Notification sent.");
        }
        Commands::Listen { from, wait } => {
            match Listener::new(&api, from, wait).run().await? {
                Outcome::Matched(text) => println!("{}", text),
                Outcome::Discovered(chat_id) => {
                    store.save(&chat_id)?;
                    println!("{}", chat_id);
                }
            }
        }
    }

    Ok(())
}

async fn send(
    api: &BotApi,
    store: &ChatStore,
    text: &str,
    parse_mode: Option<ParseMode>,
) -> Result<()> {
    let ok = Notifier::new(api, store).notify(text, parse_mode).await?;
    anyhow::ensure!(ok, "telegram did not acknowledge the message");
    Ok(())
}
