use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::{RelayError, Result};

pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

/// Extra read-timeout margin on long-poll requests so the client never
/// gives up before the server-side long poll returns.
const READ_MARGIN: Duration = Duration::from_secs(10);

/// Telegram rich-text formatting modes for outgoing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ParseMode {
    Html,
    Markdownv2,
}

impl ParseMode {
    fn as_str(self) -> &'static str {
        match self {
            ParseMode::Html => "HTML",
            ParseMode::Markdownv2 => "MarkdownV2",
        }
    }
}

/// Chat ids arrive as integers for private chats and strings for channel
/// usernames. Canonical form everywhere else in this program is String.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ChatId {
    Int(i64),
    Str(String),
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatId::Int(id) => write!(f, "{}", id),
            ChatId::Str(id) => write!(f, "{}", id),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: ChatId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub chat: Chat,
    pub text: Option<String>,
}

/// One event from `getUpdates`. Non-message updates (edits, channel posts,
/// callback queries) still consume an `update_id`.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<IncomingMessage>,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    ok: bool,
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

impl<T> Envelope<T> {
    fn api_error(&self) -> RelayError {
        RelayError::Api(
            self.description
                .clone()
                .unwrap_or_else(|| "no description".to_string()),
        )
    }
}

/// Operations the notifier and listener need from the Bot API. The trait
/// exists so tests can run against a scripted in-memory implementation.
#[async_trait]
pub trait TelegramApi {
    /// Deliver `text` to `chat_id`. Returns the envelope's `ok` flag.
    async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        parse_mode: Option<ParseMode>,
    ) -> Result<bool>;

    /// Fetch updates at `offset`, long-polling up to `wait_secs` seconds.
    async fn get_updates(&self, offset: Option<i64>, wait_secs: u64) -> Result<Vec<Update>>;
}

/// HTTP client for the Bot API. Endpoints hang off
/// `<base_url>/bot<token>/<endpoint>`; the base URL is injectable so tests
/// and self-hosted Bot API servers can point elsewhere.
pub struct BotApi {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl BotApi {
    pub fn new(token: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            token: token.into(),
        }
    }

    fn endpoint_url(&self, endpoint: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, endpoint)
    }
}

#[async_trait]
impl TelegramApi for BotApi {
    async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        parse_mode: Option<ParseMode>,
    ) -> Result<bool> {
        let mut form: Vec<(&str, &str)> = vec![("chat_id", chat_id), ("text", text)];
        if let Some(mode) = parse_mode {
            form.push(("parse_mode", mode.as_str()));
        }

        debug!("POST sendMessage to chat {}", chat_id);

        let envelope: Envelope<serde_json::Value> = self
            .client
            .post(self.endpoint_url("sendMessage"))
            .form(&form)
            .timeout(READ_MARGIN)
            .send()
            .await
            .map_err(|source| RelayError::Transport {
                endpoint: "sendMessage",
                source,
            })?
            .json()
            .await
            .map_err(|source| RelayError::Transport {
                endpoint: "sendMessage",
                source,
            })?;

        if !envelope.ok {
            debug!("sendMessage rejected: {:?}", envelope.description);
        }
        Ok(envelope.ok)
    }

    async fn get_updates(&self, offset: Option<i64>, wait_secs: u64) -> Result<Vec<Update>> {
        let mut query: Vec<(&str, String)> = vec![("timeout", wait_secs.to_string())];
        if let Some(offset) = offset {
            query.push(("offset", offset.to_string()));
        }

        debug!("GET getUpdates offset={:?} wait={}s", offset, wait_secs);

        let envelope: Envelope<Vec<Update>> = self
            .client
            .get(self.endpoint_url("getUpdates"))
            .query(&query)
            .timeout(Duration::from_secs(wait_secs) + READ_MARGIN)
            .send()
            .await
            .map_err(|source| RelayError::Transport {
                endpoint: "getUpdates",
                source,
            })?
            .json()
            .await
            .map_err(|source| RelayError::Transport {
                endpoint: "getUpdates",
                source,
            })?;

        if !envelope.ok {
            return Err(envelope.api_error());
        }
        Ok(envelope.result.unwrap_or_default())
    }
}
