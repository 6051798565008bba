use tracing::info;

use crate::api::{ParseMode, TelegramApi};
use crate::error::{RelayError, Result};
use crate::store::ChatStore;

/// One-shot message delivery: resolves the destination chat from the store
/// (discovering and persisting it on first use), then sends.
pub struct Notifier<'a, A: TelegramApi + ?Sized> {
    api: &'a A,
    store: &'a ChatStore,
}

impl<'a, A: TelegramApi + ?Sized> Notifier<'a, A> {
    pub fn new(api: &'a A, store: &'a ChatStore) -> Self {
        Self { api, store }
    }

    /// Deliver `text` to the resolved chat. Returns the API's `ok` flag.
    pub async fn notify(&self, text: &str, parse_mode: Option<ParseMode>) -> Result<bool> {
        let chat_id = self.resolve_destination().await?;
        info!("sending message to chat {}", chat_id);
        self.api.send_message(&chat_id, text, parse_mode).await
    }

    async fn resolve_destination(&self) -> Result<String> {
        if let Some(chat_id) = self.store.load()? {
            return Ok(chat_id);
        }

        info!("no stored chat id, checking pending updates");
        let chat_id = self
            .discover_latest()
            .await?
            .ok_or(RelayError::NoDestination)?;
        self.store.save(&chat_id)?;
        info!("discovered and stored chat id {}", chat_id);
        Ok(chat_id)
    }

    /// One fetch, no wait, scanned newest-first: the most recent
    /// correspondent is the one to notify.
    async fn discover_latest(&self) -> Result<Option<String>> {
        let updates = self.api.get_updates(None, 0).await?;
        Ok(updates
            .iter()
            .rev()
            .find_map(|u| u.message.as_ref().map(|m| m.chat.id.to_string())))
    }
}
