use tracing::{debug, info};

use crate::api::{TelegramApi, Update};
use crate::error::Result;

pub const DEFAULT_WAIT_SECS: u64 = 30;

/// Why the listener stopped.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Wait-for-reply mode: text of the first message from the filtered chat.
    Matched(String),
    /// Discovery mode: chat id of the first message-bearing update seen.
    Discovered(String),
}

/// Long-poll loop over `getUpdates`. With a filter it waits for a reply from
/// that chat; without one it reports the first chat that writes in. Runs
/// until a hit or a transport error; cancellation is the process signal.
pub struct Listener<'a, A: TelegramApi + ?Sized> {
    api: &'a A,
    filter: Option<String>,
    wait_secs: u64,
}

impl<'a, A: TelegramApi + ?Sized> Listener<'a, A> {
    pub fn new(api: &'a A, filter: Option<String>, wait_secs: u64) -> Self {
        Self {
            api,
            filter,
            wait_secs,
        }
    }

    pub async fn run(&self) -> Result<Outcome> {
        let mut cursor = self.drain_backlog().await?;
        match &self.filter {
            Some(chat_id) => info!("waiting for a reply from chat {}", chat_id),
            None => info!("waiting for any chat to write in"),
        }

        loop {
            let batch = self.api.get_updates(cursor, self.wait_secs).await?;
            debug!("poll returned {} updates", batch.len());
            if let Some(outcome) = scan_batch(&batch, self.filter.as_deref(), &mut cursor) {
                return Ok(outcome);
            }
        }
    }

    /// Flush updates delivered before this run started. Offset -1 with no
    /// wait asks the server for the newest update only; the first real poll
    /// then starts just past it. An empty backlog leaves the cursor unset,
    /// which means "from the beginning" to the server.
    async fn drain_backlog(&self) -> Result<Option<i64>> {
        let backlog = self.api.get_updates(Some(-1), 0).await?;
        let cursor = backlog.last().map(|u| u.update_id + 1);
        debug!("drained backlog, cursor at {:?}", cursor);
        Ok(cursor)
    }
}

/// Walk one batch in arrival order. The cursor advances past every processed
/// update, including updates without a message payload (they consume ids and
/// must not be refetched) and the hit itself. Updates after a hit stay
/// unconsumed.
fn scan_batch(
    batch: &[Update],
    filter: Option<&str>,
    cursor: &mut Option<i64>,
) -> Option<Outcome> {
    for update in batch {
        let hit = update.message.as_ref().and_then(|msg| {
            let chat_id = msg.chat.id.to_string();
            match filter {
                None => Some(Outcome::Discovered(chat_id)),
                // String comparison: the wire sends integer ids, the filter
                // arrives as a CLI argument.
                Some(wanted) if chat_id == wanted => {
                    Some(Outcome::Matched(msg.text.clone().unwrap_or_default()))
                }
                Some(_) => None,
            }
        });

        *cursor = Some(update.update_id + 1);
        if hit.is_some() {
            return hit;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::api::{Chat, ChatId, IncomingMessage, ParseMode};
    use crate::error::RelayError;

    fn message_update(update_id: i64, chat_id: i64, text: &str) -> Update {
        Update {
            update_id,
            message: Some(IncomingMessage {
                chat: Chat {
                    id: ChatId::Int(chat_id),
                },
                text: Some(text.to_string()),
            }),
        }
    }

    fn bare_update(update_id: i64) -> Update {
        Update {
            update_id,
            message: None,
        }
    }

    /// Replays a scripted sequence of batches and records every call.
    /// Exhausting the script is an error so a bug fails the test instead of
    /// hanging it.
    struct ScriptedApi {
        batches: Mutex<VecDeque<Vec<Update>>>,
        calls: Mutex<Vec<(Option<i64>, u64)>>,
    }

    impl ScriptedApi {
        fn new(batches: Vec<Vec<Update>>) -> Self {
            Self {
                batches: Mutex::new(batches.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<(Option<i64>, u64)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TelegramApi for ScriptedApi {
        async fn send_message(
            &self,
            _chat_id: &str,
            _text: &str,
            _parse_mode: Option<ParseMode>,
        ) -> Result<bool> {
            panic!("listener must never send");
        }

        async fn get_updates(&self, offset: Option<i64>, wait_secs: u64) -> Result<Vec<Update>> {
            self.calls.lock().unwrap().push((offset, wait_secs));
            self.batches
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| RelayError::Api("script exhausted".to_string()))
        }
    }

    #[test]
    fn cursor_lands_past_highest_id_with_no_hit() {
        let batch = vec![
            message_update(3, 100, "a"),
            bare_update(5),
            message_update(9, 100, "b"),
        ];
        let mut cursor = None;

        let outcome = scan_batch(&batch, Some("42"), &mut cursor);
        assert_eq!(outcome, None);
        assert_eq!(cursor, Some(10));
    }

    #[test]
    fn cursor_advances_over_bare_updates_without_filter() {
        let batch = vec![bare_update(1), bare_update(2), bare_update(7)];
        let mut cursor = None;

        let outcome = scan_batch(&batch, None, &mut cursor);
        assert_eq!(outcome, None);
        assert_eq!(cursor, Some(8));
    }

    #[test]
    fn match_is_found_regardless_of_position() {
        let batch = vec![
            bare_update(1),
            message_update(2, 99, "noise"),
            message_update(3, 42, "the reply"),
            message_update(4, 99, "more noise"),
        ];
        let mut cursor = None;

        let outcome = scan_batch(&batch, Some("42"), &mut cursor);
        assert_eq!(outcome, Some(Outcome::Matched("the reply".to_string())));
        // The hit is consumed; the update after it is not.
        assert_eq!(cursor, Some(4));
    }

    #[test]
    fn filter_matches_numeric_chat_id_as_string() {
        let batch = vec![message_update(1, 42, "hi")];
        let mut cursor = None;

        let outcome = scan_batch(&batch, Some("42"), &mut cursor);
        assert_eq!(outcome, Some(Outcome::Matched("hi".to_string())));
    }

    #[test]
    fn matched_message_without_text_yields_empty_string() {
        let batch = vec![Update {
            update_id: 1,
            message: Some(IncomingMessage {
                chat: Chat { id: ChatId::Int(42) },
                text: None,
            }),
        }];
        let mut cursor = None;

        let outcome = scan_batch(&batch, Some("42"), &mut cursor);
        assert_eq!(outcome, Some(Outcome::Matched(String::new())));
    }

    #[test]
    fn discovery_emits_first_message_bearing_chat() {
        let batch = vec![
            bare_update(1),
            message_update(2, 777, "first"),
            message_update(3, 888, "second"),
        ];
        let mut cursor = None;

        let outcome = scan_batch(&batch, None, &mut cursor);
        assert_eq!(outcome, Some(Outcome::Discovered("777".to_string())));
        // Terminates at the hit; update 3 is left unconsumed.
        assert_eq!(cursor, Some(3));
    }

    #[tokio::test]
    async fn drain_sets_cursor_past_backlog() {
        let api = ScriptedApi::new(vec![
            vec![message_update(11, 42, "stale")],
            vec![message_update(12, 42, "fresh")],
        ]);

        let listener = Listener::new(&api, Some("42".to_string()), 30);
        let outcome = listener.run().await.unwrap();

        assert_eq!(outcome, Outcome::Matched("fresh".to_string()));
        assert_eq!(api.calls(), vec![(Some(-1), 0), (Some(12), 30)]);
    }

    #[tokio::test]
    async fn empty_drain_polls_from_the_beginning() {
        let api = ScriptedApi::new(vec![vec![], vec![message_update(1, 5, "hello")]]);

        let listener = Listener::new(&api, None, 30);
        let outcome = listener.run().await.unwrap();

        assert_eq!(outcome, Outcome::Discovered("5".to_string()));
        // No backlog: the first real poll carries no offset.
        assert_eq!(api.calls(), vec![(Some(-1), 0), (None, 30)]);
    }

    #[tokio::test]
    async fn mismatches_advance_the_cursor_across_polls() {
        let api = ScriptedApi::new(vec![
            vec![],
            vec![message_update(4, 99, "not you"), bare_update(6)],
            vec![message_update(7, 42, "yes")],
        ]);

        let listener = Listener::new(&api, Some("42".to_string()), 15);
        let outcome = listener.run().await.unwrap();

        assert_eq!(outcome, Outcome::Matched("yes".to_string()));
        assert_eq!(
            api.calls(),
            vec![(Some(-1), 0), (None, 15), (Some(7), 15)]
        );
    }

    #[tokio::test]
    async fn transport_error_propagates() {
        // Script exhausted on the drain call itself.
        let api = ScriptedApi::new(vec![]);

        let listener = Listener::new(&api, None, 30);
        assert!(listener.run().await.is_err());
    }
}
