use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::{RelayError, Result};

pub const DEFAULT_STORE_FILE: &str = "telegram_chat.json";

#[derive(Debug, Deserialize)]
struct StoredChat {
    chat_id: Option<String>,
}

/// Single-field JSON file remembering the chat id discovered on a previous
/// run. No locking: concurrent writers race and the last one wins, which is
/// fine for a tool driven by one operator at a time.
pub struct ChatStore {
    path: PathBuf,
}

impl ChatStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default location: beside the executable, falling back to the current
    /// directory when the executable path cannot be resolved.
    pub fn default_path() -> PathBuf {
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."))
            .join(DEFAULT_STORE_FILE)
    }

    /// Stored chat id, or `None` if the file is absent or the field missing.
    pub fn load(&self) -> Result<Option<String>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(RelayError::StoreRead {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let stored: StoredChat =
            serde_json::from_str(&content).map_err(|source| RelayError::StoreParse {
                path: self.path.clone(),
                source,
            })?;

        debug!("loaded chat store {}: {:?}", self.path.display(), stored.chat_id);
        Ok(stored.chat_id)
    }

    /// Overwrite the store with `chat_id`.
    pub fn save(&self, chat_id: &str) -> Result<()> {
        let json = serde_json::json!({ "chat_id": chat_id }).to_string();

        std::fs::write(&self.path, json).map_err(|source| RelayError::StoreWrite {
            path: self.path.clone(),
            source,
        })?;

        debug!("saved chat id {} to {}", chat_id, self.path.display());
        Ok(())
    }
}
